//! Reconciliation of gateway outcomes into local payment and enrollment state.
//!
//! Two channels feed it: the learner's browser returning through the callback
//! URL (untrusted, re-checked against the gateway) and signed webhooks
//! (authoritative). Both converge through the store's idempotent transitions.

use std::sync::Arc;
use thiserror::Error;

use crate::models::{PaymentStatus, ReconciliationChannel, Transition, WebhookEventRecord};
use crate::services::events::{EventKind, WebhookEvent};
use crate::services::gateway::PaymentGateway;
use crate::services::metrics::{record_reconciliation, record_webhook};
use crate::services::store::PaymentStore;

/// Gateway statuses the callback treats as paid.
const SUCCESS_STATUSES: [&str; 3] = ["approved", "completed", "success"];

pub fn is_success_status(status: &str) -> bool {
    SUCCESS_STATUSES
        .iter()
        .any(|s| s.eq_ignore_ascii_case(status.trim()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The payment is completed locally.
    Confirmed,
    /// Nothing confirmed yet; the webhook may still settle it.
    AwaitingConfirmation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAck {
    Received,
    Ignored,
}

impl WebhookAck {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookAck::Received => "received",
            WebhookAck::Ignored => "ignored",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconciliationError {
    #[error("No payment for transaction {0}")]
    UnknownTransaction(String),
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn PaymentStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    /// Best-effort reconciliation when the learner returns from the gateway.
    ///
    /// Never fails: every error is logged and reported as
    /// [`CallbackOutcome::AwaitingConfirmation`].
    pub async fn reconcile_callback(&self, transaction_id: Option<&str>) -> CallbackOutcome {
        let Some(transaction_id) = transaction_id.map(str::trim).filter(|id| !id.is_empty())
        else {
            tracing::warn!("Payment callback without a transaction id");
            record_reconciliation(ReconciliationChannel::Callback, "missing_id");
            return CallbackOutcome::AwaitingConfirmation;
        };

        // The id comes from the browser: only ids this service issued reach
        // the gateway.
        let payment = match self.store.get_payment_by_transaction(transaction_id).await {
            Ok(Some(payment)) => payment,
            Ok(None) => {
                tracing::warn!(
                    transaction_id = %transaction_id,
                    "Callback for unknown transaction ignored"
                );
                record_reconciliation(ReconciliationChannel::Callback, "unknown_transaction");
                return CallbackOutcome::AwaitingConfirmation;
            }
            Err(e) => {
                tracing::error!(
                    transaction_id = %transaction_id,
                    error = %e,
                    "Callback payment lookup failed"
                );
                record_reconciliation(ReconciliationChannel::Callback, "error");
                return CallbackOutcome::AwaitingConfirmation;
            }
        };

        if payment.status == PaymentStatus::Completed {
            record_reconciliation(ReconciliationChannel::Callback, "duplicate");
            return CallbackOutcome::Confirmed;
        }
        if !payment.can_complete_via(ReconciliationChannel::Callback) {
            tracing::info!(
                transaction_id = %transaction_id,
                status = payment.status.as_str(),
                "Callback cannot settle this payment"
            );
            record_reconciliation(ReconciliationChannel::Callback, "refused");
            return CallbackOutcome::AwaitingConfirmation;
        }

        let transaction = match self.gateway.get_transaction(transaction_id).await {
            Ok(transaction) => transaction,
            Err(e) => {
                tracing::error!(
                    transaction_id = %transaction_id,
                    error = %e,
                    "Failed to fetch transaction status"
                );
                record_reconciliation(ReconciliationChannel::Callback, "gateway_error");
                return self.already_completed(transaction_id).await;
            }
        };

        let status = transaction.status.as_deref().unwrap_or_default();
        if !is_success_status(status) {
            tracing::info!(
                transaction_id = %transaction_id,
                status = %status,
                "Callback transaction not approved"
            );
            record_reconciliation(ReconciliationChannel::Callback, "not_approved");
            return self.already_completed(transaction_id).await;
        }

        match self
            .store
            .complete_payment(transaction_id, ReconciliationChannel::Callback)
            .await
        {
            Ok(Some(outcome)) => {
                tracing::info!(
                    transaction_id = %transaction_id,
                    enrollment_id = %outcome.payment.enrollment_id,
                    channel = "callback",
                    transition = ?outcome.transition,
                    enrollment_activated = outcome.enrollment_activated,
                    "Callback reconciliation applied"
                );
                record_reconciliation(
                    ReconciliationChannel::Callback,
                    transition_label(outcome.transition),
                );
                if outcome.payment.status == PaymentStatus::Completed {
                    CallbackOutcome::Confirmed
                } else {
                    CallbackOutcome::AwaitingConfirmation
                }
            }
            Ok(None) => {
                tracing::warn!(
                    transaction_id = %transaction_id,
                    "Callback for unknown transaction ignored"
                );
                record_reconciliation(ReconciliationChannel::Callback, "unknown_transaction");
                CallbackOutcome::AwaitingConfirmation
            }
            Err(e) => {
                tracing::error!(
                    transaction_id = %transaction_id,
                    error = %e,
                    "Callback reconciliation failed"
                );
                record_reconciliation(ReconciliationChannel::Callback, "error");
                CallbackOutcome::AwaitingConfirmation
            }
        }
    }

    async fn already_completed(&self, transaction_id: &str) -> CallbackOutcome {
        match self.store.get_payment_by_transaction(transaction_id).await {
            Ok(Some(payment)) if payment.status == PaymentStatus::Completed => {
                CallbackOutcome::Confirmed
            }
            _ => CallbackOutcome::AwaitingConfirmation,
        }
    }

    /// Processes a webhook body whose signature has already been verified.
    ///
    /// Only an approval for an unknown transaction is an error; everything
    /// else is acknowledged as received or ignored.
    pub async fn handle_webhook(&self, body: &[u8]) -> Result<WebhookAck, ReconciliationError> {
        let payload = match serde_json::from_slice::<serde_json::Value>(body) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Webhook body is not valid JSON");
                record_webhook("ignored");
                return Ok(WebhookAck::Ignored);
            }
        };

        let event = WebhookEvent::from_payload(payload);
        let event_name = event.name.as_deref().unwrap_or("-");

        let record = WebhookEventRecord::new(
            event.name.clone(),
            event.transaction_id.clone(),
            event.payload.clone(),
        );
        if let Err(e) = self.store.record_webhook_event(record).await {
            tracing::error!(event_name = %event_name, error = %e, "Failed to store webhook event");
        }

        let ack = match (event.kind, event.transaction_id.as_deref()) {
            (EventKind::Approved, Some(transaction_id)) => {
                self.apply_approval(event_name, transaction_id).await?
            }
            (EventKind::Declined, Some(transaction_id)) => {
                self.apply_decline(event_name, transaction_id).await
            }
            (EventKind::Approved | EventKind::Declined, None) => {
                tracing::warn!(event_name = %event_name, "Webhook event without transaction id");
                WebhookAck::Ignored
            }
            (EventKind::Other, _) => {
                tracing::debug!(event_name = %event_name, "Webhook event needs no action");
                WebhookAck::Received
            }
        };

        record_webhook(ack.as_str());
        Ok(ack)
    }

    async fn apply_approval(
        &self,
        event_name: &str,
        transaction_id: &str,
    ) -> Result<WebhookAck, ReconciliationError> {
        match self
            .store
            .complete_payment(transaction_id, ReconciliationChannel::Webhook)
            .await
        {
            Ok(Some(outcome)) => {
                tracing::info!(
                    event_name = %event_name,
                    transaction_id = %transaction_id,
                    enrollment_id = %outcome.payment.enrollment_id,
                    channel = "webhook",
                    transition = ?outcome.transition,
                    enrollment_activated = outcome.enrollment_activated,
                    "Webhook approval applied"
                );
                record_reconciliation(
                    ReconciliationChannel::Webhook,
                    transition_label(outcome.transition),
                );
                Ok(WebhookAck::Received)
            }
            Ok(None) => {
                tracing::warn!(
                    event_name = %event_name,
                    transaction_id = %transaction_id,
                    "Webhook approval for unknown transaction"
                );
                record_reconciliation(ReconciliationChannel::Webhook, "unknown_transaction");
                record_webhook("not_found");
                Err(ReconciliationError::UnknownTransaction(
                    transaction_id.to_string(),
                ))
            }
            Err(e) => {
                tracing::error!(
                    event_name = %event_name,
                    transaction_id = %transaction_id,
                    error = %e,
                    "Webhook approval failed"
                );
                record_reconciliation(ReconciliationChannel::Webhook, "error");
                Ok(WebhookAck::Ignored)
            }
        }
    }

    async fn apply_decline(&self, event_name: &str, transaction_id: &str) -> WebhookAck {
        match self.store.decline_payment(transaction_id).await {
            Ok(Some(outcome)) => {
                if outcome.transition == Transition::Refused {
                    tracing::warn!(
                        event_name = %event_name,
                        transaction_id = %transaction_id,
                        status = %outcome.payment.status.as_str(),
                        "Decline ignored for confirmed payment"
                    );
                } else {
                    tracing::info!(
                        event_name = %event_name,
                        transaction_id = %transaction_id,
                        enrollment_id = %outcome.payment.enrollment_id,
                        transition = ?outcome.transition,
                        enrollment_revoked = outcome.enrollment_revoked,
                        "Webhook decline applied"
                    );
                }
                record_reconciliation(
                    ReconciliationChannel::Webhook,
                    match outcome.transition {
                        Transition::Applied => "declined",
                        other => transition_label(other),
                    },
                );
                WebhookAck::Received
            }
            Ok(None) => {
                tracing::info!(
                    event_name = %event_name,
                    transaction_id = %transaction_id,
                    "Decline for unknown transaction ignored"
                );
                WebhookAck::Ignored
            }
            Err(e) => {
                tracing::error!(
                    event_name = %event_name,
                    transaction_id = %transaction_id,
                    error = %e,
                    "Webhook decline failed"
                );
                WebhookAck::Ignored
            }
        }
    }
}

fn transition_label(transition: Transition) -> &'static str {
    match transition {
        Transition::Applied => "completed",
        Transition::Unchanged => "duplicate",
        Transition::Refused => "refused",
    }
}
