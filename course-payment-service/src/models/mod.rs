use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog entry. Owned by the course catalog; read-only here.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Course {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    /// Fee in the platform currency.
    pub fee: Decimal,
    pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Pending,
    Active,
    Completed,
    Dropped,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Pending => "pending",
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Completed => "completed",
            EnrollmentStatus::Dropped => "dropped",
        }
    }
}

/// A learner's seat in a course. Unique per (learner, course).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Enrollment {
    #[serde(rename = "_id")]
    pub id: String,
    pub learner_id: String,
    pub course_id: String,
    pub status: EnrollmentStatus,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub enrolled_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Enrollment {
    pub fn new_pending(learner_id: &str, course_id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            learner_id: learner_id.to_string(),
            course_id: course_id.to_string(),
            status: EnrollmentStatus::Pending,
            enrolled_at: now,
            updated_at: now,
        }
    }

    /// `pending -> active`. Returns whether the status changed.
    pub fn activate(&mut self) -> bool {
        if self.status != EnrollmentStatus::Pending {
            return false;
        }
        self.status = EnrollmentStatus::Active;
        self.updated_at = Utc::now();
        true
    }

    /// `active -> pending`, used when a callback-only completion is revoked.
    pub fn revoke_activation(&mut self) -> bool {
        if self.status != EnrollmentStatus::Active {
            return false;
        }
        self.status = EnrollmentStatus::Pending;
        self.updated_at = Utc::now();
        true
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    Upi,
    NetBanking,
    Cash,
    MobileMoney,
}

/// Which path last moved a payment's status.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReconciliationChannel {
    Callback,
    Webhook,
    Sweeper,
    /// Status forced by a manager.
    Manual,
}

impl ReconciliationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationChannel::Callback => "callback",
            ReconciliationChannel::Webhook => "webhook",
            ReconciliationChannel::Sweeper => "sweeper",
            ReconciliationChannel::Manual => "manual",
        }
    }
}

/// Result of applying a state change to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// Already in the target state.
    Unchanged,
    /// The current state does not allow the change.
    Refused,
}

/// One attempted checkout for an enrollment.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: String,
    pub enrollment_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub method: PaymentMethod,
    /// Gateway transaction id. Unique.
    pub transaction_id: String,
    pub status: PaymentStatus,
    #[serde(default)]
    pub reconciled_via: Option<ReconciliationChannel>,
    #[serde(default)]
    pub notes: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new_pending(
        enrollment_id: &str,
        transaction_id: &str,
        amount: Decimal,
        currency: &str,
        method: PaymentMethod,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            enrollment_id: enrollment_id.to_string(),
            amount,
            currency: currency.to_string(),
            method,
            transaction_id: transaction_id.to_string(),
            status: PaymentStatus::Pending,
            reconciled_via: None,
            notes: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `channel` may complete a payment in its current state.
    ///
    /// A local expiry can be overturned by any channel. A failure recorded by
    /// the webhook can only be overturned by another webhook.
    pub fn can_complete_via(&self, channel: ReconciliationChannel) -> bool {
        match self.status {
            PaymentStatus::Pending => true,
            PaymentStatus::Failed => {
                channel == ReconciliationChannel::Webhook
                    || self.reconciled_via == Some(ReconciliationChannel::Sweeper)
            }
            PaymentStatus::Completed | PaymentStatus::Refunded => false,
        }
    }

    /// `pending|failed -> completed`. See [`Payment::can_complete_via`] for
    /// which failures a channel may overturn; refunds are terminal.
    pub fn complete(&mut self, channel: ReconciliationChannel) -> Transition {
        if self.status == PaymentStatus::Completed {
            return Transition::Unchanged;
        }
        if !self.can_complete_via(channel) {
            return Transition::Refused;
        }
        self.status = PaymentStatus::Completed;
        self.reconciled_via = Some(channel);
        self.updated_at = Utc::now();
        Transition::Applied
    }

    /// Gateway decline. Reverts a completion only when the untrusted callback
    /// produced it.
    pub fn decline(&mut self) -> Transition {
        match (self.status, self.reconciled_via) {
            (PaymentStatus::Pending, _)
            | (PaymentStatus::Completed, Some(ReconciliationChannel::Callback)) => {
                self.status = PaymentStatus::Failed;
                self.reconciled_via = Some(ReconciliationChannel::Webhook);
                self.updated_at = Utc::now();
                Transition::Applied
            }
            (PaymentStatus::Failed, _) => Transition::Unchanged,
            _ => Transition::Refused,
        }
    }

    /// Manager override to any status. The gateway channels treat the
    /// result like any other settled state.
    pub fn override_status(&mut self, status: PaymentStatus, notes: Option<String>) -> Transition {
        if self.status == status && notes.is_none() {
            return Transition::Unchanged;
        }
        self.status = status;
        self.reconciled_via = Some(ReconciliationChannel::Manual);
        if let Some(notes) = notes {
            self.notes = notes;
        }
        self.updated_at = Utc::now();
        Transition::Applied
    }

    /// `pending -> failed` for abandoned checkouts.
    pub fn expire(&mut self) -> Transition {
        match self.status {
            PaymentStatus::Pending => {
                self.status = PaymentStatus::Failed;
                self.reconciled_via = Some(ReconciliationChannel::Sweeper);
                self.updated_at = Utc::now();
                Transition::Applied
            }
            PaymentStatus::Failed => Transition::Unchanged,
            _ => Transition::Refused,
        }
    }
}

/// Audit copy of a verified webhook delivery.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WebhookEventRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub event_name: Option<String>,
    pub transaction_id: Option<String>,
    pub payload: serde_json::Value,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub received_at: DateTime<Utc>,
}

impl WebhookEventRecord {
    pub fn new(
        event_name: Option<String>,
        transaction_id: Option<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_name,
            transaction_id,
            payload,
            received_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pending_payment() -> Payment {
        Payment::new_pending("enr-1", "tx_1", dec!(5000), "XOF", PaymentMethod::MobileMoney)
    }

    #[test]
    fn test_completion_is_idempotent() {
        let mut payment = pending_payment();
        assert_eq!(
            payment.complete(ReconciliationChannel::Webhook),
            Transition::Applied
        );
        assert_eq!(payment.status, PaymentStatus::Completed);

        let snapshot = payment.clone();
        assert_eq!(
            payment.complete(ReconciliationChannel::Callback),
            Transition::Unchanged
        );
        assert_eq!(payment, snapshot);
    }

    #[test]
    fn test_late_approval_recovers_expired_payment() {
        let mut payment = pending_payment();
        assert_eq!(payment.expire(), Transition::Applied);
        assert_eq!(
            payment.complete(ReconciliationChannel::Webhook),
            Transition::Applied
        );
        assert_eq!(payment.status, PaymentStatus::Completed);
    }

    #[test]
    fn test_callback_cannot_overturn_webhook_decline() {
        let mut payment = pending_payment();
        assert_eq!(payment.decline(), Transition::Applied);

        assert_eq!(
            payment.complete(ReconciliationChannel::Callback),
            Transition::Refused
        );
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.reconciled_via, Some(ReconciliationChannel::Webhook));

        assert_eq!(
            payment.complete(ReconciliationChannel::Webhook),
            Transition::Applied
        );
        assert_eq!(payment.status, PaymentStatus::Completed);
    }

    #[test]
    fn test_callback_recovers_expired_payment() {
        let mut payment = pending_payment();
        payment.expire();
        assert_eq!(
            payment.complete(ReconciliationChannel::Callback),
            Transition::Applied
        );
        assert_eq!(payment.reconciled_via, Some(ReconciliationChannel::Callback));
    }

    #[test]
    fn test_manual_override() {
        let mut payment = pending_payment();
        assert_eq!(
            payment.override_status(PaymentStatus::Failed, Some("Bank reversal".to_string())),
            Transition::Applied
        );
        assert_eq!(payment.reconciled_via, Some(ReconciliationChannel::Manual));
        assert_eq!(payment.notes, "Bank reversal");
        assert_eq!(
            payment.override_status(PaymentStatus::Failed, None),
            Transition::Unchanged
        );

        // Only the webhook can overturn a manager's failure.
        assert_eq!(
            payment.complete(ReconciliationChannel::Callback),
            Transition::Refused
        );
        assert_eq!(
            payment.complete(ReconciliationChannel::Webhook),
            Transition::Applied
        );
    }

    #[test]
    fn test_refund_is_terminal() {
        let mut payment = pending_payment();
        payment.status = PaymentStatus::Refunded;
        assert_eq!(
            payment.complete(ReconciliationChannel::Webhook),
            Transition::Refused
        );
        assert_eq!(payment.decline(), Transition::Refused);
        assert_eq!(payment.status, PaymentStatus::Refunded);
    }

    #[test]
    fn test_decline_reverts_only_callback_completion() {
        let mut via_callback = pending_payment();
        via_callback.complete(ReconciliationChannel::Callback);
        assert_eq!(via_callback.decline(), Transition::Applied);
        assert_eq!(via_callback.status, PaymentStatus::Failed);

        let mut via_webhook = pending_payment();
        via_webhook.complete(ReconciliationChannel::Webhook);
        assert_eq!(via_webhook.decline(), Transition::Refused);
        assert_eq!(via_webhook.status, PaymentStatus::Completed);
    }

    #[test]
    fn test_enrollment_activation() {
        let mut enrollment = Enrollment::new_pending("learner-1", "course-1");
        assert!(enrollment.activate());
        assert!(!enrollment.activate());
        assert_eq!(enrollment.status, EnrollmentStatus::Active);

        enrollment.status = EnrollmentStatus::Completed;
        assert!(!enrollment.activate());
        assert!(!enrollment.revoke_activation());
        assert_eq!(enrollment.status, EnrollmentStatus::Completed);
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_value(PaymentStatus::Completed).unwrap(),
            "completed"
        );
        assert_eq!(
            serde_json::to_value(PaymentMethod::MobileMoney).unwrap(),
            "mobile_money"
        );
        assert_eq!(
            serde_json::to_value(EnrollmentStatus::Active).unwrap(),
            "active"
        );
    }
}
