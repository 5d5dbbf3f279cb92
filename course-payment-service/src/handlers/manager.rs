//! Payment administration for managers.

use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{PaymentStatusUpdate, PaymentSummary},
    middleware::ManagerContext,
    models::{ReconciliationChannel, Transition},
    services::metrics::record_reconciliation,
    AppState,
};

/// `PATCH /payments/:transaction_id/status`
///
/// Forces the payment status. A `completed` status also activates the
/// pending enrollment.
pub async fn override_payment_status(
    State(state): State<AppState>,
    manager: ManagerContext,
    Path(transaction_id): Path<String>,
    Json(update): Json<PaymentStatusUpdate>,
) -> Result<Json<PaymentSummary>, AppError> {
    update.validate()?;

    let outcome = state
        .store
        .override_payment_status(&transaction_id, update.status, update.notes)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Payment {} not found", transaction_id))
        })?;

    tracing::warn!(
        manager_id = %manager.manager_id,
        transaction_id = %transaction_id,
        status = outcome.payment.status.as_str(),
        transition = ?outcome.transition,
        enrollment_activated = outcome.enrollment_activated,
        "Payment status overridden"
    );
    let label = match outcome.transition {
        Transition::Applied => "overridden",
        Transition::Unchanged => "duplicate",
        Transition::Refused => "refused",
    };
    record_reconciliation(ReconciliationChannel::Manual, label);

    Ok(Json(outcome.payment.into()))
}
