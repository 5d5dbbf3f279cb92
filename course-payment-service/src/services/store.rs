//! Persistence port for courses, enrollments, payments and webhook audit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    Course, Enrollment, Payment, PaymentStatus, ReconciliationChannel, Transition,
    WebhookEventRecord,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Duplicate {0}")]
    Duplicate(&'static str),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        StoreError::Backend(anyhow::Error::new(err))
    }
}

impl From<StoreError> for service_core::error::AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(what) => {
                Self::Conflict(anyhow::anyhow!("{} already exists", what))
            }
            StoreError::Backend(e) => Self::DatabaseError(e),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Effect of a completion on a payment and its enrollment.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutcome {
    /// Payment as stored after the update.
    pub payment: Payment,
    pub transition: Transition,
    pub enrollment_activated: bool,
}

/// Effect of a gateway decline on a payment and its enrollment.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclineOutcome {
    pub payment: Payment,
    pub transition: Transition,
    pub enrollment_revoked: bool,
}

/// Effect of a manager override.
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideOutcome {
    pub payment: Payment,
    pub transition: Transition,
    pub enrollment_activated: bool,
}

/// Storage operations used by the checkout and reconciliation paths.
///
/// Every state-changing method must converge to the same final state when
/// applied more than once or concurrently for the same transaction.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn get_course(&self, course_id: &str) -> StoreResult<Option<Course>>;

    /// Fails with [`StoreError::Duplicate`] when the learner is already
    /// enrolled in the course.
    async fn create_enrollment(&self, enrollment: Enrollment) -> StoreResult<()>;

    async fn get_enrollment(&self, enrollment_id: &str) -> StoreResult<Option<Enrollment>>;

    /// Looks up an enrollment only if it belongs to `learner_id`.
    async fn get_enrollment_for_learner(
        &self,
        enrollment_id: &str,
        learner_id: &str,
    ) -> StoreResult<Option<Enrollment>>;

    /// Fails with [`StoreError::Duplicate`] on a reused transaction id.
    async fn create_payment(&self, payment: Payment) -> StoreResult<()>;

    async fn get_payment_by_transaction(&self, transaction_id: &str)
        -> StoreResult<Option<Payment>>;

    /// Most recent payment attempt for an enrollment.
    async fn latest_payment_for_enrollment(
        &self,
        enrollment_id: &str,
    ) -> StoreResult<Option<Payment>>;

    /// Marks the payment completed, then activates its enrollment.
    /// `None` when the transaction is unknown.
    async fn complete_payment(
        &self,
        transaction_id: &str,
        channel: ReconciliationChannel,
    ) -> StoreResult<Option<CompletionOutcome>>;

    /// Applies a gateway decline. `None` when the transaction is unknown.
    async fn decline_payment(&self, transaction_id: &str) -> StoreResult<Option<DeclineOutcome>>;

    /// Forces a payment status and activates the enrollment when the new
    /// status is `completed`. `None` when the transaction is unknown.
    async fn override_payment_status(
        &self,
        transaction_id: &str,
        status: PaymentStatus,
        notes: Option<String>,
    ) -> StoreResult<Option<OverrideOutcome>>;

    /// Fails pending payments created before `cutoff`. Returns how many moved.
    async fn expire_pending_payments(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    async fn record_webhook_event(&self, event: WebhookEventRecord) -> StoreResult<()>;
}
