use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::{
    Course, Enrollment, Payment, PaymentStatus, ReconciliationChannel, Transition,
    WebhookEventRecord,
};
use crate::services::store::{
    CompletionOutcome, DeclineOutcome, OverrideOutcome, PaymentStore, StoreError, StoreResult,
};

#[derive(Default)]
struct Inner {
    courses: HashMap<String, Course>,
    enrollments: HashMap<String, Enrollment>,
    /// Keyed by gateway transaction id.
    payments: HashMap<String, Payment>,
    webhook_events: Vec<WebhookEventRecord>,
}

/// A thread-safe in-memory store.
///
/// All records sit behind one `RwLock`, so a payment update and its
/// enrollment update are applied atomically. Used for local runs and tests.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_course(&self, course: Course) {
        let mut inner = self.inner.write().await;
        inner.courses.insert(course.id.clone(), course);
    }

    pub async fn webhook_events(&self) -> Vec<WebhookEventRecord> {
        self.inner.read().await.webhook_events.clone()
    }

    pub async fn payment_count(&self) -> usize {
        self.inner.read().await.payments.len()
    }

    pub async fn enrollment_count(&self) -> usize {
        self.inner.read().await.enrollments.len()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn get_course(&self, course_id: &str) -> StoreResult<Option<Course>> {
        Ok(self.inner.read().await.courses.get(course_id).cloned())
    }

    async fn create_enrollment(&self, enrollment: Enrollment) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let exists = inner.enrollments.values().any(|e| {
            e.learner_id == enrollment.learner_id && e.course_id == enrollment.course_id
        });
        if exists {
            return Err(StoreError::Duplicate("enrollment"));
        }
        inner.enrollments.insert(enrollment.id.clone(), enrollment);
        Ok(())
    }

    async fn get_enrollment(&self, enrollment_id: &str) -> StoreResult<Option<Enrollment>> {
        Ok(self.inner.read().await.enrollments.get(enrollment_id).cloned())
    }

    async fn get_enrollment_for_learner(
        &self,
        enrollment_id: &str,
        learner_id: &str,
    ) -> StoreResult<Option<Enrollment>> {
        Ok(self
            .inner
            .read()
            .await
            .enrollments
            .get(enrollment_id)
            .filter(|e| e.learner_id == learner_id)
            .cloned())
    }

    async fn create_payment(&self, payment: Payment) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.payments.contains_key(&payment.transaction_id) {
            return Err(StoreError::Duplicate("transaction id"));
        }
        inner
            .payments
            .insert(payment.transaction_id.clone(), payment);
        Ok(())
    }

    async fn get_payment_by_transaction(
        &self,
        transaction_id: &str,
    ) -> StoreResult<Option<Payment>> {
        Ok(self.inner.read().await.payments.get(transaction_id).cloned())
    }

    async fn latest_payment_for_enrollment(
        &self,
        enrollment_id: &str,
    ) -> StoreResult<Option<Payment>> {
        Ok(self
            .inner
            .read()
            .await
            .payments
            .values()
            .filter(|p| p.enrollment_id == enrollment_id)
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn complete_payment(
        &self,
        transaction_id: &str,
        channel: ReconciliationChannel,
    ) -> StoreResult<Option<CompletionOutcome>> {
        let mut inner = self.inner.write().await;

        let Some(payment) = inner.payments.get_mut(transaction_id) else {
            return Ok(None);
        };
        let transition = payment.complete(channel);
        let payment = payment.clone();

        let enrollment_activated = payment.status == PaymentStatus::Completed
            && inner
                .enrollments
                .get_mut(&payment.enrollment_id)
                .map(Enrollment::activate)
                .unwrap_or(false);

        Ok(Some(CompletionOutcome {
            payment,
            transition,
            enrollment_activated,
        }))
    }

    async fn decline_payment(&self, transaction_id: &str) -> StoreResult<Option<DeclineOutcome>> {
        let mut inner = self.inner.write().await;

        let Some(payment) = inner.payments.get_mut(transaction_id) else {
            return Ok(None);
        };
        let was_completed = payment.status == PaymentStatus::Completed;
        let transition = payment.decline();
        let payment = payment.clone();

        let enrollment_revoked = was_completed
            && transition == Transition::Applied
            && inner
                .enrollments
                .get_mut(&payment.enrollment_id)
                .map(Enrollment::revoke_activation)
                .unwrap_or(false);

        Ok(Some(DeclineOutcome {
            payment,
            transition,
            enrollment_revoked,
        }))
    }

    async fn override_payment_status(
        &self,
        transaction_id: &str,
        status: PaymentStatus,
        notes: Option<String>,
    ) -> StoreResult<Option<OverrideOutcome>> {
        let mut inner = self.inner.write().await;

        let Some(payment) = inner.payments.get_mut(transaction_id) else {
            return Ok(None);
        };
        let transition = payment.override_status(status, notes);
        let payment = payment.clone();

        let enrollment_activated = payment.status == PaymentStatus::Completed
            && inner
                .enrollments
                .get_mut(&payment.enrollment_id)
                .map(Enrollment::activate)
                .unwrap_or(false);

        Ok(Some(OverrideOutcome {
            payment,
            transition,
            enrollment_activated,
        }))
    }

    async fn expire_pending_payments(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let expired = inner
            .payments
            .values_mut()
            .filter(|p| p.status == PaymentStatus::Pending && p.created_at < cutoff)
            .map(|p| p.expire())
            .filter(|t| *t == Transition::Applied)
            .count();
        Ok(expired as u64)
    }

    async fn record_webhook_event(&self, event: WebhookEventRecord) -> StoreResult<()> {
        self.inner.write().await.webhook_events.push(event);
        Ok(())
    }
}
