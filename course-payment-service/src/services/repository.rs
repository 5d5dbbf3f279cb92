use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::error::{ErrorKind, WriteError, WriteFailure};
use mongodb::options::{FindOneOptions, IndexOptions};
use mongodb::{bson::doc, Collection, Database, IndexModel};

use crate::models::{
    Course, Enrollment, EnrollmentStatus, Payment, PaymentStatus, ReconciliationChannel,
    Transition, WebhookEventRecord,
};
use crate::services::store::{
    CompletionOutcome, DeclineOutcome, OverrideOutcome, PaymentStore, StoreError, StoreResult,
};

const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(WriteError {
            code: DUPLICATE_KEY,
            ..
        }))
    )
}

#[derive(Clone)]
pub struct PaymentRepository {
    course_collection: Collection<Course>,
    enrollment_collection: Collection<Enrollment>,
    payment_collection: Collection<Payment>,
    webhook_event_collection: Collection<WebhookEventRecord>,
}

impl PaymentRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            course_collection: db.collection("courses"),
            enrollment_collection: db.collection("enrollments"),
            payment_collection: db.collection("payments"),
            webhook_event_collection: db.collection("webhook_events"),
        }
    }

    /// Initialize database indexes, including the uniqueness constraints.
    pub async fn init_indexes(&self) -> anyhow::Result<()> {
        // One enrollment per (learner, course)
        let learner_course_index = IndexModel::builder()
            .keys(doc! { "learner_id": 1, "course_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("learner_course_unique_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        self.enrollment_collection
            .create_indexes([learner_course_index], None)
            .await?;

        // Reconciliation looks payments up by gateway transaction id
        let transaction_index = IndexModel::builder()
            .keys(doc! { "transaction_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("transaction_id_unique_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();

        let enrollment_payment_index = IndexModel::builder()
            .keys(doc! { "enrollment_id": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("enrollment_payment_idx".to_string())
                    .build(),
            )
            .build();

        // Sweeper scans pending payments by age
        let status_age_index = IndexModel::builder()
            .keys(doc! { "status": 1, "created_at": 1 })
            .options(
                IndexOptions::builder()
                    .name("status_created_at_idx".to_string())
                    .build(),
            )
            .build();

        self.payment_collection
            .create_indexes(
                [transaction_index, enrollment_payment_index, status_age_index],
                None,
            )
            .await?;

        let event_transaction_index = IndexModel::builder()
            .keys(doc! { "transaction_id": 1 })
            .options(
                IndexOptions::builder()
                    .name("webhook_event_transaction_idx".to_string())
                    .build(),
            )
            .build();

        self.webhook_event_collection
            .create_indexes([event_transaction_index], None)
            .await?;

        tracing::info!("Course payment indexes initialized");
        Ok(())
    }

    /// `pending -> active`. Returns whether the enrollment moved.
    async fn activate_enrollment(&self, enrollment_id: &str) -> StoreResult<bool> {
        let result = self
            .enrollment_collection
            .update_one(
                doc! {
                    "_id": enrollment_id,
                    "status": EnrollmentStatus::Pending.as_str()
                },
                doc! {
                    "$set": {
                        "status": EnrollmentStatus::Active.as_str(),
                        "updated_at": mongodb::bson::DateTime::now()
                    }
                },
                None,
            )
            .await?;
        Ok(result.modified_count == 1)
    }
}

#[async_trait]
impl PaymentStore for PaymentRepository {
    async fn get_course(&self, course_id: &str) -> StoreResult<Option<Course>> {
        let course = self
            .course_collection
            .find_one(doc! { "_id": course_id }, None)
            .await?;
        Ok(course)
    }

    async fn create_enrollment(&self, enrollment: Enrollment) -> StoreResult<()> {
        match self.enrollment_collection.insert_one(enrollment, None).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::Duplicate("enrollment")),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_enrollment(&self, enrollment_id: &str) -> StoreResult<Option<Enrollment>> {
        let enrollment = self
            .enrollment_collection
            .find_one(doc! { "_id": enrollment_id }, None)
            .await?;
        Ok(enrollment)
    }

    async fn get_enrollment_for_learner(
        &self,
        enrollment_id: &str,
        learner_id: &str,
    ) -> StoreResult<Option<Enrollment>> {
        let filter = doc! {
            "_id": enrollment_id,
            "learner_id": learner_id
        };
        let enrollment = self.enrollment_collection.find_one(filter, None).await?;
        Ok(enrollment)
    }

    async fn create_payment(&self, payment: Payment) -> StoreResult<()> {
        match self.payment_collection.insert_one(payment, None).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::Duplicate("transaction id")),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_payment_by_transaction(
        &self,
        transaction_id: &str,
    ) -> StoreResult<Option<Payment>> {
        let payment = self
            .payment_collection
            .find_one(doc! { "transaction_id": transaction_id }, None)
            .await?;
        Ok(payment)
    }

    async fn latest_payment_for_enrollment(
        &self,
        enrollment_id: &str,
    ) -> StoreResult<Option<Payment>> {
        let options = FindOneOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let payment = self
            .payment_collection
            .find_one(doc! { "enrollment_id": enrollment_id }, Some(options))
            .await?;
        Ok(payment)
    }

    async fn complete_payment(
        &self,
        transaction_id: &str,
        channel: ReconciliationChannel,
    ) -> StoreResult<Option<CompletionOutcome>> {
        let Some(existing) = self.get_payment_by_transaction(transaction_id).await? else {
            return Ok(None);
        };

        // Conditional update: a second delivery matches nothing. Only the
        // webhook may overturn a failure the webhook recorded.
        let failed = if channel == ReconciliationChannel::Webhook {
            doc! { "status": PaymentStatus::Failed.as_str() }
        } else {
            doc! {
                "status": PaymentStatus::Failed.as_str(),
                "reconciled_via": ReconciliationChannel::Sweeper.as_str()
            }
        };
        let filter = doc! {
            "transaction_id": transaction_id,
            "$or": [{ "status": PaymentStatus::Pending.as_str() }, failed]
        };
        let update = doc! {
            "$set": {
                "status": PaymentStatus::Completed.as_str(),
                "reconciled_via": channel.as_str(),
                "updated_at": mongodb::bson::DateTime::now()
            }
        };
        let result = self
            .payment_collection
            .update_one(filter, update, None)
            .await?;

        let payment = self
            .get_payment_by_transaction(transaction_id)
            .await?
            .unwrap_or(existing);

        let transition = if result.modified_count == 1 {
            Transition::Applied
        } else if payment.status == PaymentStatus::Completed {
            Transition::Unchanged
        } else {
            Transition::Refused
        };

        // Enrollment second, so it is never active without a completed payment.
        // Runs on repeats too, which heals a crash between the two writes.
        let enrollment_activated = if payment.status == PaymentStatus::Completed {
            self.activate_enrollment(&payment.enrollment_id).await?
        } else {
            false
        };

        Ok(Some(CompletionOutcome {
            payment,
            transition,
            enrollment_activated,
        }))
    }

    async fn decline_payment(&self, transaction_id: &str) -> StoreResult<Option<DeclineOutcome>> {
        let Some(existing) = self.get_payment_by_transaction(transaction_id).await? else {
            return Ok(None);
        };
        let was_completed = existing.status == PaymentStatus::Completed;

        let filter = doc! {
            "transaction_id": transaction_id,
            "$or": [
                { "status": PaymentStatus::Pending.as_str() },
                {
                    "status": PaymentStatus::Completed.as_str(),
                    "reconciled_via": ReconciliationChannel::Callback.as_str()
                }
            ]
        };
        let update = doc! {
            "$set": {
                "status": PaymentStatus::Failed.as_str(),
                "reconciled_via": ReconciliationChannel::Webhook.as_str(),
                "updated_at": mongodb::bson::DateTime::now()
            }
        };
        let result = self
            .payment_collection
            .update_one(filter, update, None)
            .await?;

        let payment = self
            .get_payment_by_transaction(transaction_id)
            .await?
            .unwrap_or(existing);

        let transition = if result.modified_count == 1 {
            Transition::Applied
        } else if payment.status == PaymentStatus::Failed {
            Transition::Unchanged
        } else {
            Transition::Refused
        };

        let enrollment_revoked = if was_completed && transition == Transition::Applied {
            let result = self
                .enrollment_collection
                .update_one(
                    doc! {
                        "_id": payment.enrollment_id.as_str(),
                        "status": EnrollmentStatus::Active.as_str()
                    },
                    doc! {
                        "$set": {
                            "status": EnrollmentStatus::Pending.as_str(),
                            "updated_at": mongodb::bson::DateTime::now()
                        }
                    },
                    None,
                )
                .await?;
            result.modified_count == 1
        } else {
            false
        };

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
        let Some(existing) = self.get_payment_by_transaction(transaction_id).await? else {
            return Ok(None);
        };

        let transition = if existing.status == status && notes.is_none() {
            Transition::Unchanged
        } else {
            let mut set = doc! {
                "status": status.as_str(),
                "reconciled_via": ReconciliationChannel::Manual.as_str(),
                "updated_at": mongodb::bson::DateTime::now()
            };
            if let Some(notes) = notes {
                set.insert("notes", notes);
            }
            self.payment_collection
                .update_one(doc! { "transaction_id": transaction_id }, doc! { "$set": set }, None)
                .await?;
            Transition::Applied
        };

        let payment = self
            .get_payment_by_transaction(transaction_id)
            .await?
            .unwrap_or(existing);

        let enrollment_activated = if payment.status == PaymentStatus::Completed {
            self.activate_enrollment(&payment.enrollment_id).await?
        } else {
            false
        };

        Ok(Some(OverrideOutcome {
            payment,
            transition,
            enrollment_activated,
        }))
    }

    async fn expire_pending_payments(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let filter = doc! {
            "status": PaymentStatus::Pending.as_str(),
            "created_at": { "$lt": mongodb::bson::DateTime::from_chrono(cutoff) }
        };
        let update = doc! {
            "$set": {
                "status": PaymentStatus::Failed.as_str(),
                "reconciled_via": ReconciliationChannel::Sweeper.as_str(),
                "updated_at": mongodb::bson::DateTime::now()
            }
        };
        let result = self
            .payment_collection
            .update_many(filter, update, None)
            .await?;
        Ok(result.modified_count)
    }

    async fn record_webhook_event(&self, event: WebhookEventRecord) -> StoreResult<()> {
        self.webhook_event_collection
            .insert_one(event, None)
            .await?;
        Ok(())
    }
}
