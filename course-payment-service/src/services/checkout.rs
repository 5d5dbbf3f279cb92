//! Checkout initiation: enrollment checks, gateway transaction and the local
//! pending payment that reconciliation later settles.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use thiserror::Error;

use crate::config::CheckoutConfig;
use crate::middleware::LearnerContext;
use crate::models::{EnrollmentStatus, Payment, PaymentMethod};
use crate::services::gateway::{
    Currency, Customer, GatewayError, NewTransaction, PaymentGateway, PhoneNumber,
};
use crate::services::redirect::{resolve_redirect_url, RedirectLink};
use crate::services::store::{PaymentStore, StoreError};

const DEFAULT_FIRST_NAME: &str = "Learner";
const DEFAULT_LAST_NAME: &str = "Client";

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Enrollment not found")]
    EnrollmentNotFound,

    #[error("Course not found")]
    CourseNotFound,

    #[error("Enrollment is {0}; only pending enrollments can be paid")]
    NotPending(&'static str),

    #[error("Course fee must be a positive amount")]
    InvalidFee,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Payment gateway response did not contain a payment link")]
    GatewayResponseUnrecognized,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CheckoutError {
    /// Failures reported to the learner as a message rather than an error page.
    pub fn is_gateway_failure(&self) -> bool {
        matches!(
            self,
            CheckoutError::Gateway(_) | CheckoutError::GatewayResponseUnrecognized
        )
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::EnrollmentNotFound | CheckoutError::CourseNotFound => {
                AppError::NotFound(anyhow::anyhow!(err.to_string()))
            }
            CheckoutError::NotPending(_) => AppError::Conflict(anyhow::anyhow!(err.to_string())),
            CheckoutError::InvalidFee => AppError::BadRequest(anyhow::anyhow!(err.to_string())),
            CheckoutError::Gateway(_) | CheckoutError::GatewayResponseUnrecognized => {
                AppError::BadGateway(err.to_string())
            }
            CheckoutError::Store(e) => e.into(),
        }
    }
}

/// Whole currency units charged for a fee; the fractional part is dropped.
pub fn chargeable_amount(fee: Decimal) -> Option<i64> {
    fee.trunc().to_i64().filter(|amount| *amount > 0)
}

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    config: CheckoutConfig,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    fn customer(&self, learner: &LearnerContext) -> Customer {
        Customer {
            firstname: learner
                .first_name
                .clone()
                .unwrap_or_else(|| DEFAULT_FIRST_NAME.to_string()),
            lastname: learner
                .last_name
                .clone()
                .unwrap_or_else(|| DEFAULT_LAST_NAME.to_string()),
            email: learner.email.clone(),
            phone_number: PhoneNumber {
                number: learner
                    .phone
                    .clone()
                    .unwrap_or_else(|| self.config.fallback_phone.clone()),
                country: self.config.fallback_country.clone(),
            },
        }
    }

    /// Creates the gateway transaction and records the pending payment.
    ///
    /// The payment is stored before any payment link is requested, so a
    /// webhook can settle it even if the learner never comes back.
    pub async fn initiate(
        &self,
        learner: &LearnerContext,
        enrollment_id: &str,
        callback_url: &str,
    ) -> Result<Payment, CheckoutError> {
        let enrollment = self
            .store
            .get_enrollment_for_learner(enrollment_id, &learner.learner_id)
            .await?
            .ok_or(CheckoutError::EnrollmentNotFound)?;

        if enrollment.status != EnrollmentStatus::Pending {
            return Err(CheckoutError::NotPending(enrollment.status.as_str()));
        }

        let course = self
            .store
            .get_course(&enrollment.course_id)
            .await?
            .ok_or(CheckoutError::CourseNotFound)?;

        let amount = chargeable_amount(course.fee).ok_or(CheckoutError::InvalidFee)?;

        let request = NewTransaction {
            description: format!("Course payment: {}", course.name),
            amount,
            currency: Currency {
                iso: self.config.currency.clone(),
            },
            callback_url: callback_url.to_string(),
            customer: self.customer(learner),
        };

        let transaction = self.gateway.create_transaction(&request).await?;

        let payment = Payment::new_pending(
            &enrollment.id,
            &transaction.id,
            Decimal::from(amount),
            &self.config.currency,
            PaymentMethod::MobileMoney,
        );
        self.store.create_payment(payment.clone()).await?;

        tracing::info!(
            enrollment_id = %enrollment.id,
            course_id = %course.id,
            transaction_id = %payment.transaction_id,
            amount = amount,
            "Pending payment recorded"
        );

        Ok(payment)
    }

    /// Hosted payment page for a transaction.
    pub async fn payment_link(&self, transaction_id: &str) -> Result<String, CheckoutError> {
        let document = self.gateway.get_transaction_link(transaction_id).await?;

        match resolve_redirect_url(&document) {
            RedirectLink::Found(url) => Ok(url),
            RedirectLink::NotFound => {
                tracing::error!(
                    transaction_id = %transaction_id,
                    response = %document,
                    "Payment link missing from gateway response"
                );
                Err(CheckoutError::GatewayResponseUnrecognized)
            }
        }
    }
}
