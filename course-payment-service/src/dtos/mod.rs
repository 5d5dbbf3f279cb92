use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{
    Enrollment, EnrollmentStatus, Payment, PaymentStatus, ReconciliationChannel,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct EnrollmentResponse {
    pub id: String,
    pub course_id: String,
    pub status: EnrollmentStatus,
    pub enrolled_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Enrollment> for EnrollmentResponse {
    fn from(enrollment: Enrollment) -> Self {
        Self {
            id: enrollment.id,
            course_id: enrollment.course_id,
            status: enrollment.status,
            enrolled_at: enrollment.enrolled_at,
            updated_at: enrollment.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub transaction_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub reconciled_via: Option<ReconciliationChannel>,
    pub updated_at: DateTime<Utc>,
}

impl From<Payment> for PaymentSummary {
    fn from(payment: Payment) -> Self {
        Self {
            transaction_id: payment.transaction_id,
            amount: payment.amount,
            currency: payment.currency,
            status: payment.status,
            reconciled_via: payment.reconciled_via,
            updated_at: payment.updated_at,
        }
    }
}

/// An enrollment with its most recent payment attempt.
#[derive(Debug, Serialize, Deserialize)]
pub struct EnrollmentDetails {
    #[serde(flatten)]
    pub enrollment: EnrollmentResponse,
    pub latest_payment: Option<PaymentSummary>,
}

/// Manager request to force a payment status.
#[derive(Debug, Deserialize, Validate)]
pub struct PaymentStatusUpdate {
    pub status: PaymentStatus,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// Query parameters FedaPay may append to the callback URL.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub id: Option<String>,
    pub transaction_id: Option<String>,
    pub trans_id: Option<String>,
    pub transaction: Option<String>,
}

impl CallbackParams {
    /// First non-empty of `id`, `transaction_id`, `trans_id`, `transaction`.
    pub fn transaction_id(&self) -> Option<&str> {
        [
            &self.id,
            &self.transaction_id,
            &self.trans_id,
            &self.transaction,
        ]
        .into_iter()
        .filter_map(|v| v.as_deref())
        .map(str::trim)
        .find(|v| !v.is_empty())
    }
}
