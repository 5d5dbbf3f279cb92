//! Payment gateway port.
//!
//! The gateway's JSON is not uniform across endpoints and SDK versions, so
//! responses are kept as raw documents and normalized by the helpers here.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Payment gateway credentials not configured")]
    NotConfigured,

    #[error("Payment gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Payment gateway error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected payment gateway response: {0}")]
    MalformedResponse(String),

    #[error("Invalid payment gateway request: {0}")]
    InvalidRequest(String),
}

/// Payer details sent with a new transaction.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Customer {
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub phone_number: PhoneNumber,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PhoneNumber {
    pub number: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Currency {
    pub iso: String,
}

/// Body of a transaction creation request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewTransaction {
    pub description: String,
    /// Whole units of `currency`.
    pub amount: i64,
    pub currency: Currency,
    pub callback_url: String,
    pub customer: Customer,
}

/// Normalized view of a gateway transaction document.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayTransaction {
    pub id: String,
    pub status: Option<String>,
    pub raw: Value,
}

impl GatewayTransaction {
    pub fn from_document(raw: Value) -> Result<Self, GatewayError> {
        let id = extract_transaction_id(&raw).ok_or_else(|| {
            GatewayError::MalformedResponse("transaction id missing".to_string())
        })?;
        let status = extract_transaction_status(&raw);
        Ok(Self { id, status, raw })
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_transaction(
        &self,
        request: &NewTransaction,
    ) -> Result<GatewayTransaction, GatewayError>;

    async fn get_transaction(&self, transaction_id: &str)
        -> Result<GatewayTransaction, GatewayError>;

    /// Raw payment token document; see [`crate::services::redirect`].
    async fn get_transaction_link(&self, transaction_id: &str) -> Result<Value, GatewayError>;
}

const TRANSACTION_ENVELOPE: &str = "v1/transaction";

/// Identifier that may arrive as a JSON string or number.
pub fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Transaction id from a bare document or a `v1/transaction` envelope.
pub fn extract_transaction_id(document: &Value) -> Option<String> {
    document
        .get("id")
        .and_then(json_id)
        .or_else(|| {
            document
                .get(TRANSACTION_ENVELOPE)
                .and_then(|t| t.get("id"))
                .and_then(json_id)
        })
}

/// Status from `status`, then `data.status`, then `v1/transaction.status`.
pub fn extract_transaction_status(document: &Value) -> Option<String> {
    non_empty_str(document.get("status"))
        .or_else(|| non_empty_str(document.get("data").and_then(|d| d.get("status"))))
        .or_else(|| {
            non_empty_str(
                document
                    .get(TRANSACTION_ENVELOPE)
                    .and_then(|t| t.get("status")),
            )
        })
}
