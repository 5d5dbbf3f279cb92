//! FedaPay webhook endpoint.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde_json::json;
use service_core::error::AppError;

use crate::{
    services::{
        metrics::record_webhook,
        reconciliation::ReconciliationError,
        webhook_signature::{mask, verify_webhook, SIGNATURE_HEADER},
    },
    AppState,
};

/// `POST /webhooks/fedapay`
///
/// Verifies the signature over the raw body before anything is parsed.
/// Unsigned or tampered deliveries get 403 and are never processed.
pub async fn fedapay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let fedapay = &state.config.fedapay;
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    tracing::debug!(
        signature = %header.map(mask).unwrap_or_else(|| "-".to_string()),
        body_len = body.len(),
        "Received FedaPay webhook"
    );

    if let Err(rejection) = verify_webhook(
        fedapay.webhook_secret.expose_secret(),
        header,
        &body,
        fedapay.signature_tolerance_seconds,
        Utc::now().timestamp(),
    ) {
        tracing::warn!(reason = %rejection, "Webhook signature rejected");
        record_webhook("forbidden");
        return Ok((StatusCode::FORBIDDEN, Json(json!({ "status": "forbidden" }))).into_response());
    }

    match state.reconciler.handle_webhook(&body).await {
        Ok(ack) => Ok((StatusCode::OK, Json(json!({ "status": ack.as_str() }))).into_response()),
        Err(e @ ReconciliationError::UnknownTransaction(_)) => {
            Err(AppError::NotFound(anyhow::anyhow!(e.to_string())))
        }
    }
}
