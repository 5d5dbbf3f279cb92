//! HTTP handlers for course-payment-service.

pub mod enrollments;
pub mod flash;
pub mod manager;
pub mod payments;
pub mod webhooks;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::{services::get_metrics, AppState};

/// Liveness check.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": state.config.service_name,
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Readiness check. Not ready while the gateway has no API key.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.gateway_configured {
        (StatusCode::OK, Json(json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "reason": "payment gateway not configured" })),
        )
    }
}

pub async fn metrics() -> impl IntoResponse {
    get_metrics()
}
