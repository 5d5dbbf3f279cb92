//! Browser-facing payment flow: checkout initiation and the gateway's
//! return (callback) URL. Both answer with 303 redirects.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Redirect,
};
use service_core::error::AppError;
use tower_sessions::Session;

use crate::{
    dtos::CallbackParams,
    handlers::flash::{push_flash, FlashLevel},
    middleware::LearnerContext,
    models::Payment,
    services::{metrics::record_checkout, reconciliation::CallbackOutcome, CheckoutError},
    AppState,
};

pub const LAST_TRANSACTION_KEY: &str = "last_transaction_id";
pub const LAST_ENROLLMENT_KEY: &str = "last_enrollment_id";
pub const CALLBACK_PATH: &str = "/payments/callback";

/// Absolute callback URL from `PUBLIC_BASE_URL`, else from the request host.
pub fn callback_url(public_base_url: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(base) = public_base_url {
        return format!("{}{}", base, CALLBACK_PATH);
    }

    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let scheme = header("x-forwarded-proto")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .unwrap_or("http");
    let host = header("host").unwrap_or("localhost");

    format!("{}://{}{}", scheme, host, CALLBACK_PATH)
}

async fn remember_checkout(session: &Session, payment: &Payment) {
    if let Err(e) = session
        .insert(LAST_TRANSACTION_KEY, &payment.transaction_id)
        .await
    {
        tracing::warn!(error = %e, "Failed to store transaction id in session");
    }
    if let Err(e) = session
        .insert(LAST_ENROLLMENT_KEY, &payment.enrollment_id)
        .await
    {
        tracing::warn!(error = %e, "Failed to store enrollment id in session");
    }
}

async fn gateway_unavailable(state: &AppState, session: &Session, err: CheckoutError) -> Redirect {
    tracing::error!(error = %err, "Checkout failed at the payment gateway");
    record_checkout("gateway_error");
    push_flash(
        session,
        FlashLevel::Error,
        format!("The payment service is unavailable: {}", err),
    )
    .await;
    Redirect::to(&state.config.checkout.dashboard_url)
}

/// `POST /enrollments/:id/payment`
pub async fn start_checkout(
    State(state): State<AppState>,
    session: Session,
    learner: LearnerContext,
    headers: HeaderMap,
    Path(enrollment_id): Path<String>,
) -> Result<Redirect, AppError> {
    let callback_url = callback_url(state.config.checkout.public_base_url.as_deref(), &headers);

    tracing::info!(
        enrollment_id = %enrollment_id,
        learner_id = %learner.learner_id,
        callback_url = %callback_url,
        "Starting checkout"
    );

    let payment = match state
        .checkout
        .initiate(&learner, &enrollment_id, &callback_url)
        .await
    {
        Ok(payment) => payment,
        Err(e) if e.is_gateway_failure() => {
            return Ok(gateway_unavailable(&state, &session, e).await);
        }
        Err(e) => return Err(e.into()),
    };

    remember_checkout(&session, &payment).await;

    match state.checkout.payment_link(&payment.transaction_id).await {
        Ok(url) => {
            tracing::info!(
                transaction_id = %payment.transaction_id,
                redirect_url = %url,
                "Redirecting to payment page"
            );
            record_checkout("redirected");
            Ok(Redirect::to(&url))
        }
        Err(e) => Ok(gateway_unavailable(&state, &session, e).await),
    }
}

/// `GET /payments/callback`
///
/// The learner's browser returning from the gateway. Never fails; the
/// learner always lands on the course list.
pub async fn payment_callback(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    let from_session = match session.get::<String>(LAST_TRANSACTION_KEY).await {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read transaction id from session");
            None
        }
    };
    let transaction_id = params
        .transaction_id()
        .map(str::to_string)
        .or(from_session);

    let outcome = state
        .reconciler
        .reconcile_callback(transaction_id.as_deref())
        .await;

    match outcome {
        CallbackOutcome::Confirmed => {
            push_flash(
                &session,
                FlashLevel::Success,
                "Payment confirmed. Your course access is now active.",
            )
            .await
        }
        CallbackOutcome::AwaitingConfirmation => {
            push_flash(
                &session,
                FlashLevel::Info,
                "Payment received. Course access unlocks once the payment provider confirms it.",
            )
            .await
        }
    }

    Redirect::to(&state.config.checkout.courses_url)
}
