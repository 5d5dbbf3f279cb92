//! Learner identity extractor.
//!
//! Extracts the authenticated learner from headers set by the BFF after it
//! has authenticated the user. This service never authenticates on its own.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use validator::ValidateEmail;

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const USER_EMAIL_HEADER: &str = "X-User-Email";
pub const USER_FIRST_NAME_HEADER: &str = "X-User-First-Name";
pub const USER_LAST_NAME_HEADER: &str = "X-User-Last-Name";
pub const USER_PHONE_HEADER: &str = "X-User-Phone";

/// The learner making the request.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnerContext {
    pub learner_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

pub(crate) fn header(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl<S> FromRequestParts<S> for LearnerContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let learner_id = header(parts, USER_ID_HEADER).ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!(
                "Missing X-User-ID header (required from BFF)"
            ))
        })?;

        let email = header(parts, USER_EMAIL_HEADER).ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!(
                "Missing X-User-Email header (required from BFF)"
            ))
        })?;
        if !email.validate_email() {
            return Err(AppError::Unauthorized(anyhow::anyhow!(
                "Invalid X-User-Email header"
            )));
        }

        tracing::Span::current().record("learner_id", learner_id.as_str());

        Ok(LearnerContext {
            learner_id,
            email,
            first_name: header(parts, USER_FIRST_NAME_HEADER),
            last_name: header(parts, USER_LAST_NAME_HEADER),
            phone: header(parts, USER_PHONE_HEADER),
        })
    }
}
