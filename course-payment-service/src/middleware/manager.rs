//! Manager identity extractor for payment administration.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;

use super::learner::{header, USER_ID_HEADER};

pub const USER_ROLE_HEADER: &str = "X-User-Role";
pub const MANAGER_ROLE: &str = "manager";

/// A user the BFF has authenticated with the manager role.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerContext {
    pub manager_id: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for ManagerContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let manager_id = header(parts, USER_ID_HEADER).ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!(
                "Missing X-User-ID header (required from BFF)"
            ))
        })?;

        let is_manager = header(parts, USER_ROLE_HEADER)
            .is_some_and(|role| role.eq_ignore_ascii_case(MANAGER_ROLE));
        if !is_manager {
            return Err(AppError::Forbidden(anyhow::anyhow!("Manager role required")));
        }

        Ok(ManagerContext { manager_id })
    }
}
