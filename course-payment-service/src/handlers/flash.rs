//! One-shot user messages carried in the session across redirects.

use axum::Json;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

pub const FLASH_KEY: &str = "flash_messages";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: FlashLevel,
    pub text: String,
}

/// Queues a message for the next page. Session failures are logged only.
pub async fn push_flash(session: &Session, level: FlashLevel, text: impl Into<String>) {
    let mut messages: Vec<FlashMessage> = match session.get(FLASH_KEY).await {
        Ok(messages) => messages.unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read flash messages");
            Vec::new()
        }
    };
    messages.push(FlashMessage {
        level,
        text: text.into(),
    });

    if let Err(e) = session.insert(FLASH_KEY, messages).await {
        tracing::warn!(error = %e, "Failed to store flash message");
    }
}

/// `GET /session/messages`: returns and clears the pending messages.
pub async fn take_flash(session: Session) -> Json<Vec<FlashMessage>> {
    let messages = match session.remove::<Vec<FlashMessage>>(FLASH_KEY).await {
        Ok(messages) => messages.unwrap_or_default(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read flash messages");
            Vec::new()
        }
    };
    Json(messages)
}
