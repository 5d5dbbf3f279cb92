use serde_json::Value;

use crate::services::gateway::json_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Approved,
    Declined,
    Other,
}

/// A verified FedaPay webhook event, classified.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub name: Option<String>,
    pub kind: EventKind,
    pub transaction_id: Option<String>,
    pub payload: Value,
}

const APPROVED_EVENT: &str = "transaction.approved";
const DECLINED_EVENTS: [&str; 2] = ["transaction.declined", "transaction.canceled"];
const DECLINED_STATUSES: [&str; 2] = ["declined", "canceled"];

fn str_at<'a>(payload: &'a Value, pointer: &str) -> Option<&'a str> {
    payload.pointer(pointer).and_then(Value::as_str)
}

impl WebhookEvent {
    pub fn from_payload(payload: Value) -> Self {
        let name = str_at(&payload, "/name").map(str::to_string);
        let status = str_at(&payload, "/status");
        let entity_status = str_at(&payload, "/entity/status");

        let approved = status == Some("approved")
            || entity_status == Some("approved")
            || name.as_deref() == Some(APPROVED_EVENT);

        let declined = name
            .as_deref()
            .is_some_and(|n| DECLINED_EVENTS.contains(&n))
            || [status, entity_status]
                .into_iter()
                .flatten()
                .any(|s| DECLINED_STATUSES.contains(&s));

        let kind = if approved {
            EventKind::Approved
        } else if declined {
            EventKind::Declined
        } else {
            EventKind::Other
        };

        // Top-level id first, then the entity's.
        let transaction_id = payload
            .get("id")
            .and_then(json_id)
            .or_else(|| payload.pointer("/entity/id").and_then(json_id));

        Self {
            name,
            kind,
            transaction_id,
            payload,
        }
    }
}
