//! Payment page URL resolution from the gateway's token response.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectLink {
    Found(String),
    NotFound,
}

const FLAT_KEYS: [&str; 3] = ["url", "payment_link", "link"];
const TOKEN_CONTAINERS: [&str; 3] = ["token", "v1/token", "data"];
const TOKEN_KEYS: [&str; 3] = ["payment_link", "url", "link"];

type Strategy = fn(&Value) -> Option<String>;

fn first_url(document: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| document.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn flat_mapping(document: &Value) -> Option<String> {
    first_url(document, &FLAT_KEYS)
}

fn nested_token(document: &Value) -> Option<String> {
    TOKEN_CONTAINERS
        .iter()
        .filter_map(|container| document.get(*container))
        .filter(|token| token.is_object())
        .find_map(|token| first_url(token, &TOKEN_KEYS))
}

const STRATEGIES: [Strategy; 2] = [flat_mapping, nested_token];

/// Tries each known response shape in order.
pub fn resolve_redirect_url(document: &Value) -> RedirectLink {
    STRATEGIES
        .iter()
        .find_map(|strategy| strategy(document))
        .map(RedirectLink::Found)
        .unwrap_or(RedirectLink::NotFound)
}
