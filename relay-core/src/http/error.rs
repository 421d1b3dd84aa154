//! HTTP error mapping utilities

use crate::providers::error::GatewayError;
use reqwest::StatusCode;
use serde_json::Value;
use uuid::Uuid;

/// Longest raw body echoed back in an error message
const MAX_BODY_IN_MESSAGE: usize = 512;

/// Map a non-success upstream status and body to a [`GatewayError`]
pub fn map_http_error(status: StatusCode, body: Option<&str>, request_id: Uuid) -> GatewayError {
    // Prefer the provider's own message over the raw body
    let message = body
        .and_then(|b| serde_json::from_str::<Value>(b).ok())
        .and_then(|v| extract_error_message(&v))
        .or_else(|| body.map(str::trim).filter(|b| !b.is_empty()).map(truncate))
        .unwrap_or_else(|| {
            format!(
                "HTTP error {}",
                status.canonical_reason().unwrap_or(status.as_str())
            )
        });

    GatewayError::Upstream {
        status: Some(status.as_u16()),
        message: format!(
            "provider returned {}: {} [request_id: {}]",
            status.as_u16(),
            message,
            request_id
        ),
    }
}

/// Extract a human-readable message from a provider error body
pub fn extract_error_message(json: &Value) -> Option<String> {
    // OpenAI format: { "error": { "message": "...", "type": "...", "code": "..." } }
    if let Some(message) = json.pointer("/error/message").and_then(Value::as_str) {
        return Some(message.to_string());
    }

    // Generic format: { "message": "..." } or { "msg": "..." }
    for key in ["message", "msg"] {
        if let Some(message) = json.get(key).and_then(Value::as_str) {
            return Some(message.to_string());
        }
    }

    // Bare string: { "error": "..." }
    json.get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_BODY_IN_MESSAGE {
        return body.to_string();
    }
    let mut end = MAX_BODY_IN_MESSAGE;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
