//! Request translation
//!
//! Instantiates a provider's header and payload templates against one
//! inbound request. Pure: no I/O, and the only input besides the request is
//! the clock reading used for synthesized timestamps.

use crate::config::{
    assign_pointer, redact_header, ProviderConfig, SecretString, TimestampPolicy, TimestampUnit,
    API_KEY_SLOT, AUTHORIZATION_SLOT, HOST_SLOT,
};
use crate::protocol::{ChatRequest, Message};
use crate::providers::error::{GatewayError, GatewayResult};
use crate::providers::routing::ResolvedProvider;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// A fully materialized upstream call. Built per request, never mutated.
#[derive(Clone, PartialEq)]
pub struct UpstreamRequest {
    pub provider: String,
    pub method: Method,
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub query: Option<String>,
    /// Header lines in template order
    pub headers: Vec<(String, String)>,
    /// Serialized JSON payload
    pub body: Bytes,
    /// Whether the upstream is asked for a stream
    pub stream: bool,
}

impl UpstreamRequest {
    /// Full endpoint URL
    pub fn url(&self) -> String {
        match &self.query {
            Some(query) => format!("{}://{}{}?{}", self.scheme, self.host, self.path, query),
            None => format!("{}://{}{}", self.scheme, self.host, self.path),
        }
    }

    /// First header with the given name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Payload as a JSON value
    pub fn json_body(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

impl fmt::Debug for UpstreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: Vec<(&str, String)> = self
            .headers
            .iter()
            .map(|(name, value)| (name.as_str(), redact_header(name, value)))
            .collect();

        f.debug_struct("UpstreamRequest")
            .field("provider", &self.provider)
            .field("method", &self.method)
            .field("url", &self.url())
            .field("headers", &headers)
            .field("body_len", &self.body.len())
            .field("stream", &self.stream)
            .finish()
    }
}

/// Build the upstream request using the current time for timestamps
pub fn build_upstream_request(
    resolved: &ResolvedProvider,
    request: &ChatRequest,
    auth: Option<&SecretString>,
) -> GatewayResult<UpstreamRequest> {
    build_upstream_request_at(resolved, request, auth, Utc::now())
}

/// Build the upstream request with an explicit clock reading
pub fn build_upstream_request_at(
    resolved: &ResolvedProvider,
    request: &ChatRequest,
    auth: Option<&SecretString>,
    now: DateTime<Utc>,
) -> GatewayResult<UpstreamRequest> {
    if request.messages.is_empty() {
        return Err(GatewayError::InvalidRequest {
            message: "messages must not be empty".to_string(),
        });
    }

    let config = resolved.config.as_ref();
    let stream = config.upstream_streams(request.stream);
    let base = base_timestamp(config.metadata.timestamp.unit, now);

    let payload = build_payload(config, request, stream, base)?;
    let body = Bytes::from(serde_json::to_vec(&payload).map_err(|e| {
        GatewayError::InvalidRequest {
            message: format!("payload could not be serialized: {e}"),
        }
    })?);

    let method = Method::from_bytes(config.headers.method.as_bytes()).map_err(|e| {
        GatewayError::InvalidRequest {
            message: format!("invalid method '{}': {e}", config.headers.method),
        }
    })?;

    let headers = build_headers(config, auth);

    debug!(
        provider = %resolved.name,
        model = %request.model,
        messages = request.messages.len(),
        stream,
        "Built upstream request"
    );

    Ok(UpstreamRequest {
        provider: resolved.name.clone(),
        method,
        scheme: config.metadata.scheme.clone(),
        host: config.metadata.host.clone(),
        path: config.headers.path.clone(),
        query: config.headers.query.clone(),
        headers,
        body,
        stream,
    })
}

/// Current time in the policy's unit
pub fn base_timestamp(unit: TimestampUnit, now: DateTime<Utc>) -> i64 {
    match unit {
        TimestampUnit::Seconds => now.timestamp(),
        TimestampUnit::Milliseconds => now.timestamp_millis(),
    }
}

/// Timestamp of the message at `position`
pub fn message_timestamp(policy: &TimestampPolicy, base: i64, position: usize) -> i64 {
    let position = i64::try_from(position).unwrap_or(i64::MAX);
    base.saturating_add(position.saturating_mul(policy.gap))
}

fn build_payload(
    config: &ProviderConfig,
    request: &ChatRequest,
    stream: bool,
    base: i64,
) -> GatewayResult<Value> {
    let template = &config.payload;
    let mut payload = template.root().clone();

    let messages: Vec<Value> = request
        .messages
        .iter()
        .enumerate()
        .map(|(i, message)| {
            let timestamp = message_timestamp(&config.metadata.timestamp, base, i);
            Value::Object(build_message(config, message, &request.model, timestamp))
        })
        .collect();

    let slots = [
        (template.messages_pointer(), Value::Array(messages)),
        (template.model_pointer(), Value::String(request.model.clone())),
    ];
    for (pointer, value) in slots {
        assign(&mut payload, pointer, value)?;
    }

    if let Some(pointer) = template.stream_pointer() {
        assign(&mut payload, pointer, Value::Bool(stream))?;
    }
    if let Some(pointer) = template.timestamp_pointer() {
        assign(&mut payload, pointer, Value::from(base))?;
    }

    // Parameters the caller omitted keep their template value
    for (name, pointer) in template.parameters() {
        if let Some(value) = request.parameter(name) {
            assign(&mut payload, pointer, value)?;
        }
    }

    Ok(payload)
}

fn build_message(
    config: &ProviderConfig,
    message: &Message,
    model: &str,
    timestamp: i64,
) -> Map<String, Value> {
    let schema = config.payload.schema();
    let mut out = config.payload.message_template().clone();

    out.insert(
        schema.role_key.clone(),
        Value::String(schema.role_name(message.role.as_str()).to_string()),
    );
    out.insert(
        schema.content_key.clone(),
        Value::String(message.content.to_text()),
    );
    if let Some(key) = &schema.timestamp_key {
        out.insert(key.clone(), Value::from(timestamp));
    }
    if let Some(key) = &schema.models_key {
        out.insert(key.clone(), Value::Array(vec![Value::String(model.to_string())]));
    }

    out
}

fn assign(payload: &mut Value, pointer: &str, value: Value) -> GatewayResult<()> {
    // Pointers are validated at load, so this only fails on a corrupt template
    if assign_pointer(payload, pointer, value) {
        Ok(())
    } else {
        Err(GatewayError::InvalidRequest {
            message: format!("payload slot {pointer} is not assignable"),
        })
    }
}

fn build_headers(config: &ProviderConfig, auth: Option<&SecretString>) -> Vec<(String, String)> {
    let auth = auth.filter(|secret| !secret.is_empty());
    let mut headers = Vec::with_capacity(config.headers.headers.len() + 1);

    for line in &config.headers.headers {
        let mut value = line.value.replace(HOST_SLOT, &config.metadata.host);

        if line.has_auth_slot() {
            let Some(secret) = auth else {
                debug!(provider = %config.name, header = %line.name, "No credential forwarded, header dropped");
                continue;
            };
            value = value
                .replace(AUTHORIZATION_SLOT, secret.expose_secret().trim())
                .replace(API_KEY_SLOT, secret.bare_token());
        }

        headers.push((line.name.clone(), value));
    }

    if config.headers.get("content-type").is_none() {
        headers.push(("Content-Type".to_string(), "application/json".to_string()));
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HeaderTemplate, ProviderMetadata};
    use crate::protocol::{ContentPart, MessageContent};
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Arc;

    const HEADERS: &str = "POST /api/v2/chat/completions?chat_id=abc HTTP/1.1\n\
Host: {{host}}\n\
Authorization: {{authorization}}\n\
X-Api-Key: {{api_key}}\n\
Accept: text/event-stream\n";

    fn resolved(metadata: Value, payload: Value) -> ResolvedProvider {
        let metadata: ProviderMetadata = serde_json::from_value(metadata).unwrap();
        let headers = HeaderTemplate::parse(HEADERS, "header.txt").unwrap();
        let config = ProviderConfig::from_parts("qwen", metadata, headers, payload, None).unwrap();
        ResolvedProvider {
            name: "qwen".to_string(),
            config: Arc::new(config),
        }
    }

    fn qwen() -> ResolvedProvider {
        resolved(
            json!({
                "host": "chat.qwen.ai",
                "message": {"roles": {"assistant": "bot"}},
                "parameters": {"temperature": "/options/temperature"},
            }),
            json!({
                "stream": false,
                "model": "qwen-max",
                "chat_type": "t2t",
                "timestamp": 0,
                "options": {},
                "messages": [{
                    "role": "user",
                    "content": "",
                    "timestamp": 0,
                    "models": ["qwen-max"],
                    "feature_config": {"thinking_enabled": false}
                }]
            }),
        )
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn conversation() -> ChatRequest {
        ChatRequest::new(
            "qwen-7b",
            vec![
                Message::system("be brief"),
                Message::user("hi"),
                Message::assistant("hello"),
                Message::user("bye"),
            ],
        )
    }

    #[test]
    fn test_payload_slots_are_filled() {
        let request = conversation().with_stream(true).with_temperature(0.5);
        let upstream = build_upstream_request_at(&qwen(), &request, None, fixed_now()).unwrap();
        let body = upstream.json_body().unwrap();
        let base = fixed_now().timestamp();

        assert_eq!(body["model"], "qwen-7b");
        assert_eq!(body["stream"], true);
        assert_eq!(body["timestamp"], base);
        assert_eq!(body["chat_type"], "t2t");
        assert_eq!(body["options"]["temperature"], 0.5);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["role"], "bot");
        assert_eq!(messages[3]["content"], "bye");
        assert_eq!(messages[1]["models"], json!(["qwen-7b"]));
        assert_eq!(messages[1]["feature_config"]["thinking_enabled"], false);
        assert_eq!(messages[0]["timestamp"], base);
        assert_eq!(messages[3]["timestamp"], base + 30);
    }

    #[test]
    fn test_sampling_parameters_are_forwarded_exactly() {
        let provider = resolved(
            json!({
                "host": "chat.qwen.ai",
                "parameters": {
                    "temperature": "/options/temperature",
                    "top_p": "/options/top_p",
                    "presence_penalty": "/options/presence_penalty"
                },
            }),
            json!({"model": "", "options": {}, "messages": []}),
        );
        let request: ChatRequest = serde_json::from_value(json!({
            "model": "qwen-7b",
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 0.7,
            "top_p": 0.9,
            "presence_penalty": 0.1
        }))
        .unwrap();

        let body = build_upstream_request_at(&provider, &request, None, fixed_now())
            .unwrap()
            .json_body()
            .unwrap();
        assert_eq!(
            body["options"],
            json!({"temperature": 0.7, "top_p": 0.9, "presence_penalty": 0.1})
        );
    }

    #[test]
    fn test_unlisted_roles_pass_through() {
        let provider = resolved(
            json!({
                "host": "chat.qwen.ai",
                "message": {"roles": {"developer": "system"}},
            }),
            json!({"model": "", "messages": []}),
        );
        let request: ChatRequest = serde_json::from_value(json!({
            "model": "qwen-7b",
            "messages": [
                {"role": "developer", "content": "be brief"},
                {"role": "critic", "content": "too long"},
                {"role": "user", "content": "hi"}
            ]
        }))
        .unwrap();

        let body = build_upstream_request_at(&provider, &request, None, fixed_now())
            .unwrap()
            .json_body()
            .unwrap();
        let roles: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "critic", "user"]);
    }

    #[test]
    fn test_omitted_parameter_keeps_template_value() {
        let upstream = build_upstream_request_at(&qwen(), &conversation(), None, fixed_now()).unwrap();
        let body = upstream.json_body().unwrap();
        assert_eq!(body["options"], json!({}));
        assert_eq!(body["stream"], false);
        assert!(!upstream.stream);
    }

    #[test]
    fn test_headers_fill_host_and_credentials() {
        let auth = SecretString::new("Bearer sk-test-123456");
        let upstream =
            build_upstream_request_at(&qwen(), &conversation(), Some(&auth), fixed_now()).unwrap();

        assert_eq!(upstream.header("host"), Some("chat.qwen.ai"));
        assert_eq!(upstream.header("authorization"), Some("Bearer sk-test-123456"));
        assert_eq!(upstream.header("x-api-key"), Some("sk-test-123456"));
        assert_eq!(upstream.header("content-type"), Some("application/json"));
        assert_eq!(
            upstream.url(),
            "https://chat.qwen.ai/api/v2/chat/completions?chat_id=abc"
        );
        assert_eq!(upstream.method, Method::POST);
    }

    #[test]
    fn test_missing_credential_drops_auth_headers() {
        let upstream = build_upstream_request_at(&qwen(), &conversation(), None, fixed_now()).unwrap();

        assert!(upstream.header("authorization").is_none());
        assert!(upstream.header("x-api-key").is_none());
        assert_eq!(upstream.header("accept"), Some("text/event-stream"));
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let auth = SecretString::new("Bearer sk-test-123456");
        let upstream =
            build_upstream_request_at(&qwen(), &conversation(), Some(&auth), fixed_now()).unwrap();

        let rendered = format!("{:?}", upstream);
        assert!(!rendered.contains("sk-test-123456"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_translation_is_deterministic_for_fixed_clock() {
        let a = build_upstream_request_at(&qwen(), &conversation(), None, fixed_now()).unwrap();
        let b = build_upstream_request_at(&qwen(), &conversation(), None, fixed_now()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_messages_rejected() {
        let request = ChatRequest::new("qwen-7b", vec![]);
        let err = build_upstream_request_at(&qwen(), &request, None, fixed_now()).unwrap_err();
        assert_eq!(err.code(), "invalid_request");
    }

    #[test]
    fn test_content_parts_are_flattened() {
        let mut message = Message::user("");
        message.content = MessageContent::Parts(vec![
            ContentPart::Text {
                text: "first".to_string(),
            },
            ContentPart::Text {
                text: "second".to_string(),
            },
        ]);
        let request = ChatRequest::new("qwen-7b", vec![message]);
        let upstream = build_upstream_request_at(&qwen(), &request, None, fixed_now()).unwrap();

        assert_eq!(upstream.json_body().unwrap()["messages"][0]["content"], "first\nsecond");
    }

    #[test]
    fn test_millisecond_unit() {
        let provider = resolved(
            json!({"host": "h.example.com", "timestamp": {"unit": "milliseconds", "gap": 1}}),
            json!({"model": "", "messages": [{"role": "", "content": "", "timestamp": 0}]}),
        );
        let upstream = build_upstream_request_at(&provider, &conversation(), None, fixed_now()).unwrap();
        let body = upstream.json_body().unwrap();

        let base = fixed_now().timestamp_millis();
        assert_eq!(body["messages"][0]["timestamp"], base);
        assert_eq!(body["messages"][1]["timestamp"], base + 1);
        assert!(body.get("stream").is_none());
    }

    proptest! {
        #[test]
        fn prop_message_timestamps_strictly_increase(
            count in 1usize..64,
            gap in 1i64..10_000,
            base in 0i64..4_000_000_000_000,
        ) {
            let policy = TimestampPolicy { unit: TimestampUnit::Milliseconds, gap };
            let stamps: Vec<i64> = (0..count).map(|i| message_timestamp(&policy, base, i)).collect();

            prop_assert_eq!(stamps[0], base);
            for pair in stamps.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
        }
    }
}
