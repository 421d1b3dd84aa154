//! Response translation, non-streaming mode
//!
//! Provider responses are decoded by one of a closed set of strategies,
//! selected per provider by `response.format`:
//!
//! - `openai`: the body (or each stream frame) looks like an OpenAI
//!   completion or chunk, possibly with provider extras such as a
//!   `delta.status == "finished"` end marker.
//! - `fields`: JSON pointers name where content, role, finish reason and
//!   usage live, plus an optional end marker.
//!
//! The same decoder serves single bodies and stream frames, so a provider
//! described once works in both modes.

use crate::config::{FieldPointers, ProviderConfig, ResponseFormatKind, ResponseSpec};
use crate::protocol::{
    ChatCompletion, ChatRequest, CompletionChoice, CompletionMessage, CompletionUsage, MessageRole,
};
use crate::providers::error::{GatewayError, GatewayResult};
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

/// Finish reason used when the provider does not report one
pub const DEFAULT_FINISH_REASON: &str = "stop";

const FINISHED_STATUS: &str = "finished";
const CREATED_EVENT: &str = "response.created";

/// What one provider frame (or body) carries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameDelta {
    pub role: Option<String>,
    pub content: Option<String>,
    pub finish_reason: Option<String>,
    pub usage: Option<CompletionUsage>,
    /// The provider signalled the end of the stream
    pub done: bool,
}

impl FrameDelta {
    /// Whether the frame carries nothing worth emitting
    pub fn is_empty(&self) -> bool {
        self.role.is_none()
            && self.content.as_deref().is_none_or(str::is_empty)
            && self.finish_reason.is_none()
            && self.usage.is_none()
            && !self.done
    }
}

/// Decoding strategy of one provider
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseDecoder {
    OpenAi,
    Fields(FieldPointers),
}

impl ResponseDecoder {
    /// Strategy for a response spec. A `fields` spec without pointers is
    /// rejected at load, so it cannot reach this point.
    pub fn from_spec(spec: &ResponseSpec) -> Self {
        match (spec.format, &spec.fields) {
            (ResponseFormatKind::Fields, Some(fields)) => Self::Fields(fields.clone()),
            _ => Self::OpenAi,
        }
    }

    /// Strategy for a loaded provider
    pub fn for_provider(config: &ProviderConfig) -> Self {
        Self::from_spec(&config.metadata.response)
    }

    /// Decode a complete, non-streaming body.
    ///
    /// Missing generated content is a `provider_response_error`.
    pub fn decode_body(&self, body: &Value) -> GatewayResult<FrameDelta> {
        match self {
            Self::OpenAi => decode_openai_body(body),
            Self::Fields(fields) => {
                let delta = decode_fields(fields, body);
                if delta.content.is_none() {
                    return Err(GatewayError::response(format!(
                        "expected generated text at {}",
                        fields.content
                    )));
                }
                Ok(delta)
            }
        }
    }

    /// Decode one stream frame. `None` means the frame carries no delta and
    /// is skipped (keep-alives, `response.created` events and the like).
    pub fn decode_frame(&self, frame: &Value) -> Option<FrameDelta> {
        let delta = match self {
            Self::OpenAi => decode_openai_frame(frame)?,
            Self::Fields(fields) => decode_fields(fields, frame),
        };
        (!delta.is_empty()).then_some(delta)
    }
}

fn decode_openai_body(body: &Value) -> GatewayResult<FrameDelta> {
    let usage = body.get("usage").and_then(parse_usage);

    if let Some(choice) = body.pointer("/choices/0") {
        let finish_reason = string_at(choice, "/finish_reason");
        let message = choice.get("message").or_else(|| choice.get("delta"));
        if let Some(message) = message.filter(|m| m.is_object()) {
            return Ok(FrameDelta {
                role: string_at(message, "/role"),
                content: Some(string_at(message, "/content").unwrap_or_default()),
                finish_reason,
                usage,
                done: true,
            });
        }
    }

    if let Some(content) = body.get("content").and_then(Value::as_str) {
        return Ok(FrameDelta {
            role: string_at(body, "/role"),
            content: Some(content.to_string()),
            finish_reason: string_at(body, "/finish_reason"),
            usage,
            done: true,
        });
    }

    Err(GatewayError::response(
        "expected choices[0].message or a top-level content field",
    ))
}

fn decode_openai_frame(frame: &Value) -> Option<FrameDelta> {
    if frame.get(CREATED_EVENT).is_some() {
        return None;
    }

    let usage = frame.get("usage").and_then(parse_usage);
    let Some(choice) = frame.pointer("/choices/0") else {
        return usage.map(|usage| FrameDelta {
            usage: Some(usage),
            ..FrameDelta::default()
        });
    };

    let delta = choice
        .get("delta")
        .or_else(|| choice.get("message"))
        .filter(|d| d.is_object());
    let finished = delta
        .and_then(|d| d.get("status"))
        .and_then(Value::as_str)
        .is_some_and(|status| status == FINISHED_STATUS);

    Some(FrameDelta {
        role: delta.and_then(|d| string_at(d, "/role")),
        content: delta.and_then(|d| string_at(d, "/content")),
        finish_reason: string_at(choice, "/finish_reason"),
        usage,
        done: finished,
    })
}

fn decode_fields(fields: &FieldPointers, frame: &Value) -> FrameDelta {
    let lookup = |pointer: Option<&String>| pointer.and_then(|p| string_at(frame, p));

    let done = fields
        .end_marker
        .as_ref()
        .is_some_and(|marker| frame.pointer(&marker.pointer) == Some(&marker.value));

    FrameDelta {
        role: lookup(fields.role.as_ref()),
        content: string_at(frame, &fields.content),
        finish_reason: lookup(fields.finish_reason.as_ref()),
        usage: fields
            .usage
            .as_deref()
            .and_then(|p| frame.pointer(p))
            .and_then(parse_usage),
        done,
    }
}

fn string_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Read a usage object, accepting OpenAI names and the common
/// `input_tokens` / `output_tokens` variant
pub fn parse_usage(value: &Value) -> Option<CompletionUsage> {
    let count = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| value.get(*key).and_then(Value::as_u64))
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
    };

    let prompt = count(&["prompt_tokens", "input_tokens"]);
    let completion = count(&["completion_tokens", "output_tokens"]);
    if prompt.is_none() && completion.is_none() {
        return None;
    }

    let mut usage = CompletionUsage::new(prompt.unwrap_or(0), completion.unwrap_or(0));
    if let Some(total) = count(&["total_tokens"]) {
        usage.total_tokens = total;
    }
    Some(usage)
}

/// Rough token count: one token per four characters
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX)
}

/// Identity shared by every object of one response
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseContext {
    /// `chatcmpl-` followed by 29 hex characters
    pub id: String,
    /// Model name the caller asked for
    pub model: String,
    pub created: i64,
    /// Estimated prompt size, used when the provider reports no usage
    pub prompt_tokens: u32,
}

impl ResponseContext {
    /// Fresh identity for a response to `request`
    pub fn for_request(request: &ChatRequest) -> Self {
        let prompt: String = request
            .messages
            .iter()
            .map(|m| m.content.to_text())
            .collect();

        Self {
            id: completion_id(),
            model: request.model.clone(),
            created: Utc::now().timestamp(),
            prompt_tokens: estimate_tokens(&prompt),
        }
    }

    /// Usage for `completion_text`, estimated when the provider gave none
    pub fn usage_or_estimate(
        &self,
        reported: Option<CompletionUsage>,
        completion_text: &str,
    ) -> CompletionUsage {
        reported.unwrap_or_else(|| {
            CompletionUsage::new(self.prompt_tokens, estimate_tokens(completion_text))
        })
    }
}

/// New completion id
pub fn completion_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("chatcmpl-{}", &hex[..29])
}

/// Map a provider role string onto an OpenAI role, assistant by default.
/// Provider-private names such as `bot` never reach the caller.
pub fn completion_role(role: Option<&str>) -> MessageRole {
    match role.map(str::to_ascii_lowercase).as_deref() {
        Some("system") => MessageRole::System,
        Some("user") => MessageRole::User,
        Some("tool") => MessageRole::Tool,
        _ => MessageRole::Assistant,
    }
}

/// Running totals of a decoded stream
#[derive(Debug, Clone, Default)]
pub struct DeltaAccumulator {
    role: Option<String>,
    content: String,
    finish_reason: Option<String>,
    usage: Option<CompletionUsage>,
}

impl DeltaAccumulator {
    /// Fold one decoded frame in
    pub fn push(&mut self, delta: &FrameDelta) {
        if self.role.is_none() {
            self.role.clone_from(&delta.role);
        }
        if let Some(content) = &delta.content {
            self.content.push_str(content);
        }
        if delta.finish_reason.is_some() {
            self.finish_reason.clone_from(&delta.finish_reason);
        }
        if delta.usage.is_some() {
            self.usage = delta.usage;
        }
    }

    /// Text generated so far
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Last usage the provider reported
    pub fn usage(&self) -> Option<CompletionUsage> {
        self.usage
    }

    /// Last finish reason the provider reported
    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    /// Assemble the completion
    pub fn into_completion(self, ctx: &ResponseContext) -> ChatCompletion {
        let usage = ctx.usage_or_estimate(self.usage, &self.content);
        ChatCompletion {
            id: ctx.id.clone(),
            object: "chat.completion".to_string(),
            created: ctx.created,
            model: ctx.model.clone(),
            choices: vec![CompletionChoice {
                index: 0,
                message: CompletionMessage {
                    role: completion_role(self.role.as_deref()),
                    content: self.content,
                },
                finish_reason: Some(
                    self.finish_reason
                        .unwrap_or_else(|| DEFAULT_FINISH_REASON.to_string()),
                ),
            }],
            usage: Some(usage),
        }
    }
}

/// Translate a single upstream body into a completion
pub fn translate_body(
    decoder: &ResponseDecoder,
    ctx: &ResponseContext,
    body: &[u8],
) -> GatewayResult<ChatCompletion> {
    let value: Value = serde_json::from_slice(body)?;
    let delta = decoder.decode_body(&value)?;

    let mut acc = DeltaAccumulator::default();
    acc.push(&delta);
    Ok(acc.into_completion(ctx))
}
