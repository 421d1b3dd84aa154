//! OpenAI-shaped wire types for the inbound and outbound surfaces
//!
//! Inbound requests follow the Chat Completions request body, with one
//! addition: an optional `provider` field that pins the upstream provider.
//! Outbound values follow `chat.completion`, `chat.completion.chunk` and the
//! `{"error": {...}}` envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Who authored a chat message.
///
/// Roles outside the OpenAI set (`developer`, vendor-specific ones) are kept
/// verbatim in [`MessageRole::Other`] and forwarded as sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Operator instructions
    System,
    User,
    /// Model output, also used for prior turns
    Assistant,
    Tool,
    #[serde(untagged)]
    Other(String),
}

impl MessageRole {
    /// Wire name of the role
    pub fn as_str(&self) -> &str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
            MessageRole::Other(role) => role,
        }
    }
}

/// Content of a message: plain text or OpenAI content parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text content
    Text(String),
    /// Structured content parts
    Parts(Vec<ContentPart>),
}

/// One entry of an array-valued `content`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text content part
    Text { text: String },
    /// Image reference
    ImageUrl { image_url: ImageUrl },
}

/// Image URL wrapper as sent by OpenAI clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl MessageContent {
    /// True for an empty string or an empty parts array
    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(s) => s.is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }

    /// Flatten to text. Text parts are joined with newlines, non-text parts
    /// are dropped since template providers only take a string.
    pub fn to_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// One turn of the inbound `messages` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,

    pub content: MessageContent,

    /// Participant name; template providers ignore it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    /// Create a message with text content
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Inbound chat completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChatRequest {
    /// Model name requested by the caller
    #[serde(default)]
    pub model: String,

    /// Explicit provider override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Conversation turns in order
    #[serde(default)]
    pub messages: Vec<Message>,

    /// Whether the caller wants an SSE stream back
    #[serde(default)]
    pub stream: bool,

    /// Forwarded only if the provider declares a `temperature` parameter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    /// Stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    /// Opaque end-user id, passed through like the other parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Any other fields the caller sent
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatRequest {
    /// Request for `model` with no sampling parameters set
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            ..Default::default()
        }
    }

    /// Pin the request to a provider
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Enable or disable streaming
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set max tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Look up a sampling parameter by its OpenAI name.
    ///
    /// Returns `None` when the caller did not send it.
    pub fn parameter(&self, name: &str) -> Option<Value> {
        match name {
            "temperature" => self.temperature.map(Value::from),
            "max_tokens" => self.max_tokens.map(Value::from),
            "top_p" => self.top_p.map(Value::from),
            "stop" => self.stop.clone(),
            "frequency_penalty" => self.frequency_penalty.map(Value::from),
            "presence_penalty" => self.presence_penalty.map(Value::from),
            "seed" => self.seed.map(Value::from),
            "user" => self.user.clone().map(Value::from),
            other => self.extra.get(other).cloned(),
        }
    }
}

/// Assistant message inside a completion choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Response choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub index: usize,
    pub message: CompletionMessage,
    pub finish_reason: Option<String>,
}

/// Token counts in OpenAI naming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CompletionUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    /// Always `prompt_tokens + completion_tokens`
    pub total_tokens: u32,
}

impl CompletionUsage {
    /// Build a usage record, deriving the total
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Complete, non-streaming chat response (`chat.completion`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    /// `chatcmpl-` followed by a fresh uuid
    pub id: String,
    pub object: String,
    /// Unix seconds
    pub created: i64,

    /// Model name the caller asked for
    pub model: String,

    /// Exactly one choice
    pub choices: Vec<CompletionChoice>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<CompletionUsage>,
}

impl ChatCompletion {
    /// Content of the first choice, if any
    pub fn content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// Incremental message content of one chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MessageDelta {
    /// Set on the first chunk of a stream only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,

    /// Content delta
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// The single choice carried by a chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: usize,
    pub delta: MessageDelta,
    /// Serialized as `null` until the final chunk, as OpenAI does
    pub finish_reason: Option<String>,
}

/// Streaming response chunk (`chat.completion.chunk`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,

    /// Usage (only in the final chunk, when the provider reported it)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<CompletionUsage>,
}

impl ChatCompletionChunk {
    /// Delta of the single choice
    pub fn delta(&self) -> Option<&MessageDelta> {
        self.choices.first().map(|c| &c.delta)
    }

    /// Finish reason of the single choice
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.finish_reason.as_deref())
    }
}

/// OpenAI error envelope: `{"error": {"message", "type", "code"}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

/// Body of the OpenAI error envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,

    #[serde(rename = "type")]
    pub error_type: String,

    pub code: String,
}

/// One event of an outbound SSE stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A completion chunk with its position in the stream
    Chunk {
        index: u64,
        chunk: ChatCompletionChunk,
    },
    /// The literal `[DONE]` terminator
    Done,
    /// Terminal error frame
    Error(ErrorEnvelope),
}

impl StreamEvent {
    /// Render as an SSE frame, including the blank-line terminator.
    ///
    /// Chunks carry their index in the SSE `id:` field.
    pub fn to_sse(&self) -> String {
        match self {
            StreamEvent::Chunk { index, chunk } => {
                let data = serde_json::to_string(chunk).unwrap_or_else(|_| "{}".to_string());
                format!("id: {index}\ndata: {data}\n\n")
            }
            StreamEvent::Done => "data: [DONE]\n\n".to_string(),
            StreamEvent::Error(envelope) => {
                let data = serde_json::to_string(envelope).unwrap_or_else(|_| "{}".to_string());
                format!("data: {data}\n\n")
            }
        }
    }

    /// Whether this event ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error(_))
    }
}
