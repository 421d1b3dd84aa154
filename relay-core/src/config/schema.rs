//! Configuration schema structures with serde support

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Per-provider endpoint metadata (`metadata.json` / `metadata.yaml`)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProviderMetadata {
    /// Endpoint authority, `host[:port]`
    pub host: String,

    /// URL scheme used to reach the host
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Streaming behaviour of the provider. `None` follows the caller when
    /// the payload template has a stream slot, and is non-streaming otherwise.
    #[serde(default)]
    pub stream: Option<bool>,

    /// Lower-case tokens that route a model name to this provider
    #[serde(default)]
    pub model_families: Vec<String>,

    /// JSON pointers into the payload template
    #[serde(default)]
    pub slots: SlotPointers,

    /// Shape of a single provider message
    #[serde(default)]
    pub message: MessageSchema,

    /// OpenAI sampling parameter name -> JSON pointer in the payload
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,

    /// Synthesized message timestamps
    #[serde(default)]
    pub timestamp: TimestampPolicy,

    /// How responses are decoded
    #[serde(default)]
    pub response: ResponseSpec,
}

/// Named slots of the payload template, as JSON pointers
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SlotPointers {
    /// Message list, `/messages` when unset
    #[serde(default)]
    pub messages: Option<String>,

    /// Model name, `/model` when unset
    #[serde(default)]
    pub model: Option<String>,

    /// Stream flag, `/stream` when unset and present in the template
    #[serde(default)]
    pub stream: Option<String>,

    /// Payload-level timestamp, `/timestamp` when unset and present in the template
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Provider message shape
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MessageSchema {
    #[serde(default = "default_role_key")]
    pub role_key: String,

    #[serde(default = "default_content_key")]
    pub content_key: String,

    /// Per-message timestamp field, `timestamp` when unset and present in the message template
    #[serde(default)]
    pub timestamp_key: Option<String>,

    /// Field receiving `[model]`, `models` when unset and present in the message template
    #[serde(default)]
    pub models_key: Option<String>,

    /// Role renames, OpenAI role -> provider role
    #[serde(default)]
    pub roles: BTreeMap<String, String>,
}

impl Default for MessageSchema {
    fn default() -> Self {
        Self {
            role_key: default_role_key(),
            content_key: default_content_key(),
            timestamp_key: None,
            models_key: None,
            roles: BTreeMap::new(),
        }
    }
}

/// Unit of synthesized timestamps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampUnit {
    #[default]
    Seconds,
    Milliseconds,
}

/// Timestamp synthesis policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TimestampPolicy {
    #[serde(default)]
    pub unit: TimestampUnit,

    /// Gap between consecutive messages, in `unit`
    #[serde(default = "default_timestamp_gap")]
    pub gap: i64,
}

impl Default for TimestampPolicy {
    fn default() -> Self {
        Self {
            unit: TimestampUnit::Seconds,
            gap: default_timestamp_gap(),
        }
    }
}

/// Response decoding strategy tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormatKind {
    /// OpenAI-like `choices[0].message` / `choices[0].delta`
    #[default]
    Openai,
    /// Pointer-driven extraction, see [`FieldPointers`]
    Fields,
}

/// Framing of streamed provider output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamFraming {
    /// `data:` lines
    #[default]
    Sse,
    /// One JSON document per line
    Ndjson,
}

/// Response section of the metadata
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseSpec {
    #[serde(default)]
    pub format: ResponseFormatKind,

    /// Required when `format` is `fields`
    #[serde(default)]
    pub fields: Option<FieldPointers>,

    #[serde(default)]
    pub framing: StreamFraming,
}

/// Where generated content lives in a provider document
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FieldPointers {
    pub content: String,

    #[serde(default)]
    pub role: Option<String>,

    #[serde(default)]
    pub finish_reason: Option<String>,

    #[serde(default)]
    pub usage: Option<String>,

    #[serde(default)]
    pub end_marker: Option<EndMarker>,
}

/// A frame whose `pointer` equals `value` ends the stream
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EndMarker {
    pub pointer: String,
    pub value: Value,
}

/// Gateway settings file
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Directory holding one folder per provider
    pub providers_dir: PathBuf,

    #[serde(default)]
    pub transport: TransportConfig,

    /// Rules evaluated before the ones derived from provider metadata
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// Upstream HTTP client settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Deadline for a whole single-body exchange. Streams are exempt.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Longest silence tolerated between two reads of a response body
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_max_idle")]
    pub max_idle_per_host: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            max_idle_per_host: default_max_idle(),
            user_agent: default_user_agent(),
        }
    }
}

/// How a rule token is matched against the model name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    #[default]
    Contains,
    Prefix,
}

/// A resolver rule as written in the settings file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    pub token: String,
    pub provider: String,
    #[serde(default, rename = "match")]
    pub match_kind: MatchKind,
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_role_key() -> String {
    "role".to_string()
}

fn default_content_key() -> String {
    "content".to_string()
}

fn default_timestamp_gap() -> i64 {
    10
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    60
}

fn default_idle_timeout() -> u64 {
    30
}

fn default_max_idle() -> usize {
    10
}

fn default_user_agent() -> String {
    concat!("relay/", env!("CARGO_PKG_VERSION")).to_string()
}
