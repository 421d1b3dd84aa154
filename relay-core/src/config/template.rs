//! Payload templates with validated slots
//!
//! A [`PayloadTemplate`] is the provider's `payload.json` plus the JSON
//! pointers of every slot the request translator fills. All pointers are
//! checked against the template when it is built, so a missing placeholder
//! fails the load instead of a request.

use super::error::ValidationError;
use super::schema::{MessageSchema, ProviderMetadata};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const DEFAULT_MESSAGES_POINTER: &str = "/messages";
const DEFAULT_MODEL_POINTER: &str = "/model";
const DEFAULT_STREAM_POINTER: &str = "/stream";
const DEFAULT_TIMESTAMP_POINTER: &str = "/timestamp";
const DEFAULT_TIMESTAMP_KEY: &str = "timestamp";
const DEFAULT_MODELS_KEY: &str = "models";

/// Message schema with defaults applied against the message template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMessageSchema {
    pub role_key: String,
    pub content_key: String,
    pub timestamp_key: Option<String>,
    pub models_key: Option<String>,
    pub roles: BTreeMap<String, String>,
}

impl ResolvedMessageSchema {
    /// Provider name for an OpenAI role
    pub fn role_name<'a>(&'a self, role: &'a str) -> &'a str {
        self.roles.get(role).map(String::as_str).unwrap_or(role)
    }
}

/// A validated payload template
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadTemplate {
    root: Value,
    messages: String,
    message_template: Map<String, Value>,
    model: String,
    stream: Option<String>,
    timestamp: Option<String>,
    parameters: Vec<(String, String)>,
    schema: ResolvedMessageSchema,
}

impl PayloadTemplate {
    /// Build and validate a template. `field` prefixes error paths.
    pub fn new(root: Value, metadata: &ProviderMetadata, field: &str) -> Result<Self, ValidationError> {
        if !root.is_object() {
            return Err(ValidationError::unexpected(
                field,
                "a JSON object",
                json_kind(&root),
            ));
        }

        let messages = metadata
            .slots
            .messages
            .clone()
            .unwrap_or_else(|| DEFAULT_MESSAGES_POINTER.to_string());
        let message_list = root
            .pointer(&messages)
            .ok_or_else(|| ValidationError::unresolved_slot(field, "messages", &messages))?;
        let Some(items) = message_list.as_array() else {
            return Err(ValidationError::unexpected(
                format!("{field}{messages}"),
                "an array",
                json_kind(message_list),
            ));
        };
        let message_template = items
            .first()
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let model = metadata
            .slots
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL_POINTER.to_string());
        if root.pointer(&model).is_none() {
            return Err(ValidationError::unresolved_slot(field, "model", &model));
        }

        let stream = optional_slot(&root, metadata.slots.stream.as_deref(), DEFAULT_STREAM_POINTER, "stream", field)?;
        let timestamp = optional_slot(
            &root,
            metadata.slots.timestamp.as_deref(),
            DEFAULT_TIMESTAMP_POINTER,
            "timestamp",
            field,
        )?;

        let mut parameters = Vec::with_capacity(metadata.parameters.len());
        for (name, pointer) in &metadata.parameters {
            if !is_assignable(&root, pointer) {
                return Err(ValidationError::unresolved_slot(
                    format!("{field}.parameters"),
                    name,
                    pointer,
                ));
            }
            parameters.push((name.clone(), pointer.clone()));
        }

        let schema = resolve_schema(&metadata.message, &message_template);

        Ok(Self {
            root,
            messages,
            message_template,
            model,
            stream,
            timestamp,
            parameters,
            schema,
        })
    }

    /// The template document
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Pointer of the message list
    pub fn messages_pointer(&self) -> &str {
        &self.messages
    }

    /// Template every provider message is built from
    pub fn message_template(&self) -> &Map<String, Value> {
        &self.message_template
    }

    /// Pointer of the model name
    pub fn model_pointer(&self) -> &str {
        &self.model
    }

    /// Pointer of the stream flag, when the provider has one
    pub fn stream_pointer(&self) -> Option<&str> {
        self.stream.as_deref()
    }

    /// Pointer of the payload-level timestamp
    pub fn timestamp_pointer(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    /// Sampling parameter slots
    pub fn parameters(&self) -> &[(String, String)] {
        &self.parameters
    }

    /// Resolved message schema
    pub fn schema(&self) -> &ResolvedMessageSchema {
        &self.schema
    }
}

fn optional_slot(
    root: &Value,
    configured: Option<&str>,
    default: &str,
    slot: &str,
    field: &str,
) -> Result<Option<String>, ValidationError> {
    match configured {
        Some(pointer) if is_assignable(root, pointer) => Ok(Some(pointer.to_string())),
        Some(pointer) => Err(ValidationError::unresolved_slot(field, slot, pointer)),
        None if root.pointer(default).is_some() => Ok(Some(default.to_string())),
        None => Ok(None),
    }
}

fn resolve_schema(schema: &MessageSchema, template: &Map<String, Value>) -> ResolvedMessageSchema {
    let timestamp_key = schema.timestamp_key.clone().or_else(|| {
        template
            .contains_key(DEFAULT_TIMESTAMP_KEY)
            .then(|| DEFAULT_TIMESTAMP_KEY.to_string())
    });
    let models_key = schema.models_key.clone().or_else(|| {
        template
            .contains_key(DEFAULT_MODELS_KEY)
            .then(|| DEFAULT_MODELS_KEY.to_string())
    });

    ResolvedMessageSchema {
        role_key: schema.role_key.clone(),
        content_key: schema.content_key.clone(),
        timestamp_key,
        models_key,
        roles: schema.roles.clone(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Split a JSON pointer into its parent pointer and unescaped last token
fn split_pointer(pointer: &str) -> Option<(&str, String)> {
    let idx = pointer.rfind('/')?;
    let token = pointer[idx + 1..].replace("~1", "/").replace("~0", "~");
    Some((&pointer[..idx], token))
}

/// Whether `pointer` exists, or its parent is an object that can take it
pub fn is_assignable(root: &Value, pointer: &str) -> bool {
    if root.pointer(pointer).is_some() {
        return true;
    }
    match split_pointer(pointer) {
        Some((parent, _)) => root.pointer(parent).is_some_and(Value::is_object),
        None => false,
    }
}

/// Write `value` at `pointer`, creating the last key when the parent is an
/// object. Returns `false` when the pointer cannot be assigned.
pub fn assign_pointer(root: &mut Value, pointer: &str, value: Value) -> bool {
    if let Some(slot) = root.pointer_mut(pointer) {
        *slot = value;
        return true;
    }

    let Some((parent, key)) = split_pointer(pointer) else {
        return false;
    };
    match root.pointer_mut(parent).and_then(Value::as_object_mut) {
        Some(object) => {
            object.insert(key, value);
            true
        }
        None => false,
    }
}
