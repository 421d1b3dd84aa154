//! Protocol module for the OpenAI-compatible surface
//!
//! This module defines the request and response shapes exchanged with
//! callers. Provider-native shapes never appear here; they live in the
//! provider templates and are handled by `providers`.

pub mod types;

pub use types::{
    ChatCompletion, ChatCompletionChunk, ChatRequest, ChunkChoice, CompletionChoice,
    CompletionMessage, CompletionUsage, ContentPart, ErrorBody, ErrorEnvelope, ImageUrl, Message,
    MessageContent, MessageDelta, MessageRole, StreamEvent,
};
