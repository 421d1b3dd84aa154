//! Upstream transport
//!
//! The [`Transport`] trait is the seam between the translators and the
//! network. The response translator only relies on its chunk contract:
//!
//! - chunks arrive in send order, never duplicated;
//! - a connection failure surfaces as an `Err` item on the stream, never as a
//!   silent early end;
//! - dropping the stream closes the upstream connection.
//!
//! [`client::HttpClient`] is the reqwest implementation.

pub mod client;
pub mod error;

pub use client::HttpClient;

use crate::providers::error::GatewayResult;
use crate::providers::transform::UpstreamRequest;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use uuid::Uuid;

/// Raw upstream chunks, in arrival order
pub type ChunkStream = Pin<Box<dyn Stream<Item = GatewayResult<Bytes>> + Send>>;

/// A complete upstream response
#[derive(Debug, Clone, PartialEq)]
pub struct SingleResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl SingleResponse {
    /// 200 response with a JSON body
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: body.into(),
        }
    }
}

/// What the transport hands back
pub enum UpstreamResponse {
    Single(SingleResponse),
    Stream(ChunkStream),
}

impl fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(single) => f.debug_tuple("Single").field(single).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Issues upstream calls
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request`. Non-success statuses are errors; `request.stream`
    /// asks for a chunk stream, which the transport may still answer with a
    /// single response when the provider replies with plain JSON.
    async fn send(
        &self,
        request: &UpstreamRequest,
        request_id: Uuid,
    ) -> GatewayResult<UpstreamResponse>;
}
