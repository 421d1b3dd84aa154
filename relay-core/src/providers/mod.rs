//! Provider resolution and bidirectional translation
//!
//! The registry holds provider templates; the resolver picks one per
//! request; `transform` builds the upstream call; `response` and
//! `streaming` turn the answer back into OpenAI shapes.

pub mod error;
pub mod registry;
pub mod response;
pub mod routing;
pub mod streaming;
pub mod transform;

pub use error::{GatewayError, GatewayResult};
pub use registry::ProviderRegistry;
pub use response::{FrameDelta, ResponseContext, ResponseDecoder};
pub use routing::{ProviderResolver, ResolutionRule, ResolvedProvider};
pub use streaming::{
    collect_stream, emulate_stream, translate_stream, EventStream, Frame, FrameDecoder,
};
pub use transform::{build_upstream_request, build_upstream_request_at, UpstreamRequest};
