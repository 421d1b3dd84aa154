//! Request pipeline
//!
//! Resolver, request translator, transport and response translator, wired
//! together for one inbound request. The HTTP façade in front of this only
//! parses the body, forwards the caller's `Authorization` value, and writes
//! out the [`ChatOutcome`] or the error envelope.
//!
//! | caller `stream` | upstream answer | outcome |
//! |---|---|---|
//! | false | single | completion |
//! | true | stream | translated live stream |
//! | true | single | emulated stream |
//! | false | stream | stream collected into a completion |

use crate::config::{ConfigError, GatewayConfig, RuleConfig, SecretString};
use crate::http::{HttpClient, Transport, UpstreamResponse};
use crate::protocol::{ChatCompletion, ChatRequest};
use crate::providers::error::{GatewayError, GatewayResult};
use crate::providers::registry::ProviderRegistry;
use crate::providers::response::{translate_body, ResponseContext, ResponseDecoder};
use crate::providers::routing::{ProviderResolver, ResolvedProvider};
use crate::providers::streaming::{collect_stream, emulate_stream, translate_stream, EventStream};
use crate::providers::transform::build_upstream_request;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of one chat request
pub enum ChatOutcome {
    /// A `chat.completion` object
    Completion(ChatCompletion),
    /// SSE events, ending with `[DONE]` or an error frame
    Stream(EventStream),
}

impl ChatOutcome {
    /// Whether the façade should answer with `text/event-stream`
    pub fn is_stream(&self) -> bool {
        matches!(self, ChatOutcome::Stream(_))
    }
}

impl fmt::Debug for ChatOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completion(completion) => f.debug_tuple("Completion").field(completion).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// The gateway core. Cheap to clone; every clone shares the registry.
#[derive(Clone)]
pub struct Gateway {
    registry: Arc<ProviderRegistry>,
    resolver: ProviderResolver,
    transport: Arc<dyn Transport>,
}

impl Gateway {
    /// Gateway using only the rules declared by the providers
    pub fn new(
        registry: Arc<ProviderRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        Self::with_rules(registry, transport, Vec::new())
    }

    /// Gateway with extra resolver rules, evaluated before provider rules
    pub fn with_rules(
        registry: Arc<ProviderRegistry>,
        transport: Arc<dyn Transport>,
        rules: Vec<RuleConfig>,
    ) -> Result<Self, ConfigError> {
        let resolver = ProviderResolver::from_registry(&registry, rules)?;
        Ok(Self {
            registry,
            resolver,
            transport,
        })
    }

    /// Load providers and build the reqwest transport from settings
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        let registry = ProviderRegistry::load(&config.providers_dir)?;
        let transport = HttpClient::with_config(&config.transport).map_err(|e| {
            ConfigError::Invalid {
                message: e.to_string(),
            }
        })?;
        Self::with_rules(Arc::new(registry), Arc::new(transport), config.rules.clone())
    }

    /// The loaded providers
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Resolve a request without sending anything
    pub fn resolve(&self, request: &ChatRequest) -> GatewayResult<ResolvedProvider> {
        self.resolver.resolve(&self.registry, request)
    }

    /// Serve one chat request.
    ///
    /// `auth` is the caller's `Authorization` value, used only when the
    /// provider's header template declares a credential slot. `cancel`
    /// aborts the upstream call at any suspension point.
    pub async fn chat(
        &self,
        request: ChatRequest,
        auth: Option<SecretString>,
        cancel: CancellationToken,
    ) -> GatewayResult<ChatOutcome> {
        let request_id = Uuid::new_v4();
        let resolved = self.resolve(&request)?;
        let upstream = build_upstream_request(&resolved, &request, auth.as_ref())?;

        info!(
            "Chat request for model {} via {} (caller stream: {}, upstream stream: {}) [request_id: {}]",
            request.model, resolved.name, request.stream, upstream.stream, request_id
        );

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Cancelled before the provider answered [request_id: {}]", request_id);
                return Err(GatewayError::Cancelled);
            }
            response = self.transport.send(&upstream, request_id) => response?,
        };

        let decoder = ResponseDecoder::for_provider(&resolved.config);
        let framing = resolved.config.metadata.response.framing;
        let ctx = ResponseContext::for_request(&request);

        let outcome = match (response, request.stream) {
            (UpstreamResponse::Single(single), false) => {
                ChatOutcome::Completion(translate_body(&decoder, &ctx, &single.body)?)
            }
            (UpstreamResponse::Single(single), true) => {
                debug!("Emulating stream from a single response [request_id: {}]", request_id);
                let completion = translate_body(&decoder, &ctx, &single.body)?;
                ChatOutcome::Stream(emulate_stream(completion))
            }
            (UpstreamResponse::Stream(chunks), true) => {
                ChatOutcome::Stream(translate_stream(chunks, decoder, framing, ctx, cancel))
            }
            (UpstreamResponse::Stream(chunks), false) => {
                debug!("Collecting upstream stream into one completion [request_id: {}]", request_id);
                let completion = collect_stream(chunks, decoder, framing, &ctx, &cancel).await?;
                ChatOutcome::Completion(completion)
            }
        };

        Ok(outcome)
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("providers", &self.registry.names())
            .field("rules", &self.resolver.rules().len())
            .finish()
    }
}
