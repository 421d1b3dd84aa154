//! reqwest-backed upstream transport

use crate::config::TransportConfig;
use crate::http::error::map_http_error;
use crate::http::{ChunkStream, SingleResponse, Transport, UpstreamResponse};
use crate::providers::error::{GatewayError, GatewayResult};
use crate::providers::transform::UpstreamRequest;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, Response};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Cap on a buffered (non-streamed) upstream body
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

/// Headers reqwest derives from the body, or that only describe one hop.
/// `Host` is forwarded: a literal template value wins over the URL authority.
const SKIPPED_HEADERS: [&str; 3] = ["content-length", "transfer-encoding", "connection"];

/// Pooled transport shared by every request the gateway serves
#[derive(Clone)]
pub struct HttpClient {
    client: Arc<Client>,

    /// Total deadline for single-body calls
    request_timeout: Duration,

    /// Applies to single bodies only; streams are consumed incrementally
    max_response_size: usize,
}

impl HttpClient {
    /// Transport with default timeouts and pool size
    pub fn new() -> GatewayResult<Self> {
        Self::with_config(&TransportConfig::default())
    }

    pub fn with_config(config: &TransportConfig) -> GatewayResult<Self> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.idle_timeout_secs))
            .user_agent(config.user_agent.as_str())
            .gzip(true)
            .build()
            .map_err(|e| GatewayError::upstream(format!("cannot build upstream client: {}", e)))?;

        Ok(Self {
            client: Arc::new(client),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            max_response_size: MAX_RESPONSE_SIZE,
        })
    }

    /// Override the single-response size limit
    pub fn with_max_response_size(mut self, max_response_size: usize) -> Self {
        self.max_response_size = max_response_size;
        self
    }

    fn build_request(
        &self,
        request: &UpstreamRequest,
        request_id: Uuid,
    ) -> GatewayResult<reqwest::RequestBuilder> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url())
            .body(request.body.clone());

        // A live stream may run for minutes; only a stalled read ends it
        if !request.stream {
            builder = builder.timeout(self.request_timeout);
        }

        for (name, value) in &request.headers {
            if SKIPPED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
                continue;
            }
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| GatewayError::InvalidRequest {
                message: format!("invalid header name '{}': {}", name, e),
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| GatewayError::InvalidRequest {
                message: format!("invalid value for header '{}': {}", name.as_str(), e),
            })?;
            builder = builder.header(name, value);
        }

        Ok(builder.header("X-Request-ID", request_id.to_string()))
    }

    /// Reject a body whose declared length is over the cap before reading it
    fn check_content_length(&self, response: &Response, request_id: Uuid) -> GatewayResult<()> {
        if let Some(content_length) = response.content_length() {
            if content_length > self.max_response_size as u64 {
                return Err(GatewayError::response(format!(
                    "upstream declared {} bytes, limit is {} [request_id: {}]",
                    content_length, self.max_response_size, request_id
                )));
            }
        }
        Ok(())
    }

    async fn read_single(&self, response: Response, request_id: Uuid) -> GatewayResult<SingleResponse> {
        self.check_content_length(&response, request_id)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(|e| {
            GatewayError::upstream(format!(
                "upstream body read failed: {} [request_id: {}]",
                e, request_id
            ))
        })?;

        // Content-Length may be absent or wrong
        if body.len() > self.max_response_size {
            return Err(GatewayError::response(format!(
                "upstream sent {} bytes, limit is {} [request_id: {}]",
                body.len(),
                self.max_response_size,
                request_id
            )));
        }

        Ok(SingleResponse {
            status,
            headers,
            body,
        })
    }
}

/// Whether a streaming call was answered with a plain JSON document
fn is_plain_json(response: &Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase())
        .is_some_and(|v| v.starts_with("application/json"))
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(
        &self,
        request: &UpstreamRequest,
        request_id: Uuid,
    ) -> GatewayResult<UpstreamResponse> {
        info!(
            "Sending upstream request to {} (stream: {}) [request_id: {}]",
            request.provider, request.stream, request_id
        );
        debug!("Request URL: {} {}", request.method, request.url());

        let response = self
            .build_request(request, request_id)?
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    warn!("Timed out waiting for {} [request_id: {}]", request.provider, request_id);
                } else {
                    error!(
                        "Could not reach {} [request_id: {}]: {}",
                        request.provider, request_id, e
                    );
                }
                GatewayError::from(e)
            })?;

        let status = response.status();
        debug!("Upstream answered {} [request_id: {}]", status, request_id);

        if !status.is_success() {
            let body = response.text().await.ok();
            warn!(
                "{} rejected the request with {} [request_id: {}]",
                request.provider, status, request_id
            );
            return Err(map_http_error(status, body.as_deref(), request_id));
        }

        if !request.stream || is_plain_json(&response) {
            if request.stream {
                debug!(
                    "Streaming call answered with application/json, reading single body [request_id: {}]",
                    request_id
                );
            }
            let single = self.read_single(response, request_id).await?;
            return Ok(UpstreamResponse::Single(single));
        }

        let chunks: ChunkStream = Box::pin(
            response
                .bytes_stream()
                .map(move |item| item.map_err(GatewayError::from)),
        );
        Ok(UpstreamResponse::Stream(chunks))
    }
}
