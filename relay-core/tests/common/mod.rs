//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use relay_core::config::{HeaderTemplate, ProviderConfig, ProviderMetadata};
use relay_core::http::{ChunkStream, SingleResponse, Transport, UpstreamResponse};
use relay_core::providers::{GatewayResult, ProviderRegistry, UpstreamRequest};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, Once};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Route crate logs to the test harness. `RELAY_LOG` overrides the filter.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env("RELAY_LOG")
            .unwrap_or_else(|_| EnvFilter::new("relay_core=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

pub const QWEN_HEADER: &str = "POST /api/v2/chat/completions?chat_id=abc HTTP/1.1\n\
Host: {{host}}\n\
Authorization: {{authorization}}\n\
Content-Type: application/json\n\
Accept: text/event-stream\n";

pub fn qwen_metadata() -> Value {
    json!({
        "host": "chat.qwen.ai",
        "model_families": ["qwen", "qwq"],
        "parameters": {"temperature": "/temperature"}
    })
}

pub fn qwen_payload() -> Value {
    json!({
        "stream": true,
        "incremental_output": true,
        "chat_type": "t2t",
        "model": "qwen-max",
        "timestamp": 0,
        "messages": [{
            "role": "user",
            "content": "",
            "chat_type": "t2t",
            "timestamp": 0,
            "models": ["qwen-max"],
            "feature_config": {"thinking_enabled": false}
        }]
    })
}

pub fn provider(name: &str, metadata: Value, header: &str, payload: Value) -> ProviderConfig {
    let metadata: ProviderMetadata = serde_json::from_value(metadata).unwrap();
    let headers = HeaderTemplate::parse(header, "header.txt").unwrap();
    ProviderConfig::from_parts(name, metadata, headers, payload, None).unwrap()
}

/// qwen (streams when asked), plus a non-streaming `zhipu` without a
/// stream slot and a credential-less `local` provider
pub fn registry() -> ProviderRegistry {
    ProviderRegistry::from_configs(vec![
        provider("qwen", qwen_metadata(), QWEN_HEADER, qwen_payload()),
        provider(
            "zhipu",
            json!({"host": "open.bigmodel.cn", "model_families": ["glm"]}),
            "POST /api/paas/v4/chat/completions HTTP/1.1\nAuthorization: Bearer {{api_key}}\n",
            json!({"model": "", "messages": []}),
        ),
        provider(
            "local",
            json!({
                "host": "localhost:11434",
                "scheme": "http",
                "response": {
                    "format": "fields",
                    "framing": "ndjson",
                    "fields": {
                        "content": "/message/content",
                        "end_marker": {"pointer": "/done", "value": true}
                    }
                }
            }),
            "POST /api/chat HTTP/1.1\n",
            json!({"model": "", "messages": [], "stream": false}),
        ),
    ])
    .unwrap()
}

/// Write a provider folder
pub fn write_provider(root: &Path, name: &str, metadata: &Value, header: &str, payload: &Value) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("metadata.json"), serde_json::to_string_pretty(metadata).unwrap()).unwrap();
    fs::write(dir.join("header.txt"), header).unwrap();
    fs::write(dir.join("payload.json"), serde_json::to_string_pretty(payload).unwrap()).unwrap();
}

/// SSE frame in the qwen delta shape
pub fn qwen_frame(content: &str, status: &str) -> String {
    let frame = json!({
        "choices": [{"delta": {"role": "assistant", "content": content, "status": status}}]
    });
    format!("data: {}\n\n", frame)
}

/// What a [`ScriptedTransport`] answers with
#[derive(Clone)]
pub enum Script {
    Single(Value),
    Chunks(Vec<GatewayResult<Bytes>>),
    /// Never answers
    Hang,
}

/// Transport returning a fixed answer and recording what it was sent
pub struct ScriptedTransport {
    script: Script,
    sent: Mutex<Vec<UpstreamRequest>>,
}

impl ScriptedTransport {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<UpstreamRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: &UpstreamRequest,
        _request_id: Uuid,
    ) -> GatewayResult<UpstreamResponse> {
        self.sent.lock().unwrap().push(request.clone());
        match &self.script {
            Script::Single(body) => Ok(UpstreamResponse::Single(SingleResponse::json(
                serde_json::to_vec(body).unwrap(),
            ))),
            Script::Chunks(chunks) => {
                let chunks: ChunkStream = Box::pin(stream::iter(chunks.clone()));
                Ok(UpstreamResponse::Stream(chunks))
            }
            Script::Hang => futures::future::pending().await,
        }
    }
}

/// Split `body` at the given byte offsets
pub fn split_at(body: &[u8], cuts: &[usize]) -> Vec<GatewayResult<Bytes>> {
    let mut cuts: Vec<usize> = cuts.iter().map(|c| c % (body.len() + 1)).collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for cut in cuts.into_iter().chain(std::iter::once(body.len())) {
        if cut > start {
            chunks.push(Ok(Bytes::copy_from_slice(&body[start..cut])));
            start = cut;
        }
    }
    chunks
}
