//! Integration tests for provider folder loading and gateway settings

mod common;

use common::{init_tracing, qwen_metadata, qwen_payload, write_provider, QWEN_HEADER};
use relay_core::config::{load_from_json, load_from_yaml, ConfigError, MatchKind, ValidationErrorKind};
use relay_core::providers::{ProviderRegistry, ProviderResolver};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Write a settings file (or stray file) at the root of `dir`
fn write_root_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let target = dir.path().join(name);
    fs::write(&target, content).unwrap();
    target
}

#[test]
fn test_load_provider_folders() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    write_provider(dir.path(), "Qwen", &qwen_metadata(), QWEN_HEADER, &qwen_payload());
    write_provider(
        dir.path(),
        "zhipu",
        &json!({"host": "open.bigmodel.cn", "model_families": ["glm"]}),
        "POST /api/paas/v4/chat/completions HTTP/1.1\nAuthorization: Bearer {{api_key}}\n",
        &json!({"model": "", "messages": []}),
    );
    write_root_file(&dir, "README.md", "not a provider");
    fs::create_dir(dir.path().join(".git")).unwrap();

    let registry = ProviderRegistry::load(dir.path()).unwrap();

    assert_eq!(registry.names(), vec!["qwen", "zhipu"]);
    let qwen = registry.lookup("QWEN").unwrap();
    assert_eq!(qwen.metadata.host, "chat.qwen.ai");
    assert_eq!(qwen.headers.path, "/api/v2/chat/completions");
    assert_eq!(qwen.headers.query.as_deref(), Some("chat_id=abc"));
    assert_eq!(qwen.payload.stream_pointer(), Some("/stream"));
}

#[test]
fn test_response_example_is_kept_verbatim() {
    let dir = TempDir::new().unwrap();
    write_provider(dir.path(), "qwen", &qwen_metadata(), QWEN_HEADER, &qwen_payload());
    let example = "## Streaming\n\n```\ndata: {\"choices\": [...]}\n```\n";
    fs::write(dir.path().join("qwen").join("response_example.md"), example).unwrap();

    let registry = ProviderRegistry::load(dir.path()).unwrap();
    assert_eq!(registry.response_example("qwen"), Some(example));
}

#[test]
fn test_metadata_yaml_is_accepted() {
    let dir = TempDir::new().unwrap();
    let provider_dir = dir.path().join("ollama");
    fs::create_dir(&provider_dir).unwrap();
    fs::write(
        provider_dir.join("metadata.yaml"),
        r#"
host: localhost:11434
scheme: http
stream: true
model_families: [llama]
response:
  format: fields
  framing: ndjson
  fields:
    content: /message/content
    end_marker:
      pointer: /done
      value: true
"#,
    )
    .unwrap();
    fs::write(provider_dir.join("header.txt"), "POST /api/chat HTTP/1.1\n").unwrap();
    fs::write(provider_dir.join("payload.json"), r#"{"model": "", "messages": []}"#).unwrap();

    let registry = ProviderRegistry::load(dir.path()).unwrap();
    let config = registry.lookup("ollama").unwrap();
    assert_eq!(config.metadata.stream, Some(true));
    assert!(config.upstream_streams(false));
}

#[test]
fn test_missing_artifact_fails_load() {
    let dir = TempDir::new().unwrap();
    write_provider(dir.path(), "qwen", &qwen_metadata(), QWEN_HEADER, &qwen_payload());
    fs::remove_file(dir.path().join("qwen").join("header.txt")).unwrap();

    let err = ProviderRegistry::load(dir.path()).unwrap_err();
    match &err {
        ConfigError::MissingArtifact { provider, artifact, .. } => {
            assert_eq!(provider, "qwen");
            assert_eq!(*artifact, "header.txt");
        }
        other => panic!("expected MissingArtifact, got {:?}", other),
    }
    assert_eq!(err.code(), "provider_config_error");
}

#[test]
fn test_malformed_payload_reports_position() {
    let dir = TempDir::new().unwrap();
    write_provider(dir.path(), "qwen", &qwen_metadata(), QWEN_HEADER, &qwen_payload());
    fs::write(dir.path().join("qwen").join("payload.json"), "{\n  \"model\": ,\n}").unwrap();

    let err = ProviderRegistry::load(dir.path()).unwrap_err();
    match err {
        ConfigError::ParseError { line, path, .. } => {
            assert_eq!(line, Some(2));
            assert!(path.ends_with("payload.json"));
        }
        other => panic!("expected ParseError, got {:?}", other),
    }
}

#[test]
fn test_missing_message_slot_fails_load() {
    let dir = TempDir::new().unwrap();
    write_provider(
        dir.path(),
        "broken",
        &json!({"host": "api.example.com"}),
        "POST /chat HTTP/1.1\n",
        &json!({"model": "", "input": []}),
    );

    let err = ProviderRegistry::load(dir.path()).unwrap_err();
    let ConfigError::ValidationError(validation) = err else {
        panic!("expected a validation error");
    };
    assert!(matches!(
        validation.kind,
        ValidationErrorKind::UnresolvedSlot { ref slot, .. } if slot == "messages"
    ));
}

#[test]
fn test_header_env_reference_is_interpolated() {
    std::env::set_var("RELAY_TEST_TENANT", "tenant-42");
    let dir = TempDir::new().unwrap();
    let header = "POST /chat HTTP/1.1\nX-Tenant: ${RELAY_TEST_TENANT}\n";
    write_provider(dir.path(), "tenant", &json!({"host": "api.example.com"}), header, &json!({"model": "", "messages": []}));

    let registry = ProviderRegistry::load(dir.path()).unwrap();
    let config = registry.lookup("tenant").unwrap();
    assert_eq!(config.headers.get("x-tenant").map(|h| h.value.as_str()), Some("tenant-42"));
}

#[test]
fn test_missing_env_reference_fails_load() {
    let dir = TempDir::new().unwrap();
    let header = "POST /chat HTTP/1.1\nX-Key: ${RELAY_TEST_SURELY_UNSET_VAR}\n";
    write_provider(dir.path(), "keyed", &json!({"host": "api.example.com"}), header, &json!({"model": "", "messages": []}));

    let err = ProviderRegistry::load(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::EnvVarNotFound { ref var } if var == "RELAY_TEST_SURELY_UNSET_VAR"));
}

#[test]
fn test_missing_root_fails() {
    let dir = TempDir::new().unwrap();
    let err = ProviderRegistry::load(dir.path().join("nope")).unwrap_err();
    assert!(matches!(err, ConfigError::IoError { .. }));
}

#[test]
fn test_load_gateway_yaml_with_rules() {
    std::env::set_var("RELAY_TEST_PROVIDERS_DIR", "/srv/relay/providers");
    let dir = TempDir::new().unwrap();
    let path = write_root_file(
        &dir,
        "relay.yaml",
        r#"
providers_dir: ${RELAY_TEST_PROVIDERS_DIR}
transport:
  connect_timeout_secs: 5
rules:
  - token: deepseek
    provider: deepseek
    match: prefix
"#,
    );

    let config = load_from_yaml(&path).unwrap();
    assert_eq!(config.providers_dir, PathBuf::from("/srv/relay/providers"));
    assert_eq!(config.transport.connect_timeout_secs, 5);
    assert_eq!(config.transport.request_timeout_secs, 60);
    assert_eq!(config.rules[0].match_kind, MatchKind::Prefix);
}

#[test]
fn test_load_gateway_json_rejects_conflicting_rules() {
    let dir = TempDir::new().unwrap();
    let path = write_root_file(
        &dir,
        "relay.json",
        r#"{
  "providers_dir": "./providers",
  "rules": [
    {"token": "gpt", "provider": "openai", "match": "prefix"},
    {"token": "gpt-4o", "provider": "azure", "match": "prefix"}
  ]
}"#,
    );

    let err = load_from_json(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)));
}

#[test]
fn test_resolver_built_from_loaded_folders() {
    let dir = TempDir::new().unwrap();
    write_provider(dir.path(), "qwen", &qwen_metadata(), QWEN_HEADER, &qwen_payload());

    let registry = ProviderRegistry::load(dir.path()).unwrap();
    let resolver = ProviderResolver::from_registry(&registry, vec![]).unwrap();
    assert_eq!(resolver.match_model("Qwen2.5-72B-Instruct"), Some("qwen"));
    assert_eq!(resolver.match_model("gpt-4o"), None);
}
