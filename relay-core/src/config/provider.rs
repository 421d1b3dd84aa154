//! Provider artifacts and the folder loader
//!
//! Each provider lives in its own folder:
//!
//! ```text
//! providers/
//!   qwen/
//!     metadata.json        (or metadata.yaml)
//!     header.txt
//!     payload.json
//!     response_example.md  (optional, human reference only)
//! ```

use super::error::{ConfigError, ValidationError};
use super::header::HeaderTemplate;
use super::schema::ProviderMetadata;
use super::template::PayloadTemplate;
use super::validator::ConfigValidator;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::debug;

pub const METADATA_JSON: &str = "metadata.json";
pub const METADATA_YAML: &str = "metadata.yaml";
pub const HEADER_FILE: &str = "header.txt";
pub const PAYLOAD_FILE: &str = "payload.json";
pub const RESPONSE_EXAMPLE_FILE: &str = "response_example.md";

/// Everything known about one provider. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    /// Normalized provider name
    pub name: String,
    pub metadata: ProviderMetadata,
    pub headers: HeaderTemplate,
    pub payload: PayloadTemplate,
    /// Free-form response sample, never parsed
    pub response_example: Option<String>,
}

impl ProviderConfig {
    /// Assemble and validate a provider from already-parsed artifacts
    pub fn from_parts(
        name: &str,
        metadata: ProviderMetadata,
        headers: HeaderTemplate,
        payload: Value,
        response_example: Option<String>,
    ) -> Result<Self, ConfigError> {
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(ValidationError::missing("providers.<name>").into());
        }

        let payload = PayloadTemplate::new(payload, &metadata, &format!("providers.{name}.payload"))?;

        let config = Self {
            name,
            metadata,
            headers,
            payload,
            response_example,
        };
        ConfigValidator::new().validate_provider(&config)?;
        Ok(config)
    }

    /// Load a provider from its folder. The folder name is the provider name.
    pub fn load_dir(dir: &Path) -> Result<Self, ConfigError> {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .map(normalize_name)
            .ok_or_else(|| ConfigError::Invalid {
                message: format!("provider folder {} has no usable name", dir.display()),
            })?;

        let metadata = load_metadata(dir, &name)?;

        let header_path = require(dir, &name, HEADER_FILE)?;
        let header_text = read(&header_path)?;
        let headers = HeaderTemplate::parse(&header_text, &header_path.to_string_lossy())?;

        let payload_path = require(dir, &name, PAYLOAD_FILE)?;
        let payload_text = read(&payload_path)?;
        let payload: Value =
            serde_json::from_str(&payload_text).map_err(|e| ConfigError::ParseError {
                path: payload_path.to_string_lossy().to_string(),
                line: Some(e.line()),
                column: Some(e.column()),
                message: e.to_string(),
            })?;

        let example_path = dir.join(RESPONSE_EXAMPLE_FILE);
        let response_example = if example_path.is_file() {
            Some(read(&example_path)?)
        } else {
            None
        };

        debug!(provider = %name, dir = %dir.display(), "Loaded provider artifacts");
        Self::from_parts(&name, metadata, headers, payload, response_example)
    }

    /// Whether the upstream call streams for a caller that asked for `caller_stream`
    pub fn upstream_streams(&self, caller_stream: bool) -> bool {
        match self.metadata.stream {
            Some(forced) => forced,
            None => self.payload.stream_pointer().is_some() && caller_stream,
        }
    }
}

/// Normalize a provider name: trimmed and lower-cased
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

fn load_metadata(dir: &Path, name: &str) -> Result<ProviderMetadata, ConfigError> {
    let json_path = dir.join(METADATA_JSON);
    if json_path.is_file() {
        let content = read(&json_path)?;
        return serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: json_path.to_string_lossy().to_string(),
            line: Some(e.line()),
            column: Some(e.column()),
            message: e.to_string(),
        });
    }

    let yaml_path = dir.join(METADATA_YAML);
    if yaml_path.is_file() {
        let content = read(&yaml_path)?;
        return serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: yaml_path.to_string_lossy().to_string(),
            line: e.location().map(|l| l.line()),
            column: e.location().map(|l| l.column()),
            message: e.to_string(),
        });
    }

    Err(ConfigError::MissingArtifact {
        provider: name.to_string(),
        artifact: METADATA_JSON,
        dir: dir.to_path_buf(),
    })
}

fn require(dir: &Path, name: &str, artifact: &'static str) -> Result<std::path::PathBuf, ConfigError> {
    let path = dir.join(artifact);
    if path.is_file() {
        Ok(path)
    } else {
        Err(ConfigError::MissingArtifact {
            provider: name.to_string(),
            artifact,
            dir: dir.to_path_buf(),
        })
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_string_lossy().to_string(),
        source: e,
    })
}
