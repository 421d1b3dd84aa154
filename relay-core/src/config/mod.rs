//! Provider artifacts and gateway settings
//!
//! Provider artifacts (metadata, header template, payload template) are
//! parsed and validated here, once, at startup. The gateway settings file
//! (provider directory, transport tuning, extra resolver rules) is loaded
//! from YAML or JSON with `${VAR}` interpolation.

mod env;
mod error;
mod header;
mod provider;
mod schema;
mod secrets;
mod template;
mod validator;

pub use env::interpolate_env_vars;
pub use error::{ConfigError, ValidationError, ValidationErrorKind};
pub use header::{HeaderLine, HeaderTemplate, API_KEY_SLOT, AUTHORIZATION_SLOT, HOST_SLOT};
pub use provider::{normalize_name, ProviderConfig};
pub use schema::{
    EndMarker, FieldPointers, GatewayConfig, MatchKind, MessageSchema, ProviderMetadata,
    ResponseFormatKind, ResponseSpec, RuleConfig, SlotPointers, StreamFraming, TimestampPolicy,
    TimestampUnit, TransportConfig,
};
pub use secrets::{is_sensitive_header, redact_header, SecretString};
pub use template::{assign_pointer, PayloadTemplate, ResolvedMessageSchema};
pub use validator::ConfigValidator;

use std::fs;
use std::path::Path;

/// Read a settings file and substitute `${VAR}` references
fn read_interpolated(path: &Path) -> Result<String, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::IoError {
        path: path.display().to_string(),
        source,
    })?;
    env::interpolate_env_vars(&raw)
}

fn checked(config: GatewayConfig) -> Result<GatewayConfig, ConfigError> {
    ConfigValidator::new().validate_rules(&config.rules)?;
    Ok(config)
}

/// Load gateway settings from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<GatewayConfig, ConfigError> {
    let path = path.as_ref();
    let text = read_interpolated(path)?;
    let config = serde_yaml::from_str(&text).map_err(|e| {
        let location = e.location();
        ConfigError::ParseError {
            path: path.display().to_string(),
            line: location.as_ref().map(|l| l.line()),
            column: location.as_ref().map(|l| l.column()),
            message: e.to_string(),
        }
    })?;
    checked(config)
}

/// Load gateway settings from a JSON file
pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<GatewayConfig, ConfigError> {
    let path = path.as_ref();
    let text = read_interpolated(path)?;
    let config = serde_json::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        line: Some(e.line()),
        column: Some(e.column()),
        message: e.to_string(),
    })?;
    checked(config)
}
