//! Configuration validation utilities

use super::error::{ValidationError, ValidationErrorKind};
use super::header::HOST_SLOT;
use super::provider::ProviderConfig;
use super::schema::{MatchKind, ResponseFormatKind, RuleConfig};
use std::collections::HashMap;
use tracing::warn;
use url::Url;

const KNOWN_METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

/// Validator for provider artifacts and resolver rules
#[derive(Debug, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    /// Create a new validator
    pub fn new() -> Self {
        Self
    }

    /// Validate a single provider
    pub fn validate_provider(&self, config: &ProviderConfig) -> Result<(), ValidationError> {
        let field = format!("providers.{}", config.name);

        self.validate_endpoint(config, &field)?;
        self.validate_timestamp(config, &field)?;
        self.validate_response(config, &field)?;
        self.validate_families(config, &field)?;

        Ok(())
    }

    fn validate_endpoint(&self, config: &ProviderConfig, field: &str) -> Result<(), ValidationError> {
        let metadata = &config.metadata;
        if metadata.host.trim().is_empty() {
            return Err(ValidationError::missing(format!("{field}.metadata.host")));
        }

        if metadata.scheme != "http" && metadata.scheme != "https" {
            return Err(ValidationError::unexpected(
                format!("{field}.metadata.scheme"),
                "http or https",
                &metadata.scheme,
            ));
        }

        let base = format!("{}://{}", metadata.scheme, metadata.host);
        let url = Url::parse(&base).map_err(|e| {
            ValidationError::new(
                format!("{field}.metadata.host"),
                ValidationErrorKind::BadEndpoint {
                    message: format!("{base}: {e}"),
                },
            )
        })?;
        if url.path() != "/" || url.query().is_some() {
            return Err(ValidationError::unexpected(
                format!("{field}.metadata.host"),
                "a bare authority",
                &metadata.host,
            ));
        }

        if !KNOWN_METHODS.contains(&config.headers.method.as_str()) {
            return Err(ValidationError::unexpected(
                format!("{field}.header.method"),
                KNOWN_METHODS.join("|"),
                &config.headers.method,
            ));
        }

        // A literal Host header is sent unchanged; flag drift from the metadata
        if let Some(host) = config.headers.get("host") {
            if !host.has_host_slot() && !host.value.eq_ignore_ascii_case(&metadata.host) {
                warn!(
                    provider = %config.name,
                    header_host = %host.value,
                    metadata_host = %metadata.host,
                    "Host header differs from metadata host; connecting to the metadata host"
                );
            }
        }
        if config
            .headers
            .headers
            .iter()
            .any(|h| h.has_host_slot() && !h.name.eq_ignore_ascii_case("host"))
        {
            warn!(provider = %config.name, "{} slot used outside the Host header", HOST_SLOT);
        }

        Ok(())
    }

    fn validate_timestamp(&self, config: &ProviderConfig, field: &str) -> Result<(), ValidationError> {
        if config.metadata.timestamp.gap < 1 {
            return Err(ValidationError::new(
                format!("{field}.metadata.timestamp.gap"),
                ValidationErrorKind::OutOfRange {
                    message: format!("must be at least 1, got {}", config.metadata.timestamp.gap),
                },
            ));
        }
        Ok(())
    }

    fn validate_response(&self, config: &ProviderConfig, field: &str) -> Result<(), ValidationError> {
        let response = &config.metadata.response;
        match (response.format, &response.fields) {
            (ResponseFormatKind::Fields, None) => {
                Err(ValidationError::missing(format!("{field}.metadata.response.fields"))
                    .with_context("format 'fields' needs content pointers"))
            }
            (ResponseFormatKind::Fields, Some(fields)) => {
                let mut pointers = vec![("content", fields.content.as_str())];
                pointers.extend(fields.role.as_deref().map(|p| ("role", p)));
                pointers.extend(fields.finish_reason.as_deref().map(|p| ("finish_reason", p)));
                pointers.extend(fields.usage.as_deref().map(|p| ("usage", p)));
                pointers.extend(fields.end_marker.as_ref().map(|m| ("end_marker", m.pointer.as_str())));

                for (name, pointer) in pointers {
                    if !pointer.is_empty() && !pointer.starts_with('/') {
                        return Err(ValidationError::malformed(
                            format!("{field}.metadata.response.fields.{name}"),
                            format!("'{pointer}' is not a JSON pointer"),
                        ));
                    }
                }
                Ok(())
            }
            (ResponseFormatKind::Openai, Some(_)) => {
                warn!(provider = %config.name, "response.fields ignored for format 'openai'");
                Ok(())
            }
            (ResponseFormatKind::Openai, None) => Ok(()),
        }
    }

    fn validate_families(&self, config: &ProviderConfig, field: &str) -> Result<(), ValidationError> {
        for (i, token) in config.metadata.model_families.iter().enumerate() {
            if token.trim().is_empty() {
                return Err(ValidationError::missing(format!(
                    "{field}.metadata.model_families[{i}]"
                )));
            }
        }
        Ok(())
    }

    /// Validate that resolver rules cannot both match one model name.
    ///
    /// Rules pointing at the same provider may overlap freely.
    pub fn validate_rules(&self, rules: &[RuleConfig]) -> Result<(), ValidationError> {
        let mut seen: HashMap<String, &RuleConfig> = HashMap::new();

        for (i, rule) in rules.iter().enumerate() {
            let token = rule.token.trim().to_lowercase();
            if token.is_empty() {
                return Err(ValidationError::missing(format!("rules[{i}].token")));
            }

            if let Some(existing) = seen.get(&token) {
                if existing.provider != rule.provider {
                    return Err(ValidationError::new(
                        format!("rules[{i}].token"),
                        ValidationErrorKind::Duplicate { value: token },
                    )
                    .with_context(format!(
                        "claimed by both '{}' and '{}'",
                        existing.provider, rule.provider
                    )));
                }
                continue;
            }

            for (other_token, other) in &seen {
                if other.provider == rule.provider {
                    continue;
                }
                if tokens_overlap(&token, rule.match_kind, other_token, other.match_kind) {
                    return Err(ValidationError::new(
                        format!("rules[{i}].token"),
                        ValidationErrorKind::OverlappingRule {
                            first: other_token.clone(),
                            second: token.clone(),
                        },
                    ));
                }
            }

            seen.insert(token, rule);
        }

        Ok(())
    }
}

/// Whether one token shadows the other. Names holding two unrelated tokens
/// still resolve by rule order.
fn tokens_overlap(a: &str, a_kind: MatchKind, b: &str, b_kind: MatchKind) -> bool {
    match (a_kind, b_kind) {
        (MatchKind::Prefix, MatchKind::Prefix) => a.starts_with(b) || b.starts_with(a),
        _ => a.contains(b) || b.contains(a),
    }
}
