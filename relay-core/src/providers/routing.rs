//! Provider resolution
//!
//! Maps an inbound request onto exactly one loaded provider. Precedence:
//!
//! 1. an explicit, non-empty `provider` field, normalized and looked up as-is;
//! 2. the first model rule whose token matches the lower-cased model name;
//! 3. otherwise `provider_not_found`, naming the model.
//!
//! Rules are built once and validated to be mutually exclusive, so rule order
//! only matters for model names that carry two unrelated tokens.

use crate::config::{
    normalize_name, ConfigError, ConfigValidator, MatchKind, ProviderConfig, RuleConfig,
    ValidationError,
};
use crate::protocol::ChatRequest;
use crate::providers::error::{GatewayError, GatewayResult};
use crate::providers::registry::ProviderRegistry;
use std::sync::Arc;
use tracing::debug;

/// One model-name rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRule {
    token: String,
    provider: String,
    match_kind: MatchKind,
}

impl ResolutionRule {
    /// Rule matching model names that contain `token`
    pub fn contains(token: &str, provider: &str) -> Self {
        Self::new(token, provider, MatchKind::Contains)
    }

    /// Rule matching model names that start with `token`
    pub fn prefix(token: &str, provider: &str) -> Self {
        Self::new(token, provider, MatchKind::Prefix)
    }

    fn new(token: &str, provider: &str, match_kind: MatchKind) -> Self {
        Self {
            token: token.trim().to_lowercase(),
            provider: normalize_name(provider),
            match_kind,
        }
    }

    /// Whether this rule claims the (already lower-cased) model name
    pub fn matches(&self, model: &str) -> bool {
        match self.match_kind {
            MatchKind::Contains => model.contains(&self.token),
            MatchKind::Prefix => model.starts_with(&self.token),
        }
    }

    /// Provider this rule routes to
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Token the rule looks for
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl From<&RuleConfig> for ResolutionRule {
    fn from(rule: &RuleConfig) -> Self {
        Self::new(&rule.token, &rule.provider, rule.match_kind)
    }
}

/// Output of resolution, alive for one request
#[derive(Debug, Clone)]
pub struct ResolvedProvider {
    pub name: String,
    pub config: Arc<ProviderConfig>,
}

/// Ordered, validated rule table
#[derive(Debug, Clone, Default)]
pub struct ProviderResolver {
    rules: Vec<ResolutionRule>,
}

impl ProviderResolver {
    /// Build a resolver from explicit rules, checking they cannot overlap
    pub fn new(rules: Vec<RuleConfig>) -> Result<Self, ValidationError> {
        ConfigValidator::new().validate_rules(&rules)?;
        Ok(Self {
            rules: rules.iter().map(ResolutionRule::from).collect(),
        })
    }

    /// Build a resolver for `registry`.
    ///
    /// `extra` rules (from the gateway settings file) come first, followed by
    /// the rules each provider declares through `model_families`. Every rule
    /// must point at a loaded provider.
    pub fn from_registry(
        registry: &ProviderRegistry,
        extra: Vec<RuleConfig>,
    ) -> Result<Self, ConfigError> {
        let mut rules = extra;
        rules.extend(registry.family_rules());

        for (i, rule) in rules.iter().enumerate() {
            if !registry.contains(&rule.provider) {
                return Err(ValidationError::unexpected(
                    format!("rules[{i}].provider"),
                    "a loaded provider",
                    &rule.provider,
                )
                .into());
            }
        }

        Ok(Self::new(rules)?)
    }

    /// The rule table, in evaluation order
    pub fn rules(&self) -> &[ResolutionRule] {
        &self.rules
    }

    /// Name of the provider the rule table assigns to `model`, if any
    pub fn match_model(&self, model: &str) -> Option<&str> {
        let model = model.trim().to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&model))
            .map(ResolutionRule::provider)
    }

    /// Resolve `request` against `registry`.
    ///
    /// An explicit provider that is not loaded fails immediately; the model
    /// rules are not consulted as a fallback.
    pub fn resolve(
        &self,
        registry: &ProviderRegistry,
        request: &ChatRequest,
    ) -> GatewayResult<ResolvedProvider> {
        if let Some(explicit) = request
            .provider
            .as_deref()
            .map(normalize_name)
            .filter(|name| !name.is_empty())
        {
            let config = registry.lookup(&explicit)?;
            debug!(provider = %explicit, model = %request.model, "Resolved explicit provider");
            return Ok(ResolvedProvider {
                name: explicit,
                config,
            });
        }

        let name = self
            .match_model(&request.model)
            .ok_or_else(|| GatewayError::unresolved_model(&request.model))?;
        let config = registry.lookup(name)?;
        debug!(provider = %name, model = %request.model, "Resolved provider from model rule");

        Ok(ResolvedProvider {
            name: name.to_string(),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HeaderTemplate, ProviderMetadata};
    use crate::protocol::Message;
    use serde_json::json;
    use test_case::test_case;

    fn provider(name: &str, families: &[&str]) -> ProviderConfig {
        let metadata: ProviderMetadata = serde_json::from_value(json!({
            "host": format!("{name}.example.com"),
            "model_families": families,
        }))
        .unwrap();
        let headers = HeaderTemplate::parse("POST /chat HTTP/1.1\n", "header.txt").unwrap();
        ProviderConfig::from_parts(name, metadata, headers, json!({"model": "", "messages": []}), None)
            .unwrap()
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::from_configs(vec![
            provider("qwen", &["qwen", "qwq"]),
            provider("zhipu", &["glm"]),
            provider("deepseek", &[]),
        ])
        .unwrap()
    }

    fn request(model: &str, provider: Option<&str>) -> ChatRequest {
        let request = ChatRequest::new(model, vec![Message::user("hi")]);
        match provider {
            Some(p) => request.with_provider(p),
            None => request,
        }
    }

    #[test_case("qwen-7b", "qwen" ; "family token")]
    #[test_case("QwQ-32B-Preview", "qwen" ; "second token, mixed case")]
    #[test_case("glm-4-plus", "zhipu" ; "other provider")]
    #[test_case("chat-glm", "zhipu" ; "token in the middle")]
    fn test_resolve_by_model(model: &str, expected: &str) {
        let registry = registry();
        let resolver = ProviderResolver::from_registry(&registry, vec![]).unwrap();

        let resolved = resolver.resolve(&registry, &request(model, None)).unwrap();
        assert_eq!(resolved.name, expected);
        assert_eq!(resolved.config.name, expected);
    }

    #[test_case(Some("  DeepSeek ") ; "explicit provider wins over model")]
    #[test_case(Some("deepseek") ; "explicit provider already normalized")]
    fn test_explicit_provider(provider: Option<&str>) {
        let registry = registry();
        let resolver = ProviderResolver::from_registry(&registry, vec![]).unwrap();

        let resolved = resolver.resolve(&registry, &request("qwen-7b", provider)).unwrap();
        assert_eq!(resolved.name, "deepseek");
    }

    #[test]
    fn test_empty_provider_falls_back_to_model() {
        let registry = registry();
        let resolver = ProviderResolver::from_registry(&registry, vec![]).unwrap();

        let resolved = resolver.resolve(&registry, &request("glm-4", Some("  "))).unwrap();
        assert_eq!(resolved.name, "zhipu");
    }

    #[test]
    fn test_unknown_explicit_provider_does_not_fall_back() {
        let registry = registry();
        let resolver = ProviderResolver::from_registry(&registry, vec![]).unwrap();

        let err = resolver
            .resolve(&registry, &request("qwen-7b", Some("claude")))
            .unwrap_err();
        assert_eq!(err.code(), "provider_not_found");
        assert!(err.to_string().contains("claude"));
    }

    #[test]
    fn test_unmatched_model_names_the_model() {
        let registry = registry();
        let resolver = ProviderResolver::from_registry(&registry, vec![]).unwrap();

        let err = resolver
            .resolve(&registry, &request("mystery-13b", None))
            .unwrap_err();
        assert_eq!(err.code(), "provider_not_found");
        assert!(err.to_string().contains("mystery-13b"));
    }

    #[test]
    fn test_extra_rules_come_first() {
        let registry = registry();
        let extra = vec![RuleConfig {
            token: "deepseek".to_string(),
            provider: "deepseek".to_string(),
            match_kind: MatchKind::Prefix,
        }];
        let resolver = ProviderResolver::from_registry(&registry, extra).unwrap();

        assert_eq!(resolver.rules()[0].token(), "deepseek");
        assert_eq!(resolver.match_model("deepseek-chat"), Some("deepseek"));
    }

    #[test]
    fn test_rule_for_unloaded_provider_fails() {
        let registry = registry();
        let extra = vec![RuleConfig {
            token: "llama".to_string(),
            provider: "meta".to_string(),
            match_kind: MatchKind::Contains,
        }];
        let err = ProviderResolver::from_registry(&registry, extra).unwrap_err();
        assert_eq!(err.code(), "provider_config_error");
    }

    #[test]
    fn test_prefix_rule_requires_leading_token() {
        let rule = ResolutionRule::prefix("GLM", "zhipu");
        assert!(rule.matches("glm-4"));
        assert!(!rule.matches("chat-glm"));
        assert!(ResolutionRule::contains("glm", "zhipu").matches("chat-glm"));
    }
}
