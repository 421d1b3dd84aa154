//! Provider registry
//!
//! Loaded once at startup, never mutated afterwards, and shared behind an
//! `Arc` by every request.

use crate::config::{
    normalize_name, ConfigError, ConfigValidator, ProviderConfig, RuleConfig, ValidationError,
    ValidationErrorKind,
};
use crate::providers::error::{GatewayError, GatewayResult};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Read-only map of provider name to configuration
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<ProviderConfig>>,
}

impl ProviderRegistry {
    /// Load every provider folder under `root`.
    ///
    /// Hidden entries and plain files are skipped. Any provider folder with
    /// a missing or malformed artifact fails the whole load.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let root = root.as_ref();
        let entries = fs::read_dir(root).map_err(|e| ConfigError::IoError {
            path: root.to_string_lossy().to_string(),
            source: e,
        })?;

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ConfigError::IoError {
                path: root.to_string_lossy().to_string(),
                source: e,
            })?;
            let path = entry.path();
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if path.is_dir() && !hidden {
                dirs.push(path);
            }
        }
        dirs.sort();

        let mut configs = Vec::with_capacity(dirs.len());
        for dir in dirs {
            configs.push(ProviderConfig::load_dir(&dir)?);
        }

        let registry = Self::from_configs(configs)?;
        info!(
            root = %root.display(),
            providers = ?registry.names(),
            "Provider registry loaded"
        );
        Ok(registry)
    }

    /// Build a registry from already-built configurations
    pub fn from_configs(configs: impl IntoIterator<Item = ProviderConfig>) -> Result<Self, ConfigError> {
        let mut providers = BTreeMap::new();

        for config in configs {
            let name = config.name.clone();
            info!(provider = %name, host = %config.metadata.host, "Registering provider");
            if providers.insert(name.clone(), Arc::new(config)).is_some() {
                return Err(ValidationError::new(
                    "providers",
                    ValidationErrorKind::Duplicate { value: name },
                )
                .into());
            }
        }

        let registry = Self { providers };
        ConfigValidator::new().validate_rules(&registry.family_rules())?;
        Ok(registry)
    }

    /// Look up a provider by name. The name is normalized first.
    pub fn lookup(&self, name: &str) -> GatewayResult<Arc<ProviderConfig>> {
        let key = normalize_name(name);
        self.providers
            .get(&key)
            .cloned()
            .ok_or_else(|| GatewayError::unknown_provider(&key))
    }

    /// Whether a provider with this name is loaded
    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(&normalize_name(name))
    }

    /// Names of all loaded providers, sorted
    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    /// Number of loaded providers
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether no provider is loaded
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Human-reference response sample of a provider
    pub fn response_example(&self, name: &str) -> Option<&str> {
        self.providers
            .get(&normalize_name(name))
            .and_then(|c| c.response_example.as_deref())
    }

    /// Resolver rules declared through `model_families`, in provider name order
    pub fn family_rules(&self) -> Vec<RuleConfig> {
        self.providers
            .values()
            .flat_map(|config| {
                config.metadata.model_families.iter().map(|token| RuleConfig {
                    token: token.trim().to_lowercase(),
                    provider: config.name.clone(),
                    match_kind: Default::default(),
                })
            })
            .collect()
    }
}
