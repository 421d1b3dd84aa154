//! `${VAR}` substitution in settings files and header templates

use super::error::ConfigError;
use regex::Regex;
use std::env;
use std::sync::OnceLock;

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env var pattern is a valid regex")
    })
}

/// Whether the text references any `${VAR}`
pub fn has_env_refs(content: &str) -> bool {
    env_var_pattern().is_match(content)
}

/// Interpolate `${VAR}` references in a configuration string.
///
/// The first variable that is not set is reported as an error.
pub fn interpolate_env_vars(content: &str) -> Result<String, ConfigError> {
    let mut missing = None;

    let result = env_var_pattern().replace_all(content, |caps: &regex::Captures<'_>| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                if missing.is_none() {
                    missing = Some(var_name.to_string());
                }
                String::new()
            }
        }
    });

    if let Some(var) = missing {
        return Err(ConfigError::EnvVarNotFound { var });
    }

    Ok(result.into_owned())
}
