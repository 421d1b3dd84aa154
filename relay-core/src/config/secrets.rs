//! Secret handling and header redaction
//!
//! Forwarded credentials travel as [`SecretString`] so they never show up in
//! `Debug`/`Display` output, and header dumps go through [`redact_header`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller credential, redacted in every rendering
#[derive(Clone, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SecretString {
    value: String,
}

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// The raw value, for filling header slots only
    pub fn expose_secret(&self) -> &str {
        &self.value
    }

    /// Blank credentials count as absent
    pub fn is_empty(&self) -> bool {
        self.value.trim().is_empty()
    }

    /// The bare credential, with any `Bearer ` scheme prefix removed
    pub fn bare_token(&self) -> &str {
        let trimmed = self.value.trim();
        match trimmed.get(..7) {
            Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => trimmed[7..].trim_start(),
            _ => trimmed,
        }
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Header name fragments that mark a credential
const SENSITIVE_FRAGMENTS: [&str; 8] = [
    "authorization",
    "cookie",
    "api-key",
    "api_key",
    "apikey",
    "token",
    "secret",
    "credential",
];

/// Whether a header carries credentials
pub fn is_sensitive_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    SENSITIVE_FRAGMENTS.iter().any(|fragment| name.contains(fragment))
}

/// Redact a header value when its name looks sensitive
pub fn redact_header(name: &str, value: &str) -> String {
    if is_sensitive_header(name) {
        "[REDACTED]".to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_string_redaction() {
        let secret = SecretString::new("Bearer sk-1234567890abcdef");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(secret.bare_token(), "sk-1234567890abcdef");
    }

    #[test]
    fn test_bare_token_strips_scheme() {
        assert_eq!(SecretString::new("Bearer abc").bare_token(), "abc");
        assert_eq!(SecretString::new("bearer   abc").bare_token(), "abc");
        assert_eq!(SecretString::new("abc").bare_token(), "abc");
        assert!(SecretString::new("  ").is_empty());
    }

    #[test]
    fn test_redact_header() {
        assert_eq!(redact_header("Authorization", "Bearer x"), "[REDACTED]");
        assert_eq!(redact_header("Cookie", "sid=1"), "[REDACTED]");
        assert_eq!(redact_header("X-Api-Key", "k"), "[REDACTED]");
        assert_eq!(redact_header("Content-Type", "application/json"), "application/json");
    }
}
