//! Header template parsing (`header.txt`)
//!
//! The first line carries the request line (`POST /path?query HTTP/1.1`),
//! every later `Name: Value` line is kept in file order. Values may hold the
//! `{{host}}`, `{{authorization}}` and `{{api_key}}` slots.

use super::env::{has_env_refs, interpolate_env_vars};
use super::error::{ConfigError, ValidationError};
use regex::Regex;
use std::sync::OnceLock;

/// Slot replaced with the provider host
pub const HOST_SLOT: &str = "{{host}}";

/// Slot replaced with the caller's `Authorization` value, verbatim
pub const AUTHORIZATION_SLOT: &str = "{{authorization}}";

/// Slot replaced with the caller's credential without its `Bearer ` prefix
pub const API_KEY_SLOT: &str = "{{api_key}}";

fn request_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z]+)\s+(\S+)\s+HTTP/\S+$").expect("request line pattern is a valid regex")
    })
}

/// One `Name: Value` line of the template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLine {
    pub name: String,
    pub value: String,
}

impl HeaderLine {
    /// Whether the value needs the caller's credential
    pub fn has_auth_slot(&self) -> bool {
        self.value.contains(AUTHORIZATION_SLOT) || self.value.contains(API_KEY_SLOT)
    }

    /// Whether the value needs the provider host
    pub fn has_host_slot(&self) -> bool {
        self.value.contains(HOST_SLOT)
    }
}

/// Parsed header template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderTemplate {
    /// HTTP method, upper-cased
    pub method: String,
    /// Endpoint path without the query string
    pub path: String,
    /// Raw query string, if the request line had one
    pub query: Option<String>,
    /// Header lines in file order
    pub headers: Vec<HeaderLine>,
}

impl HeaderTemplate {
    /// Parse a header template, interpolating `${VAR}` references in values.
    ///
    /// `origin` names the file for error messages.
    pub fn parse(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

        let request_line = lines
            .next()
            .ok_or_else(|| ValidationError::missing(format!("{origin}: request line")))?;

        let caps = request_line_pattern().captures(request_line).ok_or_else(|| {
            ValidationError::malformed(
                format!("{origin}: request line"),
                format!("expected 'METHOD /path HTTP/x', got '{request_line}'"),
            )
        })?;

        let method = caps[1].to_ascii_uppercase();
        let target = &caps[2];
        if !target.starts_with('/') {
            return Err(ValidationError::unexpected(
                format!("{origin}: request line"),
                "an absolute path",
                target,
            )
            .into());
        }

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target.to_string(), None),
        };

        let mut headers = Vec::new();
        for line in lines {
            // HTTP/2 pseudo-headers from browser dumps
            if line.starts_with(':') {
                continue;
            }

            let Some((name, value)) = line.split_once(':') else {
                continue;
            };

            let name = name.trim();
            if name.is_empty() {
                continue;
            }

            let value = value.trim();
            let value = if has_env_refs(value) {
                interpolate_env_vars(value)?
            } else {
                value.to_string()
            };

            headers.push(HeaderLine {
                name: name.to_string(),
                value,
            });
        }

        Ok(Self {
            method,
            path,
            query,
            headers,
        })
    }

    /// First header with the given name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&HeaderLine> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
    }

    /// Whether any header declares a credential slot
    pub fn declares_auth_slot(&self) -> bool {
        self.headers.iter().any(HeaderLine::has_auth_slot)
    }

    /// Path plus query string, as it appeared on the request line
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }
}
