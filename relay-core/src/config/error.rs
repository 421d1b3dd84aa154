//! Load-time error types
//!
//! Every failure names the file or field it came from, so an operator can fix
//! a provider folder without reading code.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Load-time error. Any of these keeps the process from serving traffic.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{path}' is malformed at {}:{}: {message}",
            .line.unwrap_or(0), .column.unwrap_or(0))]
    ParseError {
        path: String,
        line: Option<usize>,
        column: Option<usize>,
        message: String,
    },

    #[error("provider '{provider}' has no {artifact} in {}", .dir.display())]
    MissingArtifact {
        provider: String,
        artifact: &'static str,
        dir: PathBuf,
    },

    #[error(transparent)]
    ValidationError(#[from] ValidationError),

    #[error("environment variable '{var}' is not set")]
    EnvVarNotFound { var: String },

    #[error("invalid gateway settings: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    /// OpenAI-style error code shared by every load-time failure
    pub fn code(&self) -> &'static str {
        "provider_config_error"
    }
}

/// A provider or settings value that parsed but makes no sense
#[derive(Debug, Error)]
pub struct ValidationError {
    /// Where the value lives, e.g. `providers.qwen.payload./messages`
    pub field_path: String,
    pub kind: ValidationErrorKind,
    pub context: Option<String>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field_path, self.kind)?;
        match &self.context {
            Some(context) => write!(f, " ({context})"),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ValidationErrorKind {
    #[error("missing")]
    Missing,

    #[error("expected {expected}, found '{found}'")]
    Unexpected { expected: String, found: String },

    #[error("{message}")]
    OutOfRange { message: String },

    #[error("{message}")]
    Malformed { message: String },

    #[error("'{value}' is declared twice")]
    Duplicate { value: String },

    /// A payload slot pointer that names nothing in the template
    #[error("{slot} slot {pointer} does not resolve in the payload template")]
    UnresolvedSlot { slot: String, pointer: String },

    /// Two resolver tokens that could both claim one model name
    #[error("model tokens '{first}' and '{second}' overlap")]
    OverlappingRule { first: String, second: String },

    #[error("not a usable endpoint: {message}")]
    BadEndpoint { message: String },
}

impl ValidationError {
    pub fn new(field_path: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            field_path: field_path.into(),
            kind,
            context: None,
        }
    }

    /// Attach a hint for the operator
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn missing(field_path: impl Into<String>) -> Self {
        Self::new(field_path, ValidationErrorKind::Missing)
    }

    pub fn unexpected(
        field_path: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        let kind = ValidationErrorKind::Unexpected {
            expected: expected.into(),
            found: found.into(),
        };
        Self::new(field_path, kind)
    }

    pub fn malformed(field_path: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(field_path, ValidationErrorKind::Malformed { message })
    }

    /// Slot `slot` points at `pointer`, which the template does not contain
    pub fn unresolved_slot(
        field_path: impl Into<String>,
        slot: impl Into<String>,
        pointer: impl Into<String>,
    ) -> Self {
        let kind = ValidationErrorKind::UnresolvedSlot {
            slot: slot.into(),
            pointer: pointer.into(),
        };
        Self::new(field_path, kind)
    }
}
