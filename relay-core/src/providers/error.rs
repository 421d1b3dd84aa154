//! Request-time error types and handling

use crate::protocol::{ErrorBody, ErrorEnvelope};
use thiserror::Error;

/// Result type for request-time operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors raised while serving one request. All of them are recoverable:
/// the caller gets an OpenAI-shaped error, the process keeps running.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// No provider could be resolved
    #[error("{message}")]
    ProviderNotFound { message: String },

    /// The inbound request is unusable
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// The provider answered with something that could not be reshaped
    #[error("Failed to parse provider response: {message}")]
    ProviderResponse { message: String },

    /// Connection failure or non-success upstream status
    #[error("Upstream error: {message}")]
    Upstream { status: Option<u16>, message: String },

    /// The request was cancelled before it finished
    #[error("Request cancelled")]
    Cancelled,
}

impl GatewayError {
    /// Explicit provider that is not loaded
    pub fn unknown_provider(name: &str) -> Self {
        Self::ProviderNotFound {
            message: format!("Provider \"{name}\" not found"),
        }
    }

    /// Model name that no rule matches
    pub fn unresolved_model(model: &str) -> Self {
        Self::ProviderNotFound {
            message: format!("No provider matches model \"{model}\""),
        }
    }

    /// Shorthand for a provider response mismatch
    pub fn response(message: impl Into<String>) -> Self {
        Self::ProviderResponse {
            message: message.into(),
        }
    }

    /// Shorthand for a transport failure without status
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            status: None,
            message: message.into(),
        }
    }

    /// OpenAI error `code`
    pub fn code(&self) -> &'static str {
        match self {
            Self::ProviderNotFound { .. } => "provider_not_found",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::ProviderResponse { .. } => "provider_response_error",
            Self::Upstream { .. } => "upstream_error",
            Self::Cancelled => "request_cancelled",
        }
    }

    /// OpenAI error `type`
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::ProviderNotFound { .. } | Self::InvalidRequest { .. } => "invalid_request_error",
            Self::ProviderResponse { .. } | Self::Upstream { .. } | Self::Cancelled => {
                "server_error"
            }
        }
    }

    /// HTTP status the façade should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ProviderNotFound { .. } | Self::InvalidRequest { .. } => 400,
            Self::ProviderResponse { .. } => 502,
            Self::Upstream {
                status: Some(status),
                ..
            } if (400..=599).contains(status) => *status,
            Self::Upstream { .. } => 502,
            Self::Cancelled => 499,
        }
    }

    /// Render as the OpenAI error envelope
    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorBody {
                message: self.to_string(),
                error_type: self.error_type().to_string(),
                code: self.code().to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Upstream {
                status: Some(504),
                message: format!("Upstream timed out: {}", err),
            }
        } else if err.is_connect() {
            GatewayError::upstream(format!("Connection failed: {}", err))
        } else if err.is_decode() || err.is_body() {
            GatewayError::upstream(format!("Failed to read upstream body: {}", err))
        } else {
            GatewayError::Upstream {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::response(err.to_string())
    }
}
