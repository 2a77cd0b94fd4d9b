//! Error types for the Tally client.

use serde::Deserialize;
use thiserror::Error;

use tally_core::{MeteringError, Resource};

/// Errors that can occur when using the Tally client.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection error (network failure, DNS resolution, timeout, etc.).
    #[error("connection error: {0}")]
    Connection(String),

    /// Non-2xx response without a structured body.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Structured error returned by the server.
    #[error("API error [{}]: {}", .body.code, .body.error)]
    Api { status: u16, body: ErrorBody },

    /// Response deserialization error.
    #[error("failed to deserialize response: {0}")]
    Deserialization(String),

    /// Client configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// JSON error body produced by the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    #[serde(default)]
    pub retryable: bool,
    #[serde(default)]
    pub resource: Option<Resource>,
    #[serde(default)]
    pub requested_mb: Option<f64>,
    #[serde(default)]
    pub remaining_mb: Option<f64>,
}

impl Error {
    /// Returns `true` if this error is retryable.
    ///
    /// Connection errors, HTTP 5xx and API errors marked retryable qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Http { status, .. } => *status >= 500,
            Self::Api { body, .. } => body.retryable,
            Self::Deserialization(_) | Self::Configuration(_) => false,
        }
    }

    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns the API error code if this is an API error.
    pub fn api_code(&self) -> Option<&str> {
        match self {
            Self::Api { body, .. } => Some(&body.code),
            _ => None,
        }
    }
}

/// Anything the client cannot positively classify becomes
/// `UpstreamUnavailable`, which callers treat as a denial.
impl From<Error> for MeteringError {
    fn from(err: Error) -> Self {
        match err {
            Error::Api { body, .. } => match body.code.as_str() {
                "capacity_exceeded" => Self::capacity(
                    body.resource.unwrap_or(Resource::Bandwidth),
                    body.requested_mb.unwrap_or_default(),
                    body.remaining_mb.unwrap_or_default(),
                ),
                "validation_failed" => Self::ValidationFailed(body.error),
                "not_found" => Self::NotFound(body.error),
                _ => Self::UpstreamUnavailable(format!("metering service: {}", body.error)),
            },
            Error::Configuration(msg) => Self::Unexpected(msg),
            other => Self::UpstreamUnavailable(other.to_string()),
        }
    }
}
