use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use tally_core::MeteringError;

/// Errors that can occur when running the Tally server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A metering decision surfaced through the API.
    #[error(transparent)]
    Metering(#[from] MeteringError),

    /// Authentication failed (missing or invalid credentials).
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl ServerError {
    /// HTTP status a response for this error carries.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Metering(e) => metering_status(e),
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Config(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn metering_status(error: &MeteringError) -> StatusCode {
    match error {
        MeteringError::CapacityExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        MeteringError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
        MeteringError::NotFound(_) => StatusCode::NOT_FOUND,
        MeteringError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        MeteringError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Metering(MeteringError::CapacityExceeded {
                resource,
                requested_mb,
                remaining_mb,
            }) => json!({
                "error": self.to_string(),
                "code": "capacity_exceeded",
                "retryable": false,
                "resource": resource,
                "requested_mb": requested_mb,
                "remaining_mb": remaining_mb,
            }),
            Self::Metering(e @ MeteringError::Unexpected(_)) => {
                tracing::error!(error = %e, "request failed unexpectedly");
                json!({ "error": "internal error", "code": e.code(), "retryable": false })
            }
            Self::Metering(e) => json!({
                "error": e.to_string(),
                "code": e.code(),
                "retryable": e.is_transient(),
            }),
            Self::Unauthorized(msg) => {
                json!({ "error": msg, "code": "unauthorized", "retryable": false })
            }
            Self::Config(_) | Self::Io(_) => {
                tracing::error!(error = %self, "server error");
                json!({ "error": "internal error", "code": "unexpected", "retryable": false })
            }
        };
        (status, axum::Json(body)).into_response()
    }
}
