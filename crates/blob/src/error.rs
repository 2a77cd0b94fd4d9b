use tally_core::MeteringError;
use thiserror::Error;

/// Errors that can occur during blob storage operations.
#[derive(Debug, Error)]
pub enum BlobError {
    /// The requested blob was not found.
    #[error("blob not found: {0}")]
    NotFound(String),

    /// The blob identifier is not a safe relative locator.
    #[error("invalid blob id: {0}")]
    InvalidId(String),

    /// A storage backend error occurred.
    #[error("blob storage error: {0}")]
    Storage(String),
}

impl From<BlobError> for MeteringError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound(id) => Self::NotFound(format!("blob '{id}' missing in storage")),
            BlobError::InvalidId(_) => Self::ValidationFailed(err.to_string()),
            BlobError::Storage(_) => Self::UpstreamUnavailable(err.to_string()),
        }
    }
}
