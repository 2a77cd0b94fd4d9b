use tally_core::MeteringError;
use thiserror::Error;

/// Errors from state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("CAS conflict: expected version {expected}, found {found}")]
    CasConflict { expected: u64, found: u64 },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<StateError> for MeteringError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::Connection(_) | StateError::Backend(_) | StateError::Timeout(_) => {
                Self::UpstreamUnavailable(err.to_string())
            }
            StateError::NotFound(msg) => Self::NotFound(msg),
            StateError::CasConflict { .. } | StateError::Serialization(_) => {
                Self::Unexpected(err.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
