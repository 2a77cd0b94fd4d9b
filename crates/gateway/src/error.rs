use thiserror::Error;

use tally_core::MeteringError;

/// Errors raised while wiring a [`Meter`](crate::Meter).
#[derive(Debug, Error)]
pub enum BuildError {
    /// A required component was not supplied.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The supplied limits are inconsistent.
    #[error("invalid limits: {0}")]
    InvalidLimits(#[from] MeteringError),
}
