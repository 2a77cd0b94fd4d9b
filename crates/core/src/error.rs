use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The metered resource a capacity denial refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    /// Cumulative per-tenant storage.
    Storage,
    /// Per-tenant, per-day transfer volume.
    Bandwidth,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage => f.write_str("storage"),
            Self::Bandwidth => f.write_str("bandwidth"),
        }
    }
}

/// Error taxonomy shared by every metering component.
///
/// Every variant is a denial: a caller that receives any of them must not
/// move bytes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeteringError {
    #[error("{resource} limit exceeded: requested {requested_mb} MB, {remaining_mb} MB remaining")]
    CapacityExceeded {
        resource: Resource,
        requested_mb: f64,
        remaining_mb: f64,
    },

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl MeteringError {
    /// Build a capacity denial, clamping the reported headroom at zero.
    pub fn capacity(resource: Resource, requested_mb: f64, remaining_mb: f64) -> Self {
        Self::CapacityExceeded {
            resource,
            requested_mb,
            remaining_mb: remaining_mb.max(0.0),
        }
    }

    /// Stable machine-readable code for this error kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::ValidationFailed(_) => "validation_failed",
            Self::NotFound(_) => "not_found",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::Unexpected(_) => "unexpected",
        }
    }

    /// Whether the caller must refrain from moving bytes.
    ///
    /// Every kind is a denial, including infrastructure failures: the
    /// engine fails closed.
    #[must_use]
    pub fn is_denial(&self) -> bool {
        match self {
            Self::CapacityExceeded { .. }
            | Self::ValidationFailed(_)
            | Self::NotFound(_)
            | Self::UpstreamUnavailable(_)
            | Self::Unexpected(_) => true,
        }
    }

    /// Whether the caller can fix the request and try again.
    #[must_use]
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded { .. } | Self::ValidationFailed(_)
        )
    }

    /// Whether the failure is transient on the infrastructure side.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_))
    }
}
