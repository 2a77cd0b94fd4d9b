use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TenantId;

/// Severity of a threshold crossing.
///
/// Variants are ordered by severity so escalation can be compared directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    ApproachingLimit,
    LimitExceeded,
}

impl AlertKind {
    /// Classify `observed_mb` against `limit_mb` and the warning fraction.
    ///
    /// `LimitExceeded` when `observed >= limit`, `ApproachingLimit` when
    /// `threshold * limit <= observed < limit`, otherwise nothing.
    #[must_use]
    pub fn classify(observed_mb: f64, limit_mb: f64, threshold: f64) -> Option<Self> {
        if observed_mb >= limit_mb {
            Some(Self::LimitExceeded)
        } else if observed_mb >= limit_mb * threshold {
            Some(Self::ApproachingLimit)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApproachingLimit => "APPROACHING_LIMIT",
            Self::LimitExceeded => "LIMIT_EXCEEDED",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable observation that a tenant crossed a bandwidth threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub tenant_id: TenantId,
    pub day: NaiveDate,
    pub alert_kind: AlertKind,
    /// The level that was crossed (the warning level or the hard cap).
    pub threshold_mb: f64,
    pub observed_mb: f64,
    pub created_at: DateTime<Utc>,
}
