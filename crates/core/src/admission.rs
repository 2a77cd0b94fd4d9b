use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::alert::AlertKind;
use crate::types::TenantId;
use crate::usage::Direction;

/// A verified caller identity plus the credential it presented.
///
/// The credential is kept so a remote admission authority can be consulted
/// on the caller's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub tenant: TenantId,
    pub credential: Option<String>,
}

impl Principal {
    #[must_use]
    pub fn new(tenant: impl Into<TenantId>) -> Self {
        Self {
            tenant: tenant.into(),
            credential: None,
        }
    }

    #[must_use]
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }
}

/// Body of an admission request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionRequest {
    pub volume_mb: f64,
    pub operation_type: Direction,
}

impl AdmissionRequest {
    #[must_use]
    pub fn new(volume_mb: f64, operation_type: Direction) -> Self {
        Self {
            volume_mb,
            operation_type,
        }
    }
}

/// A successful admission decision with post-charge usage figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionGrant {
    pub message: String,
    pub tenant_id: TenantId,
    pub date: NaiveDate,
    pub operation_type: Direction,
    pub volume_mb: f64,
    pub current_usage_mb: f64,
    pub remaining_mb: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert: Option<AlertKind>,
}
