use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tally_core::TenantId;

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        })
    }
}

/// A single business audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique identifier (UUID v7, time ordered).
    pub id: String,
    pub tenant_id: TenantId,
    /// The component that produced the event (e.g. `admission`, `storage`).
    pub component: String,
    pub level: AuditLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    #[must_use]
    pub fn new(
        tenant_id: TenantId,
        component: impl Into<String>,
        level: AuditLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            tenant_id,
            component: component.into(),
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Filters for querying stored audit events.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AuditQuery {
    pub tenant: Option<String>,
    pub component: Option<String>,
    pub level: Option<AuditLevel>,
    /// Maximum number of events to return (default 20, max 1000).
    pub limit: Option<u32>,
}

impl AuditQuery {
    /// Return the effective limit, clamped to 1..=1000, defaulting to 20.
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(20).clamp(1, 1000)
    }

    /// Whether `event` passes every filter set on this query.
    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.tenant
            .as_deref()
            .is_none_or(|t| t == event.tenant_id.as_str())
            && self
                .component
                .as_deref()
                .is_none_or(|c| c == event.component)
            && self.level.is_none_or(|l| l == event.level)
    }
}
