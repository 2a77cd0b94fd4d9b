use serde::Deserialize;

use tally_audit::DEFAULT_MAX_IN_FLIGHT;

/// Configuration for the business audit log.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Whether audit events are recorded at all.
    pub enabled: bool,
    /// `"memory"` (queryable at `/v1/audit`) or `"http"` (remote log service).
    pub backend: String,
    /// Base URL of the remote log service for the `http` backend.
    pub url: Option<String>,
    /// Per-event delivery timeout for the `http` backend.
    pub timeout_seconds: u64,
    /// Deliveries allowed in flight before new events are dropped.
    pub max_in_flight: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: "memory".to_owned(),
            url: None,
            timeout_seconds: 2,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}
