use std::time::Duration;

use serde::Deserialize;

use tally_gateway::{AdmissionMode, AlertPolicy};

/// How transfers are admitted and alerts recorded.
///
/// ```toml
/// [admission]
/// mode = "atomic"
/// alert_policy = "on_transition"
/// timeout_ms = 5000
/// # remote_url = "http://metering.internal:8080"
/// ```
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    pub mode: AdmissionMode,
    pub alert_policy: AlertPolicy,
    /// Bound on one admission decision, local or remote.
    pub timeout_ms: u64,
    /// Delegate admission to another Tally instance instead of the local gate.
    pub remote_url: Option<String>,
    /// Key namespace for every ledger record.
    pub namespace: String,
}

impl AdmissionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            mode: AdmissionMode::default(),
            alert_policy: AlertPolicy::default(),
            timeout_ms: 5_000,
            remote_url: None,
            namespace: "tally".to_owned(),
        }
    }
}
