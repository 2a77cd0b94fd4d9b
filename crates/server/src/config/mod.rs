mod admission;
mod audit;
mod auth;
mod server;
mod state;
mod telemetry;


pub use admission::*;
pub use audit::*;
pub use auth::*;
pub use server::*;
pub use state::*;
pub use telemetry::*;

use std::path::Path;

use serde::Deserialize;

use tally_core::MeteringLimits;

use crate::error::ServerError;

/// Top-level configuration for the Tally server, loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct TallyConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub blob: BlobConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    /// Caps, per-file ceiling, allow-listed types and alert threshold.
    #[serde(default)]
    pub limits: MeteringLimits,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl TallyConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ServerError> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| ServerError::Config(format!("invalid configuration: {e}")))?;
        config
            .limits
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        Ok(config)
    }
}
