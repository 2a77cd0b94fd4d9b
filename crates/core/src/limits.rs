use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::MeteringError;

/// Number of bytes in one metered megabyte.
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Externally configured caps and policy constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeteringLimits {
    /// Per-tenant cumulative storage cap in MB.
    pub storage_limit_mb: f64,
    /// Largest single file accepted for upload, in MB.
    pub max_file_size_mb: f64,
    /// Per-tenant transfer cap per calendar day, in MB.
    pub daily_bandwidth_limit_mb: f64,
    /// Fraction of a cap at which an approaching-limit alert fires.
    pub alert_threshold: f64,
    /// Allow-listed file extensions (with leading dot) mapped to content type.
    pub allowed_types: BTreeMap<String, String>,
}

impl Default for MeteringLimits {
    fn default() -> Self {
        let allowed_types = [
            (".mp4", "video/mp4"),
            (".mov", "video/quicktime"),
            (".avi", "video/x-msvideo"),
            (".mkv", "video/x-matroska"),
        ]
        .into_iter()
        .map(|(ext, ty)| (ext.to_owned(), ty.to_owned()))
        .collect();

        Self {
            storage_limit_mb: 50.0,
            max_file_size_mb: 25.0,
            daily_bandwidth_limit_mb: 100.0,
            alert_threshold: 0.8,
            allowed_types,
        }
    }
}

impl MeteringLimits {
    /// Check that the limits are internally consistent.
    pub fn validate(&self) -> Result<(), MeteringError> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(MeteringError::ValidationFailed(format!(
                    "{name} must be a positive number, got {v}"
                )))
            }
        };
        positive("storage_limit_mb", self.storage_limit_mb)?;
        positive("max_file_size_mb", self.max_file_size_mb)?;
        positive("daily_bandwidth_limit_mb", self.daily_bandwidth_limit_mb)?;

        if !(self.alert_threshold > 0.0 && self.alert_threshold <= 1.0) {
            return Err(MeteringError::ValidationFailed(format!(
                "alert_threshold must be in (0, 1], got {}",
                self.alert_threshold
            )));
        }
        if self.max_file_size_mb > self.storage_limit_mb {
            return Err(MeteringError::ValidationFailed(
                "max_file_size_mb cannot exceed storage_limit_mb".into(),
            ));
        }
        if self.allowed_types.is_empty() {
            return Err(MeteringError::ValidationFailed(
                "allowed_types must list at least one extension".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the content type of `filename` from its extension, if allowed.
    ///
    /// Matching is case-insensitive on the extension.
    #[must_use]
    pub fn content_type_for(&self, filename: &str) -> Option<&str> {
        let dot = filename.rfind('.')?;
        let ext = filename[dot..].to_ascii_lowercase();
        self.allowed_types.get(&ext).map(String::as_str)
    }

    /// Storage level at which the approaching-limit signal fires.
    #[must_use]
    pub fn storage_alert_mb(&self) -> f64 {
        self.storage_limit_mb * self.alert_threshold
    }
}
