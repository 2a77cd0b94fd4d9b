use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MeteringError;
use crate::types::TenantId;

/// Metadata for one stored file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Unique within the owning tenant's file set.
    pub name: String,
    pub size_mb: f64,
    pub uploaded_at: DateTime<Utc>,
    pub content_type: String,
    /// Opaque locator into the blob store.
    pub blob_reference: String,
}

/// Cumulative storage held by one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantStorageRecord {
    pub tenant_id: TenantId,
    /// Always the sum of `files[].size_mb`.
    pub consumed_mb: f64,
    pub files: Vec<FileDescriptor>,
    pub last_updated: DateTime<Utc>,
}

impl TenantStorageRecord {
    #[must_use]
    pub fn new(tenant_id: TenantId, now: DateTime<Utc>) -> Self {
        Self {
            tenant_id,
            consumed_mb: 0.0,
            files: Vec::new(),
            last_updated: now,
        }
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&FileDescriptor> {
        self.files.iter().find(|f| f.name == name)
    }

    /// Whether `size_mb` more still fits under `limit_mb`. The boundary is inclusive.
    #[must_use]
    pub fn fits(&self, size_mb: f64, limit_mb: f64) -> bool {
        self.consumed_mb + size_mb <= limit_mb
    }

    #[must_use]
    pub fn available_mb(&self, limit_mb: f64) -> f64 {
        (limit_mb - self.consumed_mb).max(0.0)
    }

    /// Append `file`, rejecting a name that is already present.
    pub fn add_file(
        &mut self,
        file: FileDescriptor,
        now: DateTime<Utc>,
    ) -> Result<(), MeteringError> {
        if self.find(&file.name).is_some() {
            return Err(MeteringError::ValidationFailed(format!(
                "file '{}' already exists",
                file.name
            )));
        }
        self.files.push(file);
        self.recompute(now);
        Ok(())
    }

    /// Remove and return the file called `name`.
    pub fn remove_file(
        &mut self,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<FileDescriptor, MeteringError> {
        let idx = self
            .files
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| MeteringError::NotFound(format!("file '{name}' not found")))?;
        let removed = self.files.remove(idx);
        self.recompute(now);
        Ok(removed)
    }

    // Summing the inventory keeps the total exact across add/remove pairs.
    fn recompute(&mut self, now: DateTime<Utc>) {
        self.consumed_mb = self.files.iter().map(|f| f.size_mb).sum();
        self.last_updated = now;
    }
}

/// Quota status query response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub tenant_id: TenantId,
    pub consumed_mb: f64,
    pub limit_mb: f64,
    pub available_mb: f64,
    pub usage_percentage: f64,
    pub should_alert: bool,
    pub files: Vec<FileDescriptor>,
}

/// Response to a committed upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub message: String,
    /// Whether storage has reached the warning fraction after this upload.
    pub should_alert: bool,
    pub file: FileDescriptor,
}
