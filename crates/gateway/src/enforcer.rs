use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tracing::{debug, info, instrument, warn};

use tally_audit::{AuditDispatcher, AuditLevel};
use tally_blob::BlobStore;
use tally_core::{
    AdmissionRequest, BYTES_PER_MB, Direction, FileDescriptor, MeteringError, MeteringLimits,
    Principal, QuotaStatus, Resource, TenantId,
};

use crate::admission::{Admission, AdmissionMode};
use crate::clock::Clock;
use crate::ledger::QuotaLedger;
use crate::metrics::MeterMetrics;

/// Chunk size used by [`QuotaEnforcer::stream`] when the caller has no preference.
pub const DEFAULT_STREAM_CHUNK: usize = 64 * 1024;

const COMPONENT: &str = "storage";

/// Outcome of a successful upload pre-check.
#[derive(Debug, Clone, PartialEq)]
pub struct Admitted {
    pub content_type: String,
    pub size_mb: f64,
}

/// A file's bytes delivered in chunks.
pub type ChunkStream = BoxStream<'static, Bytes>;

#[allow(clippy::cast_precision_loss)]
fn megabytes(len: usize) -> f64 {
    len as f64 / BYTES_PER_MB
}

fn validate_filename(name: &str) -> Result<(), MeteringError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(MeteringError::ValidationFailed(format!(
            "invalid filename '{name}'"
        )));
    }
    Ok(())
}

/// Storage-side policy: validates, admits and accounts for file transfers.
pub struct QuotaEnforcer {
    quota: Arc<QuotaLedger>,
    gate: Arc<dyn Admission>,
    blobs: Arc<dyn BlobStore>,
    limits: MeteringLimits,
    mode: AdmissionMode,
    audit: AuditDispatcher,
    metrics: Arc<MeterMetrics>,
    clock: Arc<dyn Clock>,
}

impl QuotaEnforcer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        quota: Arc<QuotaLedger>,
        gate: Arc<dyn Admission>,
        blobs: Arc<dyn BlobStore>,
        limits: MeteringLimits,
        mode: AdmissionMode,
        audit: AuditDispatcher,
        metrics: Arc<MeterMetrics>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            quota,
            gate,
            blobs,
            limits,
            mode,
            audit,
            metrics,
            clock,
        }
    }

    pub fn limits(&self) -> &MeteringLimits {
        &self.limits
    }

    /// Decide whether a file of `size_mb` called `filename` may be uploaded.
    ///
    /// Checks the per-file ceiling, the extension allow-list, name
    /// uniqueness and the storage cap. Nothing is reserved.
    pub async fn try_upload(
        &self,
        tenant: &TenantId,
        filename: &str,
        size_mb: f64,
    ) -> Result<Admitted, MeteringError> {
        tenant.validate()?;
        validate_filename(filename)?;
        if !size_mb.is_finite() || size_mb < 0.0 {
            return Err(MeteringError::ValidationFailed(format!(
                "file size must be a finite, non-negative number, got {size_mb}"
            )));
        }
        if size_mb > self.limits.max_file_size_mb {
            return Err(MeteringError::ValidationFailed(format!(
                "file size {size_mb:.2} MB exceeds the maximum of {} MB",
                self.limits.max_file_size_mb
            )));
        }
        let content_type = self
            .limits
            .content_type_for(filename)
            .ok_or_else(|| {
                MeteringError::ValidationFailed(format!("file type of '{filename}' is not allowed"))
            })?
            .to_owned();

        let record = self.quota.get_or_create(tenant).await?;
        if record.find(filename).is_some() {
            return Err(MeteringError::ValidationFailed(format!(
                "file '{filename}' already exists"
            )));
        }
        let limit = self.quota.limit_mb();
        if !record.fits(size_mb, limit) {
            return Err(MeteringError::capacity(
                Resource::Storage,
                size_mb,
                record.available_mb(limit),
            ));
        }
        Ok(Admitted {
            content_type,
            size_mb,
        })
    }

    /// Validate, admit, store and account for an upload.
    #[instrument(name = "enforcer.upload", skip_all, fields(tenant = %principal.tenant, file = filename, bytes = data.len()))]
    pub async fn upload(
        &self,
        principal: &Principal,
        filename: &str,
        data: Bytes,
    ) -> Result<FileDescriptor, MeteringError> {
        let result = self.upload_inner(principal, filename, data).await;
        let tenant = &principal.tenant;
        match &result {
            Ok(file) => {
                self.metrics.increment_uploads_committed();
                info!(size_mb = file.size_mb, "upload committed");
                self.audit.record(
                    tenant,
                    COMPONENT,
                    AuditLevel::Info,
                    format!("uploaded '{}' ({:.2} MB)", file.name, file.size_mb),
                );
            }
            Err(e) => {
                self.metrics.increment_uploads_rejected();
                self.report_failure(tenant, &format!("upload of '{filename}'"), e);
            }
        }
        result
    }

    async fn upload_inner(
        &self,
        principal: &Principal,
        filename: &str,
        data: Bytes,
    ) -> Result<FileDescriptor, MeteringError> {
        let tenant = &principal.tenant;
        let size_mb = megabytes(data.len());
        let admitted = self.try_upload(tenant, filename, size_mb).await?;

        self.gate
            .authorize(principal, &AdmissionRequest::new(size_mb, Direction::Upload))
            .await?;

        let now = self.clock.now();
        // Unique per attempt: a racing upload of the same name must never share
        // bytes with this one, or its cleanup would delete ours.
        let blob_id = format!(
            "tenants/{tenant}/{}_{}_{filename}",
            now.timestamp_millis(),
            uuid::Uuid::new_v4().simple()
        );
        self.blobs
            .put(&blob_id, &admitted.content_type, data)
            .await?;

        let file = FileDescriptor {
            name: filename.to_owned(),
            size_mb,
            uploaded_at: now,
            content_type: admitted.content_type,
            blob_reference: blob_id.clone(),
        };
        let committed = match self.mode {
            AdmissionMode::Atomic => {
                self.quota
                    .commit_add_within(tenant, file.clone(), self.quota.limit_mb())
                    .await
            }
            AdmissionMode::CheckThenRecord => self.quota.commit_add(tenant, file.clone()).await,
        };
        if let Err(e) = committed {
            // The bytes are stored but unaccounted for: drop them again.
            if let Err(cleanup) = self.blobs.delete(&blob_id).await {
                warn!(blob = %blob_id, error = %cleanup, "failed to remove uncommitted blob");
            }
            return Err(e);
        }
        Ok(file)
    }

    async fn locate(&self, tenant: &TenantId, filename: &str) -> Result<FileDescriptor, MeteringError> {
        self.quota
            .find(tenant, filename)
            .await?
            .ok_or_else(|| MeteringError::NotFound(format!("file '{filename}' not found")))
    }

    /// Locate the file, confirm its bytes exist, then charge download bandwidth.
    async fn admit_download(
        &self,
        principal: &Principal,
        filename: &str,
    ) -> Result<FileDescriptor, MeteringError> {
        let file = self.locate(&principal.tenant, filename).await?;
        if !self.blobs.exists(&file.blob_reference).await? {
            return Err(MeteringError::NotFound(format!(
                "blob '{}' missing in storage",
                file.blob_reference
            )));
        }
        self.gate
            .authorize(
                principal,
                &AdmissionRequest::new(file.size_mb, Direction::Download),
            )
            .await?;
        Ok(file)
    }

    #[instrument(name = "enforcer.download", skip_all, fields(tenant = %principal.tenant, file = filename))]
    pub async fn download(
        &self,
        principal: &Principal,
        filename: &str,
    ) -> Result<(FileDescriptor, Bytes), MeteringError> {
        let result: Result<(FileDescriptor, Bytes), MeteringError> = async {
            let file = self.admit_download(principal, filename).await?;
            let data = self.blobs.get(&file.blob_reference).await?;
            Ok((file, data))
        }
        .await;
        self.report_download(principal, filename, "download", result.as_ref().map(|_| ()));
        result
    }

    /// Same admission path as [`download`](Self::download), delivering the
    /// bytes in chunks of at most `chunk_size`.
    #[instrument(name = "enforcer.stream", skip_all, fields(tenant = %principal.tenant, file = filename))]
    pub async fn stream(
        &self,
        principal: &Principal,
        filename: &str,
        chunk_size: usize,
    ) -> Result<(FileDescriptor, ChunkStream), MeteringError> {
        let result: Result<(FileDescriptor, ChunkStream), MeteringError> = async {
            if chunk_size == 0 {
                return Err(MeteringError::ValidationFailed(
                    "chunk size must be positive".into(),
                ));
            }
            let file = self.admit_download(principal, filename).await?;
            let data = self.blobs.get(&file.blob_reference).await?;
            let chunks: Vec<Bytes> = (0..data.len())
                .step_by(chunk_size)
                .map(|start| data.slice(start..data.len().min(start + chunk_size)))
                .collect();
            Ok((file, stream::iter(chunks).boxed()))
        }
        .await;
        self.report_download(principal, filename, "stream", result.as_ref().map(|_| ()));
        result
    }

    fn report_download(
        &self,
        principal: &Principal,
        filename: &str,
        verb: &str,
        result: Result<(), &MeteringError>,
    ) {
        match result {
            Ok(()) => {
                self.metrics.increment_downloads();
                info!("{verb} admitted");
                self.audit.record(
                    &principal.tenant,
                    COMPONENT,
                    AuditLevel::Info,
                    format!("{verb} of '{filename}' started"),
                );
            }
            Err(e) => self.report_failure(&principal.tenant, &format!("{verb} of '{filename}'"), e),
        }
    }

    /// Remove a file: physical bytes first, then the accounting.
    ///
    /// A blob-store failure leaves the metadata and quota untouched.
    #[instrument(name = "enforcer.delete", skip_all, fields(tenant = %tenant, file = filename))]
    pub async fn delete(
        &self,
        tenant: &TenantId,
        filename: &str,
    ) -> Result<FileDescriptor, MeteringError> {
        let result: Result<FileDescriptor, MeteringError> = async {
            let file = self.locate(tenant, filename).await?;
            if !self.blobs.delete(&file.blob_reference).await? {
                debug!(blob = %file.blob_reference, "blob already absent");
            }
            self.quota.commit_remove(tenant, filename).await
        }
        .await;
        match &result {
            Ok(file) => {
                self.metrics.increment_deletions();
                info!(size_mb = file.size_mb, "file deleted");
                self.audit.record(
                    tenant,
                    COMPONENT,
                    AuditLevel::Info,
                    format!("deleted '{filename}'"),
                );
            }
            Err(e) => self.report_failure(tenant, &format!("delete of '{filename}'"), e),
        }
        result
    }

    pub async fn list_files(&self, tenant: &TenantId) -> Result<Vec<FileDescriptor>, MeteringError> {
        let files = self.quota.list_files(tenant).await?;
        self.audit.record(
            tenant,
            COMPONENT,
            AuditLevel::Info,
            format!("listed {} files", files.len()),
        );
        Ok(files)
    }

    pub async fn status(&self, tenant: &TenantId) -> Result<QuotaStatus, MeteringError> {
        self.quota.status(tenant).await
    }

    fn report_failure(&self, tenant: &TenantId, what: &str, err: &MeteringError) {
        let level = if err.is_user_correctable() || matches!(err, MeteringError::NotFound(_)) {
            info!(error = %err, "{what} refused");
            AuditLevel::Warn
        } else {
            warn!(error = %err, "{what} failed");
            AuditLevel::Error
        };
        self.audit
            .record(tenant, COMPONENT, level, format!("{what} failed: {err}"));
    }
}
