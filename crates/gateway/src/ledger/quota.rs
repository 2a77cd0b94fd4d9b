use std::sync::Arc;

use tracing::{debug, instrument};

use tally_core::{
    FileDescriptor, MeteringError, QuotaStatus, Resource, TenantId, TenantStorageRecord,
};
use tally_state::{KeyKind, StateKey};

use super::LedgerContext;
use crate::records;

/// Per-tenant cumulative storage and file inventory.
pub struct QuotaLedger {
    ctx: LedgerContext,
    limit_mb: f64,
    alert_threshold: f64,
}

impl QuotaLedger {
    pub fn new(ctx: LedgerContext, limit_mb: f64, alert_threshold: f64) -> Self {
        Self {
            ctx,
            limit_mb,
            alert_threshold,
        }
    }

    pub fn limit_mb(&self) -> f64 {
        self.limit_mb
    }

    fn key(&self, tenant: &TenantId) -> Result<StateKey, MeteringError> {
        self.ctx.key(tenant, KeyKind::StorageLedger, "current")
    }

    fn init(&self, tenant: &TenantId) -> impl Fn() -> TenantStorageRecord + use<> {
        let tenant = tenant.clone();
        let clock = Arc::clone(&self.ctx.clock);
        move || TenantStorageRecord::new(tenant.clone(), clock.now())
    }

    /// Return the tenant's record, creating an empty one on first access.
    pub async fn get_or_create(
        &self,
        tenant: &TenantId,
    ) -> Result<TenantStorageRecord, MeteringError> {
        records::get_or_insert(self.ctx.store.as_ref(), &self.key(tenant)?, self.init(tenant))
            .await
    }

    /// Whether `size_mb` more would stay within the storage cap.
    ///
    /// This is a check only; the commit re-validates when run in atomic mode.
    pub async fn reserve(&self, tenant: &TenantId, size_mb: f64) -> Result<bool, MeteringError> {
        Ok(self.get_or_create(tenant).await?.fits(size_mb, self.limit_mb))
    }

    /// Append `file` and add its size to the consumed total.
    #[instrument(name = "quota.commit_add", skip_all, fields(tenant = %tenant, file = %file.name))]
    pub async fn commit_add(
        &self,
        tenant: &TenantId,
        file: FileDescriptor,
    ) -> Result<TenantStorageRecord, MeteringError> {
        self.commit(tenant, file, None).await
    }

    /// Like [`commit_add`](Self::commit_add) but only if the result stays within `limit_mb`.
    #[instrument(name = "quota.commit_add_within", skip_all, fields(tenant = %tenant, file = %file.name))]
    pub async fn commit_add_within(
        &self,
        tenant: &TenantId,
        file: FileDescriptor,
        limit_mb: f64,
    ) -> Result<TenantStorageRecord, MeteringError> {
        self.commit(tenant, file, Some(limit_mb)).await
    }

    async fn commit(
        &self,
        tenant: &TenantId,
        file: FileDescriptor,
        limit_mb: Option<f64>,
    ) -> Result<TenantStorageRecord, MeteringError> {
        let now = self.ctx.clock.now();
        let (record, ()) = records::update(
            self.ctx.store.as_ref(),
            &self.key(tenant)?,
            &self.ctx.metrics,
            self.init(tenant),
            |record: &mut TenantStorageRecord| {
                if let Some(limit) = limit_mb {
                    if !record.fits(file.size_mb, limit) {
                        return Err(MeteringError::capacity(
                            Resource::Storage,
                            file.size_mb,
                            record.available_mb(limit),
                        ));
                    }
                }
                record.add_file(file.clone(), now)
            },
        )
        .await?;
        debug!(consumed_mb = record.consumed_mb, "file committed");
        Ok(record)
    }

    /// Remove the file called `filename` and subtract its size.
    #[instrument(name = "quota.commit_remove", skip_all, fields(tenant = %tenant, file = filename))]
    pub async fn commit_remove(
        &self,
        tenant: &TenantId,
        filename: &str,
    ) -> Result<FileDescriptor, MeteringError> {
        let now = self.ctx.clock.now();
        let (record, removed) = records::update(
            self.ctx.store.as_ref(),
            &self.key(tenant)?,
            &self.ctx.metrics,
            self.init(tenant),
            |record: &mut TenantStorageRecord| record.remove_file(filename, now),
        )
        .await?;
        debug!(consumed_mb = record.consumed_mb, "file removed");
        Ok(removed)
    }

    pub async fn find(
        &self,
        tenant: &TenantId,
        filename: &str,
    ) -> Result<Option<FileDescriptor>, MeteringError> {
        Ok(self.get_or_create(tenant).await?.find(filename).cloned())
    }

    pub async fn list_files(&self, tenant: &TenantId) -> Result<Vec<FileDescriptor>, MeteringError> {
        Ok(self.get_or_create(tenant).await?.files)
    }

    fn alerting(&self, record: &TenantStorageRecord) -> bool {
        record.consumed_mb / self.limit_mb >= self.alert_threshold
    }

    /// Whether consumption has reached the warning fraction of the cap.
    pub async fn should_alert(&self, tenant: &TenantId) -> Result<bool, MeteringError> {
        let record = self.get_or_create(tenant).await?;
        Ok(self.alerting(&record))
    }

    pub async fn status(&self, tenant: &TenantId) -> Result<QuotaStatus, MeteringError> {
        let record = self.get_or_create(tenant).await?;
        Ok(QuotaStatus {
            tenant_id: record.tenant_id.clone(),
            consumed_mb: record.consumed_mb,
            limit_mb: self.limit_mb,
            available_mb: record.available_mb(self.limit_mb),
            usage_percentage: record.consumed_mb / self.limit_mb * 100.0,
            should_alert: self.alerting(&record),
            files: record.files,
        })
    }
}
