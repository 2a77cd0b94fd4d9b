use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, instrument};

use tally_core::{DailyUsageRecord, Direction, MeteringError, Resource, TenantId, UsageStatus};
use tally_state::{KeyKind, StateKey};

use super::LedgerContext;
use crate::records;

/// Per-tenant, per-day transfer volume.
///
/// Each calendar day is its own record keyed by the ISO date, so rollover
/// needs no reset: the first request of a new day creates a fresh record.
pub struct BandwidthLedger {
    ctx: LedgerContext,
    daily_limit_mb: f64,
}

impl BandwidthLedger {
    pub fn new(ctx: LedgerContext, daily_limit_mb: f64) -> Self {
        Self {
            ctx,
            daily_limit_mb,
        }
    }

    pub fn daily_limit_mb(&self) -> f64 {
        self.daily_limit_mb
    }

    /// Today's date according to the ledger clock.
    pub fn today(&self) -> NaiveDate {
        self.ctx.clock.today()
    }

    fn key(&self, tenant: &TenantId, day: NaiveDate) -> Result<StateKey, MeteringError> {
        self.ctx.key(tenant, KeyKind::DailyUsage, day.to_string())
    }

    fn init(&self, tenant: &TenantId, day: NaiveDate) -> impl Fn() -> DailyUsageRecord + use<> {
        let tenant = tenant.clone();
        let clock = Arc::clone(&self.ctx.clock);
        move || DailyUsageRecord::new(tenant.clone(), day, clock.now())
    }

    pub async fn get_or_create(
        &self,
        tenant: &TenantId,
        day: NaiveDate,
    ) -> Result<DailyUsageRecord, MeteringError> {
        records::get_or_insert(
            self.ctx.store.as_ref(),
            &self.key(tenant, day)?,
            self.init(tenant, day),
        )
        .await
    }

    /// True iff today's total plus `volume_mb` stays within the daily cap.
    pub async fn can_consume(&self, tenant: &TenantId, volume_mb: f64) -> Result<bool, MeteringError> {
        self.can_consume_on(tenant, self.today(), volume_mb).await
    }

    pub async fn can_consume_on(
        &self,
        tenant: &TenantId,
        day: NaiveDate,
        volume_mb: f64,
    ) -> Result<bool, MeteringError> {
        Ok(self
            .get_or_create(tenant, day)
            .await?
            .fits(volume_mb, self.daily_limit_mb))
    }

    /// Add `volume_mb` to today's record unconditionally.
    pub async fn record(
        &self,
        tenant: &TenantId,
        volume_mb: f64,
        direction: Direction,
    ) -> Result<DailyUsageRecord, MeteringError> {
        self.record_on(tenant, self.today(), volume_mb, direction).await
    }

    #[instrument(name = "bandwidth.record", skip_all, fields(tenant = %tenant, %day, volume_mb, %direction))]
    pub async fn record_on(
        &self,
        tenant: &TenantId,
        day: NaiveDate,
        volume_mb: f64,
        direction: Direction,
    ) -> Result<DailyUsageRecord, MeteringError> {
        self.apply(tenant, day, volume_mb, direction, false).await
    }

    /// Add `volume_mb` only if the result stays within the daily cap.
    ///
    /// The bound is checked inside the atomic update, so concurrent callers
    /// can never push the total past the cap.
    pub async fn try_consume(
        &self,
        tenant: &TenantId,
        volume_mb: f64,
        direction: Direction,
    ) -> Result<DailyUsageRecord, MeteringError> {
        self.try_consume_on(tenant, self.today(), volume_mb, direction)
            .await
    }

    #[instrument(name = "bandwidth.try_consume", skip_all, fields(tenant = %tenant, %day, volume_mb, %direction))]
    pub async fn try_consume_on(
        &self,
        tenant: &TenantId,
        day: NaiveDate,
        volume_mb: f64,
        direction: Direction,
    ) -> Result<DailyUsageRecord, MeteringError> {
        self.apply(tenant, day, volume_mb, direction, true).await
    }

    async fn apply(
        &self,
        tenant: &TenantId,
        day: NaiveDate,
        volume_mb: f64,
        direction: Direction,
        bounded: bool,
    ) -> Result<DailyUsageRecord, MeteringError> {
        let now = self.ctx.clock.now();
        let limit = self.daily_limit_mb;
        let (record, ()) = records::update(
            self.ctx.store.as_ref(),
            &self.key(tenant, day)?,
            &self.ctx.metrics,
            self.init(tenant, day),
            |record: &mut DailyUsageRecord| {
                if bounded && !record.fits(volume_mb, limit) {
                    return Err(MeteringError::capacity(
                        Resource::Bandwidth,
                        volume_mb,
                        record.remaining_mb(limit),
                    ));
                }
                record.add(direction, volume_mb, now);
                Ok(())
            },
        )
        .await?;
        debug!(total_mb = record.total_mb, "usage recorded");
        Ok(record)
    }

    /// Usage status for today.
    pub async fn status(&self, tenant: &TenantId) -> Result<UsageStatus, MeteringError> {
        self.status_on(tenant, self.today()).await
    }

    pub async fn status_on(
        &self,
        tenant: &TenantId,
        day: NaiveDate,
    ) -> Result<UsageStatus, MeteringError> {
        let record = self.get_or_create(tenant, day).await?;
        Ok(UsageStatus::from_record(&record, self.daily_limit_mb))
    }
}
