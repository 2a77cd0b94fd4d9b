use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use tally_audit::{AuditDispatcher, AuditLevel};
use tally_core::{
    AdmissionGrant, AdmissionRequest, DailyUsageRecord, MeteringError, Principal, Resource,
    TenantId,
};

use crate::alert::AlertEngine;
use crate::ledger::BandwidthLedger;
use crate::metrics::MeterMetrics;

/// Default bound on a single admission decision.
pub const DEFAULT_ADMISSION_TIMEOUT: Duration = Duration::from_secs(5);

const COMPONENT: &str = "admission";

/// The authorization point consulted before any bytes move.
///
/// Every error is a denial. Implementations must fail closed: a timeout or
/// an unreachable authority is reported as
/// [`MeteringError::UpstreamUnavailable`], never as a grant.
#[async_trait]
pub trait Admission: Send + Sync {
    async fn authorize(
        &self,
        principal: &Principal,
        request: &AdmissionRequest,
    ) -> Result<AdmissionGrant, MeteringError>;
}

/// How the bandwidth check and the charge are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionMode {
    /// Check and charge in one conditional update. The cap is never exceeded.
    #[default]
    Atomic,
    /// Check, then charge unconditionally. Concurrent requests can overrun
    /// the cap by at most the volume in flight.
    CheckThenRecord,
}

/// Local admission against the bandwidth ledger.
///
/// An admitted request is charged immediately and the charge is never
/// rolled back, even if the transfer later fails.
pub struct AdmissionGate {
    bandwidth: Arc<BandwidthLedger>,
    alerts: Arc<AlertEngine>,
    mode: AdmissionMode,
    timeout: Duration,
    audit: AuditDispatcher,
    metrics: Arc<MeterMetrics>,
}

impl AdmissionGate {
    pub fn new(
        bandwidth: Arc<BandwidthLedger>,
        alerts: Arc<AlertEngine>,
        audit: AuditDispatcher,
        metrics: Arc<MeterMetrics>,
    ) -> Self {
        Self {
            bandwidth,
            alerts,
            mode: AdmissionMode::default(),
            timeout: DEFAULT_ADMISSION_TIMEOUT,
            audit,
            metrics,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: AdmissionMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn mode(&self) -> AdmissionMode {
        self.mode
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn admit(
        &self,
        tenant: &TenantId,
        request: &AdmissionRequest,
    ) -> Result<AdmissionGrant, MeteringError> {
        let volume_mb = request.volume_mb;
        if !volume_mb.is_finite() || volume_mb < 0.0 {
            return Err(MeteringError::ValidationFailed(format!(
                "volume_mb must be a finite, non-negative number, got {volume_mb}"
            )));
        }

        // Fixed once so the charge and the alert evaluation agree across midnight.
        let day = self.bandwidth.today();
        let record = self.charge(tenant, day, request).await?;

        let alert = match self.alerts.evaluate(tenant, day).await {
            Ok(kind) => kind,
            Err(e) => {
                warn!(tenant = %tenant, error = %e, "alert evaluation failed after charge");
                None
            }
        };

        let limit = self.bandwidth.daily_limit_mb();
        Ok(AdmissionGrant {
            message: "Usage recorded successfully".to_owned(),
            tenant_id: tenant.clone(),
            date: day,
            operation_type: request.operation_type,
            volume_mb,
            current_usage_mb: record.total_mb,
            remaining_mb: record.remaining_mb(limit),
            alert,
        })
    }

    async fn charge(
        &self,
        tenant: &TenantId,
        day: NaiveDate,
        request: &AdmissionRequest,
    ) -> Result<DailyUsageRecord, MeteringError> {
        let (volume_mb, direction) = (request.volume_mb, request.operation_type);
        match self.mode {
            AdmissionMode::Atomic => {
                self.bandwidth
                    .try_consume_on(tenant, day, volume_mb, direction)
                    .await
            }
            AdmissionMode::CheckThenRecord => {
                let limit = self.bandwidth.daily_limit_mb();
                let current = self.bandwidth.get_or_create(tenant, day).await?;
                if !current.fits(volume_mb, limit) {
                    return Err(MeteringError::capacity(
                        Resource::Bandwidth,
                        volume_mb,
                        current.remaining_mb(limit),
                    ));
                }
                self.bandwidth
                    .record_on(tenant, day, volume_mb, direction)
                    .await
            }
        }
    }
}

#[async_trait]
impl Admission for AdmissionGate {
    #[instrument(
        name = "admission.authorize",
        skip_all,
        fields(tenant = %principal.tenant, volume_mb = request.volume_mb, direction = %request.operation_type)
    )]
    async fn authorize(
        &self,
        principal: &Principal,
        request: &AdmissionRequest,
    ) -> Result<AdmissionGrant, MeteringError> {
        let tenant = &principal.tenant;
        let outcome = match tokio::time::timeout(self.timeout, self.admit(tenant, request)).await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(MeteringError::UpstreamUnavailable(format!(
                "admission timed out after {}ms",
                self.timeout.as_millis()
            ))),
        };

        match &outcome {
            Ok(grant) => {
                self.metrics.increment_admissions_allowed();
                info!(total_mb = grant.current_usage_mb, alert = ?grant.alert, "admission granted");
                self.audit.record(
                    tenant,
                    COMPONENT,
                    AuditLevel::Info,
                    format!(
                        "admitted {} MB {}; {} MB used today",
                        request.volume_mb, request.operation_type, grant.current_usage_mb
                    ),
                );
            }
            Err(e) if e.is_user_correctable() => {
                self.metrics.increment_admissions_denied();
                info!(error = %e, "admission denied");
                self.audit.record(
                    tenant,
                    COMPONENT,
                    AuditLevel::Warn,
                    format!("denied {} MB {}: {e}", request.volume_mb, request.operation_type),
                );
            }
            Err(e) => {
                self.metrics.increment_admission_errors();
                warn!(error = %e, "admission failed closed");
                self.audit.record(
                    tenant,
                    COMPONENT,
                    AuditLevel::Error,
                    format!("admission failed: {e}"),
                );
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tally_core::Direction;
    use tally_state_memory::MemoryStateStore;

    use super::*;
    use crate::alert::AlertPolicy;
    use crate::clock::ManualClock;
    use crate::ledger::{LedgerContext, QuotaLedger};

    fn gate(mode: AdmissionMode) -> (AdmissionGate, Arc<MeterMetrics>) {
        let metrics = Arc::new(MeterMetrics::default());
        let ctx = LedgerContext {
            store: Arc::new(MemoryStateStore::new()),
            namespace: "test".into(),
            clock: Arc::new(ManualClock::new(
                Utc.with_ymd_and_hms(2024, 5, 10, 9, 30, 0).unwrap(),
            )),
            metrics: Arc::clone(&metrics),
        };
        let bandwidth = Arc::new(BandwidthLedger::new(ctx.clone(), 100.0));
        let quota = Arc::new(QuotaLedger::new(ctx.clone(), 50.0, 0.8));
        let alerts = Arc::new(AlertEngine::new(
            ctx,
            Arc::clone(&bandwidth),
            quota,
            0.8,
            AlertPolicy::OnTransition,
        ));
        let gate = AdmissionGate::new(
            bandwidth,
            alerts,
            AuditDispatcher::disabled(),
            Arc::clone(&metrics),
        )
        .with_mode(mode);
        (gate, metrics)
    }

    fn upload(volume_mb: f64) -> AdmissionRequest {
        AdmissionRequest::new(volume_mb, Direction::Upload)
    }

    #[tokio::test]
    async fn grant_reports_post_charge_figures() {
        let (gate, metrics) = gate(AdmissionMode::Atomic);
        let p = Principal::new("alice");
        let grant = gate.authorize(&p, &upload(30.0)).await.unwrap();
        assert_eq!(grant.date, NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
        assert!((grant.current_usage_mb - 30.0).abs() < 1e-9);
        assert!((grant.remaining_mb - 70.0).abs() < 1e-9);
        assert_eq!(grant.alert, None);
        assert_eq!(metrics.snapshot().admissions_allowed, 1);
    }

    #[tokio::test]
    async fn crossing_the_threshold_attaches_the_alert() {
        let (gate, _) = gate(AdmissionMode::Atomic);
        let p = Principal::new("alice");
        gate.authorize(&p, &upload(75.0)).await.unwrap();
        let grant = gate.authorize(&p, &upload(10.0)).await.unwrap();
        assert!((grant.current_usage_mb - 85.0).abs() < 1e-9);
        assert_eq!(grant.alert, Some(tally_core::AlertKind::ApproachingLimit));
    }

    #[tokio::test]
    async fn both_modes_deny_over_the_cap_without_charging() {
        for mode in [AdmissionMode::Atomic, AdmissionMode::CheckThenRecord] {
            let (gate, metrics) = gate(mode);
            let p = Principal::new("alice");
            gate.authorize(&p, &upload(95.0)).await.unwrap();
            let err = gate
                .authorize(&p, &AdmissionRequest::new(6.0, Direction::Download))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                MeteringError::CapacityExceeded {
                    resource: Resource::Bandwidth,
                    ..
                }
            ));
            let grant = gate.authorize(&p, &upload(5.0)).await.unwrap();
            assert!((grant.current_usage_mb - 100.0).abs() < 1e-9, "{mode:?}");
            assert_eq!(metrics.snapshot().admissions_denied, 1);
        }
    }

    #[tokio::test]
    async fn rejects_nonsense_volumes() {
        let (gate, metrics) = gate(AdmissionMode::Atomic);
        let p = Principal::new("alice");
        for volume in [-1.0, f64::NAN, f64::INFINITY] {
            let err = gate.authorize(&p, &upload(volume)).await.unwrap_err();
            assert!(matches!(err, MeteringError::ValidationFailed(_)));
        }
        assert_eq!(metrics.snapshot().admissions_denied, 3);
    }

    #[tokio::test]
    async fn zero_volume_is_admitted() {
        let (gate, _) = gate(AdmissionMode::Atomic);
        let grant = gate
            .authorize(&Principal::new("alice"), &upload(0.0))
            .await
            .unwrap();
        assert!(grant.current_usage_mb.abs() < f64::EPSILON);
    }
}
