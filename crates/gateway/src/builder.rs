use std::sync::Arc;
use std::time::Duration;

use tally_audit::AuditDispatcher;
use tally_blob::BlobStore;
use tally_core::{MeteringLimits, Namespace};
use tally_state::StateStore;

use crate::admission::{Admission, AdmissionGate, AdmissionMode, DEFAULT_ADMISSION_TIMEOUT};
use crate::alert::{AlertEngine, AlertPolicy};
use crate::clock::{Clock, SystemClock};
use crate::enforcer::QuotaEnforcer;
use crate::error::BuildError;
use crate::ledger::{BandwidthLedger, LedgerContext, QuotaLedger};
use crate::metrics::MeterMetrics;

/// The wired metering engine.
///
/// Every component shares one state store, clock and metrics block. Handles
/// are reference counted, so accessors hand out cheap clones.
pub struct Meter {
    quota: Arc<QuotaLedger>,
    bandwidth: Arc<BandwidthLedger>,
    alerts: Arc<AlertEngine>,
    gate: Arc<dyn Admission>,
    enforcer: Arc<QuotaEnforcer>,
    metrics: Arc<MeterMetrics>,
    audit: AuditDispatcher,
    limits: MeteringLimits,
}

impl Meter {
    pub fn builder() -> MeterBuilder {
        MeterBuilder::new()
    }

    pub fn quota(&self) -> &Arc<QuotaLedger> {
        &self.quota
    }

    pub fn bandwidth(&self) -> &Arc<BandwidthLedger> {
        &self.bandwidth
    }

    pub fn alerts(&self) -> &Arc<AlertEngine> {
        &self.alerts
    }

    /// The admission authority transfers are checked against.
    ///
    /// This is the local [`AdmissionGate`] unless a remote authority was
    /// configured with [`MeterBuilder::remote_admission`].
    pub fn gate(&self) -> &Arc<dyn Admission> {
        &self.gate
    }

    pub fn enforcer(&self) -> &Arc<QuotaEnforcer> {
        &self.enforcer
    }

    pub fn metrics(&self) -> &Arc<MeterMetrics> {
        &self.metrics
    }

    pub fn audit(&self) -> &AuditDispatcher {
        &self.audit
    }

    pub fn limits(&self) -> &MeteringLimits {
        &self.limits
    }
}

/// Fluent builder for a [`Meter`].
///
/// A [`StateStore`] and a [`BlobStore`] are required. Everything else
/// defaults: standard limits, atomic admission, transition-only alerts,
/// a 5 second admission timeout, the system clock and no audit sink.
pub struct MeterBuilder {
    state: Option<Arc<dyn StateStore>>,
    blobs: Option<Arc<dyn BlobStore>>,
    audit: AuditDispatcher,
    limits: MeteringLimits,
    namespace: Namespace,
    mode: AdmissionMode,
    alert_policy: AlertPolicy,
    admission_timeout: Duration,
    clock: Arc<dyn Clock>,
    remote_admission: Option<Arc<dyn Admission>>,
}

impl MeterBuilder {
    pub fn new() -> Self {
        Self {
            state: None,
            blobs: None,
            audit: AuditDispatcher::disabled(),
            limits: MeteringLimits::default(),
            namespace: Namespace::from("tally"),
            mode: AdmissionMode::default(),
            alert_policy: AlertPolicy::default(),
            admission_timeout: DEFAULT_ADMISSION_TIMEOUT,
            clock: Arc::new(SystemClock),
            remote_admission: None,
        }
    }

    #[must_use]
    pub fn state(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state = Some(store);
        self
    }

    #[must_use]
    pub fn blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    #[must_use]
    pub fn audit(mut self, audit: AuditDispatcher) -> Self {
        self.audit = audit;
        self
    }

    #[must_use]
    pub fn limits(mut self, limits: MeteringLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Key namespace for every ledger record.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<Namespace>) -> Self {
        self.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: AdmissionMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn alert_policy(mut self, policy: AlertPolicy) -> Self {
        self.alert_policy = policy;
        self
    }

    #[must_use]
    pub fn admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = timeout;
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Consult `authority` instead of the local gate before transfers.
    ///
    /// The local ledgers are still built and serve status queries.
    #[must_use]
    pub fn remote_admission(mut self, authority: Arc<dyn Admission>) -> Self {
        self.remote_admission = Some(authority);
        self
    }

    pub fn build(self) -> Result<Meter, BuildError> {
        let state = self
            .state
            .ok_or_else(|| BuildError::Configuration("state store is required".into()))?;
        let blobs = self
            .blobs
            .ok_or_else(|| BuildError::Configuration("blob store is required".into()))?;
        self.limits.validate()?;
        self.namespace
            .validate()
            .map_err(|e| BuildError::Configuration(e.to_string()))?;

        let metrics = Arc::new(MeterMetrics::default());
        let ctx = LedgerContext {
            store: state,
            namespace: self.namespace,
            clock: Arc::clone(&self.clock),
            metrics: Arc::clone(&metrics),
        };
        let limits = self.limits;

        let quota = Arc::new(QuotaLedger::new(
            ctx.clone(),
            limits.storage_limit_mb,
            limits.alert_threshold,
        ));
        let bandwidth = Arc::new(BandwidthLedger::new(
            ctx.clone(),
            limits.daily_bandwidth_limit_mb,
        ));
        let alerts = Arc::new(AlertEngine::new(
            ctx,
            Arc::clone(&bandwidth),
            Arc::clone(&quota),
            limits.alert_threshold,
            self.alert_policy,
        ));

        let gate: Arc<dyn Admission> = match self.remote_admission {
            Some(remote) => remote,
            None => Arc::new(
                AdmissionGate::new(
                    Arc::clone(&bandwidth),
                    Arc::clone(&alerts),
                    self.audit.clone(),
                    Arc::clone(&metrics),
                )
                .with_mode(self.mode)
                .with_timeout(self.admission_timeout),
            ),
        };

        let enforcer = Arc::new(QuotaEnforcer::new(
            Arc::clone(&quota),
            Arc::clone(&gate),
            blobs,
            limits.clone(),
            self.mode,
            self.audit.clone(),
            Arc::clone(&metrics),
            self.clock,
        ));

        Ok(Meter {
            quota,
            bandwidth,
            alerts,
            gate,
            enforcer,
            metrics,
            audit: self.audit,
            limits,
        })
    }
}

impl Default for MeterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
