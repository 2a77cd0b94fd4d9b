use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use tally_core::{AlertKind, AlertRecord, MeteringError, TenantId};
use tally_state::{CasResult, KeyKind, StateKey};

use crate::ledger::{BandwidthLedger, LedgerContext, QuotaLedger};
use crate::records;

/// Maximum number of alert records returned by a query.
pub const ALERT_QUERY_LIMIT: usize = 100;

/// When an evaluation that signals a threshold appends to the alert log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPolicy {
    /// Append only when the signalled kind escalates for the tenant/day
    /// (nothing, then approaching, then exceeded).
    #[default]
    OnTransition,
    /// Append on every qualifying evaluation.
    EveryEvaluation,
}

/// A marker write that may need undoing.
struct RaisedMarker {
    key: StateKey,
    previous: Option<AlertKind>,
    version: u64,
}

fn encode_marker(marker: Option<AlertKind>) -> Result<String, MeteringError> {
    serde_json::to_string(&marker).map_err(|e| MeteringError::Unexpected(e.to_string()))
}

/// Evaluates ledger state against thresholds and keeps the alert log.
pub struct AlertEngine {
    ctx: LedgerContext,
    bandwidth: Arc<BandwidthLedger>,
    quota: Arc<QuotaLedger>,
    threshold: f64,
    policy: AlertPolicy,
}

impl AlertEngine {
    pub fn new(
        ctx: LedgerContext,
        bandwidth: Arc<BandwidthLedger>,
        quota: Arc<QuotaLedger>,
        threshold: f64,
        policy: AlertPolicy,
    ) -> Self {
        Self {
            ctx,
            bandwidth,
            quota,
            threshold,
            policy,
        }
    }

    pub fn policy(&self) -> AlertPolicy {
        self.policy
    }

    /// Classify the tenant's bandwidth for `day` and append an alert if due.
    ///
    /// Returns the signalled kind whether or not a record was appended.
    #[instrument(name = "alerts.evaluate", skip_all, fields(tenant = %tenant, %day))]
    pub async fn evaluate(
        &self,
        tenant: &TenantId,
        day: NaiveDate,
    ) -> Result<Option<AlertKind>, MeteringError> {
        let limit = self.bandwidth.daily_limit_mb();
        let record = self.bandwidth.get_or_create(tenant, day).await?;
        let Some(kind) = AlertKind::classify(record.total_mb, limit, self.threshold) else {
            return Ok(None);
        };

        let raised = match self.policy {
            AlertPolicy::EveryEvaluation => None,
            AlertPolicy::OnTransition => match self.escalate(tenant, day, kind).await? {
                Some(raised) => Some(raised),
                None => {
                    self.ctx.metrics.increment_alerts_suppressed();
                    return Ok(Some(kind));
                }
            },
        };

        let threshold_mb = match kind {
            AlertKind::LimitExceeded => limit,
            AlertKind::ApproachingLimit => limit * self.threshold,
        };
        let alert = AlertRecord {
            tenant_id: tenant.clone(),
            day,
            alert_kind: kind,
            threshold_mb,
            observed_mb: record.total_mb,
            created_at: self.ctx.clock.now(),
        };
        if let Err(err) = self.append(&alert).await {
            // A raised marker with no record behind it would silence this
            // kind for the rest of the day.
            if let Some(raised) = raised {
                self.restore(raised).await;
            }
            return Err(err);
        }
        self.ctx.metrics.increment_alerts_emitted();
        info!(kind = %kind, observed_mb = record.total_mb, "bandwidth alert emitted");
        Ok(Some(kind))
    }

    /// Raise the tenant/day marker to `kind`. Returns `None` if it was
    /// already at or above `kind`.
    async fn escalate(
        &self,
        tenant: &TenantId,
        day: NaiveDate,
        kind: AlertKind,
    ) -> Result<Option<RaisedMarker>, MeteringError> {
        let key = self.ctx.key(tenant, KeyKind::AlertMarker, day.to_string())?;
        let store = self.ctx.store.as_ref();
        let encoded = encode_marker(Some(kind))?;
        for _ in 0..records::MAX_CAS_ATTEMPTS {
            let (previous, version) = match records::load::<Option<AlertKind>>(store, &key).await? {
                Some((marker, version)) => (marker, version),
                None => (None, 0),
            };
            if previous.is_some_and(|marker| marker >= kind) {
                return Ok(None);
            }
            match store.compare_and_swap(&key, version, &encoded, None).await? {
                CasResult::Ok => {
                    return Ok(Some(RaisedMarker {
                        key,
                        previous,
                        version: version + 1,
                    }));
                }
                CasResult::Conflict { .. } => {
                    self.ctx.metrics.increment_cas_retries();
                    tokio::task::yield_now().await;
                }
            }
        }
        Err(MeteringError::Unexpected(format!(
            "alert marker {key} abandoned after {} conflicting attempts",
            records::MAX_CAS_ATTEMPTS
        )))
    }

    /// Put a marker back to what it was before [`escalate`](Self::escalate)
    /// raised it, unless another evaluation has moved it since.
    async fn restore(&self, raised: RaisedMarker) {
        let Ok(encoded) = encode_marker(raised.previous) else {
            return;
        };
        match self
            .ctx
            .store
            .compare_and_swap(&raised.key, raised.version, &encoded, None)
            .await
        {
            Ok(CasResult::Ok) => debug!(key = %raised.key, "alert marker restored"),
            Ok(CasResult::Conflict { .. }) => {}
            Err(e) => warn!(key = %raised.key, error = %e, "failed to restore alert marker"),
        }
    }

    async fn append(&self, alert: &AlertRecord) -> Result<(), MeteringError> {
        let id = format!(
            "{}:{:013}:{}",
            alert.day,
            alert.created_at.timestamp_millis(),
            uuid::Uuid::new_v4().simple()
        );
        let key = self.ctx.key(&alert.tenant_id, KeyKind::Alert, id)?;
        let encoded =
            serde_json::to_string(alert).map_err(|e| MeteringError::Unexpected(e.to_string()))?;
        self.ctx.store.check_and_set(&key, &encoded, None).await?;
        Ok(())
    }

    /// Alerts for `tenant`, optionally for one day, most recent first.
    pub async fn list(
        &self,
        tenant: &TenantId,
        day: Option<NaiveDate>,
    ) -> Result<Vec<AlertRecord>, MeteringError> {
        tenant.validate()?;
        let prefix = day.map(|d| format!("{d}:"));
        let entries = self
            .ctx
            .store
            .scan_keys(
                self.ctx.namespace.as_str(),
                tenant.as_str(),
                KeyKind::Alert,
                prefix.as_deref(),
            )
            .await?;

        let mut alerts = Vec::with_capacity(entries.len());
        for (key, raw) in entries {
            let alert: AlertRecord = serde_json::from_str(&raw)
                .map_err(|e| MeteringError::Unexpected(format!("corrupt alert at {key}: {e}")))?;
            if alert.tenant_id == *tenant {
                alerts.push((key, alert));
            }
        }
        alerts.sort_by(|(ka, a), (kb, b)| b.created_at.cmp(&a.created_at).then_with(|| kb.cmp(ka)));
        Ok(alerts
            .into_iter()
            .take(ALERT_QUERY_LIMIT)
            .map(|(_, alert)| alert)
            .collect())
    }

    /// On-demand storage check: the kind the tenant's storage currently signals.
    pub async fn evaluate_storage(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<AlertKind>, MeteringError> {
        let record = self.quota.get_or_create(tenant).await?;
        Ok(AlertKind::classify(
            record.consumed_mb,
            self.quota.limit_mb(),
            self.threshold,
        ))
    }
}
