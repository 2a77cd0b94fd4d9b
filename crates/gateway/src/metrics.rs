use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters tracking metering outcomes.
///
/// All counters use relaxed ordering. For a point-in-time view, call
/// [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct MeterMetrics {
    /// Admission requests granted.
    pub admissions_allowed: AtomicU64,
    /// Admission requests denied for capacity or validation reasons.
    pub admissions_denied: AtomicU64,
    /// Admission requests that failed on infrastructure (fail closed).
    pub admission_errors: AtomicU64,
    /// Uploads committed to the quota ledger.
    pub uploads_committed: AtomicU64,
    /// Uploads rejected at any stage.
    pub uploads_rejected: AtomicU64,
    pub downloads: AtomicU64,
    pub deletions: AtomicU64,
    /// Alert records appended to the log.
    pub alerts_emitted: AtomicU64,
    /// Threshold signals that did not append because the kind was already recorded.
    pub alerts_suppressed: AtomicU64,
    /// Optimistic update conflicts that forced a retry.
    pub cas_retries: AtomicU64,
}

macro_rules! counter {
    ($($method:ident => $field:ident),* $(,)?) => {
        $(
            pub fn $method(&self) {
                self.$field.fetch_add(1, Ordering::Relaxed);
            }
        )*
    };
}

impl MeterMetrics {
    counter! {
        increment_admissions_allowed => admissions_allowed,
        increment_admissions_denied => admissions_denied,
        increment_admission_errors => admission_errors,
        increment_uploads_committed => uploads_committed,
        increment_uploads_rejected => uploads_rejected,
        increment_downloads => downloads,
        increment_deletions => deletions,
        increment_alerts_emitted => alerts_emitted,
        increment_alerts_suppressed => alerts_suppressed,
        increment_cas_retries => cas_retries,
    }

    /// Take a point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            admissions_allowed: self.admissions_allowed.load(Ordering::Relaxed),
            admissions_denied: self.admissions_denied.load(Ordering::Relaxed),
            admission_errors: self.admission_errors.load(Ordering::Relaxed),
            uploads_committed: self.uploads_committed.load(Ordering::Relaxed),
            uploads_rejected: self.uploads_rejected.load(Ordering::Relaxed),
            downloads: self.downloads.load(Ordering::Relaxed),
            deletions: self.deletions.load(Ordering::Relaxed),
            alerts_emitted: self.alerts_emitted.load(Ordering::Relaxed),
            alerts_suppressed: self.alerts_suppressed.load(Ordering::Relaxed),
            cas_retries: self.cas_retries.load(Ordering::Relaxed),
        }
    }
}

/// A plain data snapshot of [`MeterMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub admissions_allowed: u64,
    pub admissions_denied: u64,
    pub admission_errors: u64,
    pub uploads_committed: u64,
    pub uploads_rejected: u64,
    pub downloads: u64,
    pub deletions: u64,
    pub alerts_emitted: u64,
    pub alerts_suppressed: u64,
    pub cas_retries: u64,
}
