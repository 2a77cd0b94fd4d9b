use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use tokio::sync::Barrier;

use tally_audit::AuditDispatcher;
use tally_audit_memory::MemoryAuditSink;
use tally_blob::MemoryBlobStore;
use tally_core::{
    AdmissionGrant, AdmissionRequest, AlertKind, Direction, FileDescriptor, MeteringError,
    Principal, Resource,
};
use tally_gateway::{
    Admission, AdmissionMode, AlertPolicy, LedgerContext, ManualClock, Meter, MeterMetrics,
    QuotaLedger,
};
use tally_state::{CasResult, KeyKind, StateError, StateKey, StateStore, Versioned};
use tally_state_memory::MemoryStateStore;

/// Memory store that can hold the first `n` versioned reads at a barrier,
/// never answer reads for one record kind, or fail inserts of one kind.
#[derive(Default)]
struct InterceptingStore {
    inner: MemoryStateStore,
    barrier: Option<Barrier>,
    held: AtomicUsize,
    hang_on: Option<KeyKind>,
    fail_inserts: Option<KeyKind>,
    insert_failures: AtomicUsize,
}

impl InterceptingStore {
    /// Hold the first `n` reads until all `n` have arrived.
    fn lockstep(n: usize) -> Self {
        Self {
            barrier: Some(Barrier::new(n)),
            held: AtomicUsize::new(n),
            ..Self::default()
        }
    }

    fn hanging(kind: KeyKind) -> Self {
        Self {
            hang_on: Some(kind),
            ..Self::default()
        }
    }

    /// Fail the next `n` inserts of `kind` with a backend error.
    fn failing_inserts(kind: KeyKind, n: usize) -> Self {
        Self {
            fail_inserts: Some(kind),
            insert_failures: AtomicUsize::new(n),
            ..Self::default()
        }
    }
}

#[async_trait]
impl StateStore for InterceptingStore {
    async fn check_and_set(
        &self,
        key: &StateKey,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StateError> {
        if self.fail_inserts.as_ref() == Some(&key.kind)
            && self
                .insert_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(StateError::Backend("insert rejected".into()));
        }
        self.inner.check_and_set(key, value, ttl).await
    }

    async fn get(&self, key: &StateKey) -> Result<Option<String>, StateError> {
        self.inner.get(key).await
    }

    async fn get_versioned(&self, key: &StateKey) -> Result<Option<Versioned>, StateError> {
        if self.hang_on.as_ref() == Some(&key.kind) {
            std::future::pending::<()>().await;
        }
        if let Some(barrier) = &self.barrier {
            let claimed = self
                .held
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if claimed {
                let snapshot = self.inner.get_versioned(key).await;
                barrier.wait().await;
                return snapshot;
            }
        }
        self.inner.get_versioned(key).await
    }

    async fn set(&self, key: &StateKey, value: &str, ttl: Option<Duration>) -> Result<(), StateError> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &StateKey) -> Result<bool, StateError> {
        self.inner.delete(key).await
    }

    async fn increment(
        &self,
        key: &StateKey,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StateError> {
        self.inner.increment(key, delta, ttl).await
    }

    async fn compare_and_swap(
        &self,
        key: &StateKey,
        expected_version: u64,
        new_value: &str,
        ttl: Option<Duration>,
    ) -> Result<CasResult, StateError> {
        self.inner
            .compare_and_swap(key, expected_version, new_value, ttl)
            .await
    }

    async fn scan_keys(
        &self,
        namespace: &str,
        tenant: &str,
        kind: KeyKind,
        prefix: Option<&str>,
    ) -> Result<Vec<(String, String)>, StateError> {
        self.inner.scan_keys(namespace, tenant, kind, prefix).await
    }
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 7, 4, 15, 0, 0).unwrap(),
    ))
}

fn meter_on(store: Arc<dyn StateStore>, mode: AdmissionMode) -> Meter {
    Meter::builder()
        .state(store)
        .blobs(Arc::new(MemoryBlobStore::new()))
        .clock(clock())
        .mode(mode)
        .build()
        .unwrap()
}

fn mb(n: usize) -> Bytes {
    Bytes::from(vec![1u8; n * 1024 * 1024])
}

fn request(volume_mb: f64) -> AdmissionRequest {
    AdmissionRequest::new(volume_mb, Direction::Upload)
}

#[tokio::test]
async fn approaching_alert_fires_at_eighty_five() {
    let meter = meter_on(Arc::new(MemoryStateStore::new()), AdmissionMode::Atomic);
    let p = Principal::new("alice");

    let first = meter.gate().authorize(&p, &request(75.0)).await.unwrap();
    assert_eq!(first.alert, None);
    let second = meter.gate().authorize(&p, &request(10.0)).await.unwrap();
    assert!((second.current_usage_mb - 85.0).abs() < 1e-9);
    assert_eq!(second.alert, Some(AlertKind::ApproachingLimit));

    let alerts = meter.alerts().list(&p.tenant, Some(second.date)).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_kind, AlertKind::ApproachingLimit);
}

#[tokio::test]
async fn failed_alert_write_does_not_silence_the_alert() {
    let store = Arc::new(InterceptingStore::failing_inserts(KeyKind::Alert, 1));
    let meter = meter_on(store, AdmissionMode::Atomic);
    let p = Principal::new("alice");
    meter.bandwidth().record(&p.tenant, 85.0, Direction::Upload).await.unwrap();
    let today = meter.bandwidth().today();

    let err = meter.alerts().evaluate(&p.tenant, today).await.unwrap_err();
    assert!(matches!(err, MeteringError::UpstreamUnavailable(_)));
    assert!(meter.alerts().list(&p.tenant, None).await.unwrap().is_empty());

    let kind = meter.alerts().evaluate(&p.tenant, today).await.unwrap();
    assert_eq!(kind, Some(AlertKind::ApproachingLimit));
    let alerts = meter.alerts().list(&p.tenant, Some(today)).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].alert_kind, AlertKind::ApproachingLimit);
    assert_eq!(meter.metrics().snapshot().alerts_emitted, 1);
}

#[tokio::test]
async fn colliding_tenant_ids_never_reach_the_store() {
    let meter = meter_on(Arc::new(MemoryStateStore::new()), AdmissionMode::Atomic);
    let alice = Principal::new("alice");
    meter.gate().authorize(&alice, &request(85.0)).await.unwrap();

    let intruder = Principal::new("alice:alert:x");
    let err = meter.gate().authorize(&intruder, &request(1.0)).await.unwrap_err();
    assert!(matches!(err, MeteringError::ValidationFailed(_)));
    let err = meter.alerts().list(&intruder.tenant, None).await.unwrap_err();
    assert!(matches!(err, MeteringError::ValidationFailed(_)));

    let alerts = meter.alerts().list(&alice.tenant, None).await.unwrap();
    assert_eq!(alerts.len(), 1);
    assert!(alerts.iter().all(|a| a.tenant_id == alice.tenant));
}

#[tokio::test]
async fn every_evaluation_policy_repeats_alerts() {
    let meter = Meter::builder()
        .state(Arc::new(MemoryStateStore::new()))
        .blobs(Arc::new(MemoryBlobStore::new()))
        .alert_policy(AlertPolicy::EveryEvaluation)
        .build()
        .unwrap();
    let p = Principal::new("alice");
    meter.gate().authorize(&p, &request(81.0)).await.unwrap();
    meter.gate().authorize(&p, &request(1.0)).await.unwrap();
    meter.gate().authorize(&p, &request(1.0)).await.unwrap();
    assert_eq!(meter.alerts().list(&p.tenant, None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn check_then_record_overruns_by_the_volume_in_flight() {
    let store = Arc::new(InterceptingStore::lockstep(2));
    let meter = meter_on(store, AdmissionMode::CheckThenRecord);
    let p = Principal::new("alice");

    let (first, second) = (request(60.0), request(45.0));
    let (a, b) = tokio::join!(
        meter.gate().authorize(&p, &first),
        meter.gate().authorize(&p, &second),
    );
    a.unwrap();
    b.unwrap();

    let status = meter.bandwidth().status(&p.tenant).await.unwrap();
    assert!((status.total_mb - 105.0).abs() < 1e-9);
    assert!(status.remaining_mb.abs() < f64::EPSILON);
}

#[tokio::test]
async fn atomic_mode_denies_exactly_one_racer() {
    let store = Arc::new(InterceptingStore::lockstep(2));
    let meter = meter_on(store, AdmissionMode::Atomic);
    let p = Principal::new("alice");

    let (first, second) = (request(60.0), request(45.0));
    let (a, b) = tokio::join!(
        meter.gate().authorize(&p, &first),
        meter.gate().authorize(&p, &second),
    );
    let outcomes = [a, b];
    let denied: Vec<&MeteringError> = outcomes.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(denied.len(), 1);
    assert!(matches!(
        denied[0],
        MeteringError::CapacityExceeded {
            resource: Resource::Bandwidth,
            ..
        }
    ));

    let status = meter.bandwidth().status(&p.tenant).await.unwrap();
    assert!(status.total_mb <= 100.0);
    assert_eq!(meter.metrics().snapshot().admissions_denied, 1);
}

#[tokio::test(start_paused = true)]
async fn slow_ledger_fails_closed() {
    let store = Arc::new(InterceptingStore::hanging(KeyKind::DailyUsage));
    let blobs = Arc::new(MemoryBlobStore::new());
    let meter = Meter::builder()
        .state(store)
        .blobs(blobs.clone())
        .admission_timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let p = Principal::new("alice");

    let err = meter.gate().authorize(&p, &request(1.0)).await.unwrap_err();
    assert!(matches!(err, MeteringError::UpstreamUnavailable(_)));

    let err = meter.enforcer().upload(&p, "a.mp4", mb(1)).await.unwrap_err();
    assert!(err.is_transient());
    assert!(blobs.is_empty(), "no bytes move without admission");
    assert!(meter.quota().list_files(&p.tenant).await.unwrap().is_empty());
    assert_eq!(meter.metrics().snapshot().admission_errors, 2);
}

/// Admits every request, but lets a competing upload land in the quota
/// ledger first.
struct RacingAuthority {
    quota: QuotaLedger,
    racer: FileDescriptor,
}

#[async_trait]
impl Admission for RacingAuthority {
    async fn authorize(
        &self,
        principal: &Principal,
        request: &AdmissionRequest,
    ) -> Result<AdmissionGrant, MeteringError> {
        self.quota
            .commit_add(&principal.tenant, self.racer.clone())
            .await?;
        Ok(AdmissionGrant {
            message: "ok".into(),
            tenant_id: principal.tenant.clone(),
            date: Utc::now().date_naive(),
            operation_type: request.operation_type,
            volume_mb: request.volume_mb,
            current_usage_mb: request.volume_mb,
            remaining_mb: 100.0,
            alert: None,
        })
    }
}

#[tokio::test]
async fn lost_commit_race_removes_the_stored_blob() {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let racing_ledger = QuotaLedger::new(
        LedgerContext {
            store: Arc::clone(&store),
            namespace: "tally".into(),
            clock: clock(),
            metrics: Arc::new(MeterMetrics::default()),
        },
        50.0,
        0.8,
    );
    let authority = Arc::new(RacingAuthority {
        quota: racing_ledger,
        racer: FileDescriptor {
            name: "other.mp4".into(),
            size_mb: 30.0,
            uploaded_at: Utc::now(),
            content_type: "video/mp4".into(),
            blob_reference: "tenants/alice/0_other.mp4".into(),
        },
    });
    let meter = Meter::builder()
        .state(store)
        .blobs(blobs.clone())
        .clock(clock())
        .remote_admission(authority)
        .build()
        .unwrap();
    let p = Principal::new("alice");

    let err = meter.enforcer().upload(&p, "mine.mp4", mb(24)).await.unwrap_err();
    assert!(matches!(
        err,
        MeteringError::CapacityExceeded {
            resource: Resource::Storage,
            ..
        }
    ));
    assert!(blobs.is_empty());

    let status = meter.enforcer().status(&p.tenant).await.unwrap();
    assert_eq!(status.files.len(), 1);
    assert!((status.consumed_mb - 30.0).abs() < 1e-9);
    assert_eq!(meter.metrics().snapshot().uploads_rejected, 1);
}

#[tokio::test]
async fn downloads_draw_on_the_daily_cap() {
    let meter = meter_on(Arc::new(MemoryStateStore::new()), AdmissionMode::Atomic);
    let p = Principal::new("alice");
    let enforcer = meter.enforcer();

    enforcer.upload(&p, "a.mp4", mb(24)).await.unwrap();
    enforcer.upload(&p, "b.mp4", mb(24)).await.unwrap();
    enforcer.download(&p, "a.mp4").await.unwrap();
    enforcer.download(&p, "b.mp4").await.unwrap();

    let err = enforcer.download(&p, "a.mp4").await.unwrap_err();
    assert!(matches!(
        err,
        MeteringError::CapacityExceeded {
            resource: Resource::Bandwidth,
            ..
        }
    ));

    let usage = meter.bandwidth().status(&p.tenant).await.unwrap();
    assert!((usage.upload_mb - 48.0).abs() < 1e-9);
    assert!((usage.download_mb - 48.0).abs() < 1e-9);
    let alerts = meter.alerts().list(&p.tenant, None).await.unwrap();
    assert_eq!(alerts[0].alert_kind, AlertKind::ApproachingLimit);
}

#[tokio::test]
async fn add_then_remove_restores_the_ledger_exactly() {
    let meter = meter_on(Arc::new(MemoryStateStore::new()), AdmissionMode::Atomic);
    let p = Principal::new("alice");
    let enforcer = meter.enforcer();

    enforcer
        .upload(&p, "base.mp4", Bytes::from(vec![0u8; 1_234_567]))
        .await
        .unwrap();
    let before = enforcer.status(&p.tenant).await.unwrap();

    enforcer
        .upload(&p, "extra.avi", Bytes::from(vec![0u8; 7_654_321]))
        .await
        .unwrap();
    enforcer.delete(&p.tenant, "extra.avi").await.unwrap();

    let after = enforcer.status(&p.tenant).await.unwrap();
    assert_eq!(after.consumed_mb.to_bits(), before.consumed_mb.to_bits());
    assert_eq!(after.files, before.files);
}

#[tokio::test]
async fn operations_are_audited() {
    let sink = Arc::new(MemoryAuditSink::new());
    let audit = AuditDispatcher::new(sink.clone());
    let meter = Meter::builder()
        .state(Arc::new(MemoryStateStore::new()))
        .blobs(Arc::new(MemoryBlobStore::new()))
        .audit(audit.clone())
        .build()
        .unwrap();
    let p = Principal::new("alice");

    meter.enforcer().upload(&p, "a.mp4", mb(1)).await.unwrap();
    meter.enforcer().delete(&p.tenant, "missing.mp4").await.unwrap_err();
    assert!(audit.shutdown(Duration::from_secs(5)).await);

    let events = sink.query(&tally_audit::AuditQuery::default());
    let components: Vec<&str> = events.iter().map(|e| e.component.as_str()).collect();
    assert!(components.contains(&"admission"));
    assert!(components.contains(&"storage"));
    assert!(
        events
            .iter()
            .any(|e| e.level == tally_audit::AuditLevel::Warn && e.message.contains("missing.mp4"))
    );
}
