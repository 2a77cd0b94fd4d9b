use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use tally_core::TenantId;

use crate::record::{AuditEvent, AuditLevel};
use crate::sink::AuditSink;

/// Deliveries allowed in flight at once unless configured otherwise.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 1024;

/// Fire-and-forget front for an [`AuditSink`].
///
/// `record` spawns delivery onto a [`TaskTracker`] and returns immediately.
/// At most `max_in_flight` deliveries run at once; events arriving while
/// the sink is saturated are dropped and counted. Delivery failures are
/// logged and dropped. Cloning is cheap and clones share the same tracker
/// and permits.
#[derive(Clone)]
pub struct AuditDispatcher {
    sink: Option<Arc<dyn AuditSink>>,
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    dropped: Arc<AtomicU64>,
}

impl std::fmt::Debug for AuditDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditDispatcher")
            .field("enabled", &self.sink.is_some())
            .field("in_flight", &self.tracker.len())
            .finish()
    }
}

impl AuditDispatcher {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self::with_max_in_flight(sink, DEFAULT_MAX_IN_FLIGHT)
    }

    pub fn with_max_in_flight(sink: Arc<dyn AuditSink>, max_in_flight: usize) -> Self {
        Self {
            sink: Some(sink),
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(max_in_flight)),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A dispatcher that drops every event.
    pub fn disabled() -> Self {
        Self {
            sink: None,
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Deliveries currently running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Events discarded because the sink was saturated.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queue an event for delivery without waiting for it.
    pub fn record(
        &self,
        tenant: &TenantId,
        component: &str,
        level: AuditLevel,
        message: impl Into<String>,
    ) {
        let Some(sink) = self.sink.clone() else {
            return;
        };
        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(tenant = %tenant, component, dropped, "audit sink saturated, event dropped");
            return;
        };
        let event = AuditEvent::new(tenant.clone(), component, level, message);
        self.tracker.spawn(async move {
            let _permit = permit;
            let id = event.id.clone();
            if let Err(e) = sink.record(event).await {
                warn!(error = %e, audit_id = %id, "audit recording failed");
            }
        });
    }

    /// Close the tracker and wait for in-flight deliveries.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tracker.close();
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok() {
            info!("audit dispatcher drained");
            true
        } else {
            warn!(pending = self.tracker.len(), "audit dispatcher drain timed out");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;
    use crate::error::AuditError;

    #[derive(Default)]
    struct Counting {
        delivered: AtomicUsize,
    }

    #[async_trait]
    impl AuditSink for Counting {
        async fn record(&self, _event: AuditEvent) -> Result<(), AuditError> {
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl AuditSink for Failing {
        async fn record(&self, _event: AuditEvent) -> Result<(), AuditError> {
            Err(AuditError::Delivery("log service down".into()))
        }
    }

    struct Stuck;

    #[async_trait]
    impl AuditSink for Stuck {
        async fn record(&self, _event: AuditEvent) -> Result<(), AuditError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn delivers_and_drains() {
        let sink = Arc::new(Counting::default());
        let dispatcher = AuditDispatcher::new(sink.clone());
        let tenant = TenantId::from("alice");
        for i in 0..5 {
            dispatcher.record(&tenant, "admission", AuditLevel::Info, format!("event {i}"));
        }
        assert!(dispatcher.shutdown(Duration::from_secs(1)).await);
        assert_eq!(sink.delivered.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let dispatcher = AuditDispatcher::new(Arc::new(Failing));
        dispatcher.record(&TenantId::from("t"), "storage", AuditLevel::Error, "boom");
        assert!(dispatcher.shutdown(Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_is_bounded() {
        let dispatcher = AuditDispatcher::new(Arc::new(Stuck));
        dispatcher.record(&TenantId::from("t"), "storage", AuditLevel::Info, "hang");
        assert!(!dispatcher.shutdown(Duration::from_millis(100)).await);
    }

    #[tokio::test]
    async fn saturated_sink_sheds_events_instead_of_queueing() {
        let dispatcher = AuditDispatcher::with_max_in_flight(Arc::new(Stuck), 2);
        let tenant = TenantId::from("t");
        for i in 0..10 {
            dispatcher.record(&tenant, "admission", AuditLevel::Info, format!("event {i}"));
        }
        assert_eq!(dispatcher.in_flight(), 2);
        assert_eq!(dispatcher.dropped(), 8);
    }

    #[tokio::test]
    async fn permits_return_once_delivered() {
        let sink = Arc::new(Counting::default());
        let dispatcher = AuditDispatcher::with_max_in_flight(sink.clone(), 1);
        let tenant = TenantId::from("t");
        for i in 0..3 {
            dispatcher.record(&tenant, "storage", AuditLevel::Info, format!("event {i}"));
            while dispatcher.in_flight() > 0 {
                tokio::task::yield_now().await;
            }
        }
        assert!(dispatcher.shutdown(Duration::from_secs(1)).await);
        assert_eq!(sink.delivered.load(Ordering::SeqCst), 3);
        assert_eq!(dispatcher.dropped(), 0);
    }

    #[tokio::test]
    async fn disabled_drops_events() {
        let dispatcher = AuditDispatcher::disabled();
        assert!(!dispatcher.is_enabled());
        dispatcher.record(&TenantId::from("t"), "storage", AuditLevel::Info, "ignored");
        assert!(dispatcher.shutdown(Duration::from_millis(10)).await);
    }
}
