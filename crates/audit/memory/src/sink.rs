use async_trait::async_trait;
use parking_lot::RwLock;

use tally_audit::error::AuditError;
use tally_audit::record::{AuditEvent, AuditQuery};
use tally_audit::sink::AuditSink;

/// In-memory audit sink. Suitable for development and testing.
///
/// Events are kept in arrival order; when `capacity` is reached the oldest
/// event is dropped.
pub struct MemoryAuditSink {
    events: RwLock<Vec<AuditEvent>>,
    capacity: usize,
}

impl MemoryAuditSink {
    pub const DEFAULT_CAPACITY: usize = 10_000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Matching events, most recent first, capped at the query's limit.
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEvent> {
        let limit = query.effective_limit() as usize;
        self.events
            .read()
            .iter()
            .rev()
            .filter(|e| query.matches(e))
            .take(limit)
            .cloned()
            .collect()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut events = self.events.write();
        if events.len() >= self.capacity {
            events.remove(0);
        }
        events.push(event);
        Ok(())
    }
}
