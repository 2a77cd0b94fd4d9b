use async_trait::async_trait;

use crate::error::AuditError;
use crate::record::AuditEvent;

/// Destination for audit events.
///
/// Implementations must be `Send + Sync` to be shared across async tasks.
/// Delivery is best effort; callers go through
/// [`AuditDispatcher`](crate::AuditDispatcher), which never waits on a sink.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist or forward one event.
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}
