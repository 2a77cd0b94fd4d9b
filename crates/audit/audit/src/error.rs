/// Errors that can occur while delivering audit events.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// An error from the underlying storage backend.
    #[error("storage error: {0}")]
    Storage(String),

    /// The remote sink could not be reached or rejected the event.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}
