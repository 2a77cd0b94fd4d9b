pub mod dispatcher;
pub mod error;
pub mod record;
pub mod sink;

pub use dispatcher::{AuditDispatcher, DEFAULT_MAX_IN_FLIGHT};
pub use error::AuditError;
pub use record::{AuditEvent, AuditLevel, AuditQuery};
pub use sink::AuditSink;
