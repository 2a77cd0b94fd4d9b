mod sink;

pub use sink::{HttpAuditConfig, HttpAuditSink};
