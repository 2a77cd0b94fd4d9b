use std::sync::Arc;
use std::time::Duration;

use tally_audit::AuditDispatcher;
use tally_audit_http::{HttpAuditConfig, HttpAuditSink};
use tally_audit_memory::MemoryAuditSink;

use crate::config::AuditConfig;
use crate::error::ServerError;

/// The audit dispatcher plus, for the memory backend, a handle for queries.
pub struct AuditSetup {
    pub dispatcher: AuditDispatcher,
    pub log: Option<Arc<MemoryAuditSink>>,
}

/// Create the audit pipeline from the given configuration.
pub fn create_audit(config: &AuditConfig) -> Result<AuditSetup, ServerError> {
    if !config.enabled {
        return Ok(AuditSetup {
            dispatcher: AuditDispatcher::disabled(),
            log: None,
        });
    }
    match config.backend.as_str() {
        "memory" => {
            let sink = Arc::new(MemoryAuditSink::new());
            Ok(AuditSetup {
                dispatcher: AuditDispatcher::with_max_in_flight(
                    sink.clone(),
                    config.max_in_flight,
                ),
                log: Some(sink),
            })
        }
        "http" => {
            let url = config.url.as_deref().ok_or_else(|| {
                ServerError::Config("audit http backend requires [audit] url".into())
            })?;
            let http_config = HttpAuditConfig::new(url)
                .with_timeout(Duration::from_secs(config.timeout_seconds));
            let sink = HttpAuditSink::new(&http_config)
                .map_err(|e| ServerError::Config(format!("audit http: {e}")))?;
            Ok(AuditSetup {
                dispatcher: AuditDispatcher::with_max_in_flight(
                    Arc::new(sink),
                    config.max_in_flight,
                ),
                log: None,
            })
        }
        other => Err(ServerError::Config(format!(
            "unknown audit backend: {other}"
        ))),
    }
}
