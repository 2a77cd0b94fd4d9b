use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use tally_audit::error::AuditError;
use tally_audit::record::AuditEvent;
use tally_audit::sink::AuditSink;

/// Connection settings for [`HttpAuditSink`].
#[derive(Debug, Clone)]
pub struct HttpAuditConfig {
    /// Base URL of the log service; events are POSTed to `{url}/log/`.
    pub url: String,
    pub timeout: Duration,
}

impl HttpAuditConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(2),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Wire shape expected by the log service.
#[derive(Debug, Serialize)]
struct LogEntry<'a> {
    username: &'a str,
    service_name: &'a str,
    log_level: String,
    message: &'a str,
    timestamp: String,
}

impl<'a> From<&'a AuditEvent> for LogEntry<'a> {
    fn from(event: &'a AuditEvent) -> Self {
        Self {
            username: event.tenant_id.as_str(),
            service_name: &event.component,
            log_level: event.level.to_string(),
            message: &event.message,
            timestamp: event.timestamp.to_rfc3339(),
        }
    }
}

/// Audit sink that forwards each event to a remote log service over HTTP.
pub struct HttpAuditSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAuditSink {
    pub fn new(config: &HttpAuditConfig) -> Result<Self, AuditError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AuditError::Delivery(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/log/", config.url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl AuditSink for HttpAuditSink {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&LogEntry::from(&event))
            .send()
            .await
            .map_err(|e| AuditError::Delivery(e.to_string()))?;

        if resp.status().is_success() {
            tracing::debug!(id = %event.id, "audit event forwarded");
            Ok(())
        } else {
            Err(AuditError::Delivery(format!(
                "log service responded with {}",
                resp.status()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use tally_audit::record::AuditLevel;
    use tally_core::TenantId;
    use tokio::sync::Mutex;

    use super::*;

    type Seen = Arc<Mutex<Vec<serde_json::Value>>>;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn posts_log_entry_shape() {
        let seen: Seen = Arc::default();
        let router = Router::new()
            .route(
                "/log/",
                post(|State(seen): State<Seen>, Json(body): Json<serde_json::Value>| async move {
                    seen.lock().await.push(body);
                    StatusCode::OK
                }),
            )
            .with_state(Arc::clone(&seen));
        let url = serve(router).await;

        let sink = HttpAuditSink::new(&HttpAuditConfig::new(url)).unwrap();
        let event = AuditEvent::new(
            TenantId::from("alice"),
            "storage",
            AuditLevel::Warn,
            "quota at 82%",
        );
        sink.record(event).await.unwrap();

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["username"], "alice");
        assert_eq!(seen[0]["service_name"], "storage");
        assert_eq!(seen[0]["log_level"], "WARN");
        assert_eq!(seen[0]["message"], "quota at 82%");
    }

    #[tokio::test]
    async fn non_success_is_delivery_error() {
        let router = Router::new().route("/log/", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
        let url = serve(router).await;

        let sink = HttpAuditSink::new(&HttpAuditConfig::new(url)).unwrap();
        let event = AuditEvent::new(TenantId::from("a"), "storage", AuditLevel::Info, "x");
        assert!(matches!(
            sink.record(event).await,
            Err(AuditError::Delivery(_))
        ));
    }
}
