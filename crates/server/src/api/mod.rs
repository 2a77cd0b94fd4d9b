pub mod audit;
pub mod health;
pub mod storage;
pub mod usage;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tally_audit_memory::MemoryAuditSink;
use tally_core::{BYTES_PER_MB, MeteringLimits};
use tally_gateway::Meter;

use crate::auth::{AuthLayer, TokenVerifier};

/// Extra request body allowance above the per-file ceiling so an oversize
/// upload reaches validation instead of being cut off by the transport.
const BODY_SLACK_BYTES: usize = 1024 * 1024;

/// Shared application state passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub meter: Arc<Meter>,
    /// `None` reads the tenant from the `x-tenant-id` header.
    pub auth: Option<Arc<TokenVerifier>>,
    /// Queryable audit log, present for the in-memory audit backend.
    pub audit_log: Option<Arc<MemoryAuditSink>>,
}

impl AppState {
    pub fn new(meter: Arc<Meter>) -> Self {
        Self {
            meter,
            auth: None,
            audit_log: None,
        }
    }

    #[must_use]
    pub fn with_auth(mut self, verifier: Arc<TokenVerifier>) -> Self {
        self.auth = Some(verifier);
        self
    }

    #[must_use]
    pub fn with_audit_log(mut self, log: Arc<MemoryAuditSink>) -> Self {
        self.audit_log = Some(log);
        self
    }
}

/// Build the Axum router with all API routes and middleware.
pub fn router(state: AppState) -> Router {
    let body_limit = upload_body_limit(state.meter.limits());

    let public = Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics));

    let protected = Router::new()
        .route("/v1/usage/record", post(usage::record))
        .route("/v1/usage/status", get(usage::status))
        .route("/v1/usage/alerts", get(usage::alerts))
        .route("/v1/storage/status", get(storage::status))
        .route("/v1/storage/files", get(storage::list_files))
        .route("/v1/storage/files/{filename}", delete(storage::delete_file))
        .route(
            "/v1/storage/upload/{filename}",
            post(storage::upload).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/v1/storage/download/{filename}", get(storage::download))
        .route("/v1/storage/stream/{filename}", get(storage::stream))
        .route("/v1/audit", get(audit::query_audit))
        .layer(AuthLayer::new(state.auth.clone()));

    public
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn upload_body_limit(limits: &MeteringLimits) -> usize {
    (limits.max_file_size_mb * BYTES_PER_MB).ceil() as usize + BODY_SLACK_BYTES
}
