use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::Deserialize;

use tally_audit::{AuditEvent, AuditLevel, AuditQuery};
use tally_core::{MeteringError, Principal};

use super::AppState;
use crate::error::ServerError;

#[derive(Debug, Deserialize)]
pub struct AuditParams {
    pub component: Option<String>,
    pub level: Option<AuditLevel>,
    /// Default 20, at most 1000.
    pub limit: Option<u32>,
}

/// `GET /v1/audit` -- the caller's own audit trail, most recent first.
pub async fn query_audit(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<AuditParams>,
) -> Result<Json<Vec<AuditEvent>>, ServerError> {
    let Some(log) = state.audit_log.as_ref() else {
        return Err(MeteringError::NotFound("audit log is not enabled".into()).into());
    };
    let query = AuditQuery {
        tenant: Some(principal.tenant.to_string()),
        component: params.component,
        level: params.level,
        limit: params.limit,
    };
    Ok(Json(log.query(&query)))
}
