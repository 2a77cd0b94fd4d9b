use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::Deserialize;

use tally_core::{AdmissionGrant, AdmissionRequest, AlertRecord, MeteringError, Principal, UsageStatus};
use tally_gateway::Admission;

use super::AppState;
use crate::error::ServerError;

/// `POST /v1/usage/record` -- admit and charge a transfer against today's cap.
pub async fn record(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<AdmissionRequest>, JsonRejection>,
) -> Result<Json<AdmissionGrant>, ServerError> {
    let Json(request) =
        payload.map_err(|e| MeteringError::ValidationFailed(e.body_text()))?;
    let grant = state.meter.gate().authorize(&principal, &request).await?;
    Ok(Json(grant))
}

/// `GET /v1/usage/status` -- today's transfer totals for the caller.
pub async fn status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<UsageStatus>, ServerError> {
    Ok(Json(state.meter.bandwidth().status(&principal.tenant).await?))
}

#[derive(Debug, Deserialize)]
pub struct AlertParams {
    /// Restrict to one UTC day (`YYYY-MM-DD`).
    pub date: Option<NaiveDate>,
}

/// `GET /v1/usage/alerts` -- recent alerts, most recent first.
pub async fn alerts(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<AlertParams>,
) -> Result<Json<Vec<AlertRecord>>, ServerError> {
    let alerts = state
        .meter
        .alerts()
        .list(&principal.tenant, params.date)
        .await?;
    Ok(Json(alerts))
}
