use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde_json::json;

use super::AppState;

/// `GET /health` -- service status together with a metrics snapshot.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "metrics": state.meter.metrics().snapshot(),
    }))
}

/// `GET /metrics` -- admission, transfer and alert counters.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.meter.metrics().snapshot())
}
