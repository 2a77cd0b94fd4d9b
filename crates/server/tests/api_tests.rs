use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use tally_blob::MemoryBlobStore;
use tally_core::{BYTES_PER_MB, MeteringLimits};
use tally_gateway::Meter;
use tally_server::api::{self, AppState};
use tally_server::bootstrap::build_state;
use tally_server::config::TallyConfig;
use tally_state_memory::MemoryStateStore;

// -- Helpers --------------------------------------------------------------

fn small_limits() -> MeteringLimits {
    MeteringLimits {
        storage_limit_mb: 1.0,
        max_file_size_mb: 0.5,
        daily_bandwidth_limit_mb: 1.0,
        alert_threshold: 0.8,
        ..MeteringLimits::default()
    }
}

fn build_app(limits: MeteringLimits) -> Router {
    let meter = Meter::builder()
        .state(Arc::new(MemoryStateStore::new()))
        .blobs(Arc::new(MemoryBlobStore::new()))
        .limits(limits)
        .build()
        .expect("meter should build");
    api::router(AppState::new(Arc::new(meter)))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn payload(mb: f64) -> Vec<u8> {
    vec![7u8; (mb * BYTES_PER_MB) as usize]
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    tenant: Option<&str>,
    body: Body,
) -> (StatusCode, Bytes) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(tenant) = tenant {
        builder = builder.header("x-tenant-id", tenant);
    }
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes)
}

async fn call_json(
    app: &Router,
    method: Method,
    uri: &str,
    tenant: Option<&str>,
    body: Body,
) -> (StatusCode, Value) {
    let (status, bytes) = call(app, method, uri, tenant, body).await;
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn json_body(value: &Value) -> Body {
    Body::from(serde_json::to_vec(value).unwrap())
}

async fn record(app: &Router, tenant: &str, volume_mb: f64) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/usage/record")
        .header("x-tenant-id", tenant)
        .header(header::CONTENT_TYPE, "application/json")
        .body(json_body(&json!({ "volume_mb": volume_mb, "operation_type": "download" })))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// -- Health ---------------------------------------------------------------

#[tokio::test]
async fn health_is_public_and_reports_metrics() {
    let app = build_app(small_limits());
    let (status, body) = call_json(&app, Method::GET, "/health", None, Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["metrics"]["admissions_allowed"], 0);

    let (status, body) = call_json(&app, Method::GET, "/metrics", None, Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uploads_committed"], 0);
}

#[tokio::test]
async fn metered_routes_need_a_tenant() {
    let app = build_app(small_limits());
    let (status, body) =
        call_json(&app, Method::GET, "/v1/usage/status", None, Body::empty()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn tenant_ids_that_split_store_keys_are_rejected() {
    let app = build_app(small_limits());
    let (status, _) = record(&app, "alice", 0.5).await;
    assert_eq!(status, StatusCode::OK);

    for tenant in ["alice:alert:x", "a*", "a[1]"] {
        let (status, body) =
            call_json(&app, Method::GET, "/v1/usage/alerts", Some(tenant), Body::empty()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{tenant}");
        assert_eq!(body["code"], "validation_failed");
    }

    let (status, body) =
        call_json(&app, Method::GET, "/v1/usage/alerts", Some("alice"), Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().is_some_and(Vec::is_empty), "{body}");
}

// -- Usage ----------------------------------------------------------------

#[tokio::test]
async fn record_grants_and_updates_status() {
    let app = build_app(small_limits());

    let (status, grant) = record(&app, "alice", 0.5).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(grant["tenant_id"], "alice");
    assert_eq!(grant["operation_type"], "download");
    assert_eq!(grant["current_usage_mb"], 0.5);
    assert_eq!(grant["remaining_mb"], 0.5);
    assert!(grant.get("alert").is_none());

    let (status, usage) =
        call_json(&app, Method::GET, "/v1/usage/status", Some("alice"), Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usage["download_mb"], 0.5);
    assert_eq!(usage["total_mb"], 0.5);
    assert_eq!(usage["usage_percentage"], 50.0);
}

#[tokio::test]
async fn record_over_the_cap_is_denied_with_figures() {
    let app = build_app(small_limits());

    let (status, grant) = record(&app, "alice", 0.9).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(grant["alert"], "APPROACHING_LIMIT");

    let (status, denial) = record(&app, "alice", 0.2).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(denial["code"], "capacity_exceeded");
    assert_eq!(denial["resource"], "bandwidth");
    assert_eq!(denial["requested_mb"], 0.2);
    assert_eq!(denial["retryable"], false);

    // Another tenant's cap is untouched.
    let (status, _) = record(&app, "bob", 0.2).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn malformed_record_body_is_a_validation_failure() {
    let app = build_app(small_limits());
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/usage/record")
        .header("x-tenant-id", "alice")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"volume_mb": "lots"}"#))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let (status, body) = record(&app, "alice", -1.0).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_failed");
}

#[tokio::test]
async fn alerts_are_listed_for_the_caller() {
    let app = build_app(small_limits());
    record(&app, "alice", 0.85).await;

    let (status, alerts) =
        call_json(&app, Method::GET, "/v1/usage/alerts", Some("alice"), Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    let alerts = alerts.as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["alert_kind"], "APPROACHING_LIMIT");
    assert_eq!(alerts[0]["observed_mb"], 0.85);

    let (_, other) =
        call_json(&app, Method::GET, "/v1/usage/alerts", Some("bob"), Body::empty()).await;
    assert_eq!(other, json!([]));

    let (status, _) = call_json(
        &app,
        Method::GET,
        "/v1/usage/alerts?date=1999-01-01",
        Some("alice"),
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

// -- Storage --------------------------------------------------------------

#[tokio::test]
async fn upload_download_stream_and_delete() {
    let app = build_app(MeteringLimits {
        daily_bandwidth_limit_mb: 10.0,
        ..small_limits()
    });
    let data = payload(0.25);

    let (status, receipt) = call_json(
        &app,
        Method::POST,
        "/v1/storage/upload/clip.mp4",
        Some("alice"),
        Body::from(data.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["file"]["name"], "clip.mp4");
    assert_eq!(receipt["file"]["size_mb"], 0.25);
    assert_eq!(receipt["file"]["content_type"], "video/mp4");
    assert_eq!(receipt["should_alert"], false);

    let (_, files) =
        call_json(&app, Method::GET, "/v1/storage/files", Some("alice"), Body::empty()).await;
    assert_eq!(files.as_array().unwrap().len(), 1);

    let (_, quota) =
        call_json(&app, Method::GET, "/v1/storage/status", Some("alice"), Body::empty()).await;
    assert_eq!(quota["consumed_mb"], 0.25);
    assert_eq!(quota["available_mb"], 0.75);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/storage/download/clip.mp4")
                .header("x-tenant-id", "alice")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(bytes.as_ref(), data.as_slice());

    let (status, streamed) = call(
        &app,
        Method::GET,
        "/v1/storage/stream/clip.mp4?chunk_size=100000",
        Some("alice"),
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(streamed.as_ref(), data.as_slice());

    // Upload plus two reads were charged.
    let (_, usage) =
        call_json(&app, Method::GET, "/v1/usage/status", Some("alice"), Body::empty()).await;
    assert_eq!(usage["upload_mb"], 0.25);
    assert_eq!(usage["download_mb"], 0.5);

    let (status, removed) = call_json(
        &app,
        Method::DELETE,
        "/v1/storage/files/clip.mp4",
        Some("alice"),
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["name"], "clip.mp4");

    let (status, body) = call_json(
        &app,
        Method::GET,
        "/v1/storage/download/clip.mp4",
        Some("alice"),
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn files_are_private_to_their_tenant() {
    let app = build_app(small_limits());
    let (status, _) = call(
        &app,
        Method::POST,
        "/v1/storage/upload/clip.mp4",
        Some("alice"),
        Body::from(payload(0.1)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, files) =
        call_json(&app, Method::GET, "/v1/storage/files", Some("bob"), Body::empty()).await;
    assert_eq!(files, json!([]));
    let (status, _) = call(
        &app,
        Method::GET,
        "/v1/storage/download/clip.mp4",
        Some("bob"),
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_rules_are_enforced() {
    let app = build_app(MeteringLimits {
        daily_bandwidth_limit_mb: 10.0,
        ..small_limits()
    });

    let (status, body) = call_json(
        &app,
        Method::POST,
        "/v1/storage/upload/notes.txt",
        Some("alice"),
        Body::from(payload(0.1)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_failed");

    let (status, _) = call_json(
        &app,
        Method::POST,
        "/v1/storage/upload/big.mp4",
        Some("alice"),
        Body::from(payload(0.6)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for name in ["a.mp4", "b.mp4"] {
        let (status, _) = call(
            &app,
            Method::POST,
            &format!("/v1/storage/upload/{name}"),
            Some("alice"),
            Body::from(payload(0.45)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = call_json(
        &app,
        Method::POST,
        "/v1/storage/upload/c.mp4",
        Some("alice"),
        Body::from(payload(0.2)),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["resource"], "storage");

    let (status, _) = call(
        &app,
        Method::POST,
        "/v1/storage/upload/a.mp4",
        Some("alice"),
        Body::from(payload(0.01)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn zero_chunk_size_is_rejected() {
    let app = build_app(small_limits());
    call(
        &app,
        Method::POST,
        "/v1/storage/upload/clip.mp4",
        Some("alice"),
        Body::from(payload(0.1)),
    )
    .await;
    let (status, _) = call(
        &app,
        Method::GET,
        "/v1/storage/stream/clip.mp4?chunk_size=0",
        Some("alice"),
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// -- Configured deployments -----------------------------------------------

#[tokio::test]
async fn bearer_tokens_identify_the_tenant() {
    let config = TallyConfig::parse(
        r#"
        [auth]
        enabled = true
        jwt_secret = "test-secret"

        [auth.tokens]
        "alice-token" = "alice"
        "#,
    )
    .unwrap();
    let app = api::router(build_state(&config).await.unwrap());

    let authed = |token: Option<&str>| {
        let mut builder = Request::builder().uri("/v1/usage/status");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.header("x-tenant-id", "bob").body(Body::empty()).unwrap()
    };

    let response = app.clone().oneshot(authed(Some("alice-token"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let usage: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(usage["tenant_id"], "alice");

    let response = app.clone().oneshot(authed(Some("wrong"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The tenant header is ignored once bearer auth is on.
    let response = app.clone().oneshot(authed(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn audit_trail_is_scoped_to_the_caller() {
    let config = TallyConfig::parse("[audit]\nenabled = true").unwrap();
    let state = build_state(&config).await.unwrap();
    let audit = state.meter.audit().clone();
    let app = api::router(state);

    call(
        &app,
        Method::POST,
        "/v1/storage/upload/clip.mp4",
        Some("alice"),
        Body::from(payload(0.1)),
    )
    .await;
    record(&app, "bob", 0.1).await;
    assert!(audit.shutdown(Duration::from_secs(1)).await);

    let (status, events) = call_json(
        &app,
        Method::GET,
        "/v1/audit?component=storage",
        Some("alice"),
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let events = events.as_array().unwrap();
    assert!(!events.is_empty());
    assert!(events.iter().all(|e| e["tenant_id"] == "alice"));
    assert!(events.iter().all(|e| e["component"] == "storage"));

    let (_, bob) = call_json(
        &app,
        Method::GET,
        "/v1/audit?component=storage",
        Some("bob"),
        Body::empty(),
    )
    .await;
    assert_eq!(bob, json!([]));
}

#[tokio::test]
async fn audit_query_without_a_log_is_not_found() {
    let app = build_app(small_limits());
    let (status, _) = call(&app, Method::GET, "/v1/audit", Some("alice"), Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
