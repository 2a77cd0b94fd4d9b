use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use futures::StreamExt;
use serde::Deserialize;

use tally_core::{FileDescriptor, Principal, QuotaStatus, UploadReceipt};
use tally_gateway::DEFAULT_STREAM_CHUNK;

use super::AppState;
use crate::error::ServerError;

/// `GET /v1/storage/status`
pub async fn status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<QuotaStatus>, ServerError> {
    Ok(Json(state.meter.enforcer().status(&principal.tenant).await?))
}

/// `GET /v1/storage/files`
pub async fn list_files(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<FileDescriptor>>, ServerError> {
    Ok(Json(state.meter.enforcer().list_files(&principal.tenant).await?))
}

/// `POST /v1/storage/upload/{filename}` -- the request body is the file.
pub async fn upload(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(filename): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadReceipt>), ServerError> {
    let file = state
        .meter
        .enforcer()
        .upload(&principal, &filename, body)
        .await?;

    // The upload is committed; a failed status read only loses the hint.
    let should_alert = match state.meter.quota().should_alert(&principal.tenant).await {
        Ok(flag) => flag,
        Err(e) => {
            tracing::warn!(tenant = %principal.tenant, error = %e, "storage alert check failed");
            false
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(UploadReceipt {
            message: "File uploaded successfully".to_owned(),
            should_alert,
            file,
        }),
    ))
}

/// `GET /v1/storage/download/{filename}`
pub async fn download(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(filename): Path<String>,
) -> Result<Response, ServerError> {
    let (file, data) = state
        .meter
        .enforcer()
        .download(&principal, &filename)
        .await?;
    Ok((file_headers(&file), data).into_response())
}

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    pub chunk_size: Option<usize>,
}

/// `GET /v1/storage/stream/{filename}` -- chunked transfer of the same bytes
/// `download` returns.
pub async fn stream(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(filename): Path<String>,
    Query(params): Query<StreamParams>,
) -> Result<Response, ServerError> {
    let chunk_size = params.chunk_size.unwrap_or(DEFAULT_STREAM_CHUNK);
    let (file, chunks) = state
        .meter
        .enforcer()
        .stream(&principal, &filename, chunk_size)
        .await?;
    let body = Body::from_stream(chunks.map(Ok::<_, Infallible>));
    Ok((file_headers(&file), body).into_response())
}

/// `DELETE /v1/storage/files/{filename}` -- returns the removed descriptor.
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(filename): Path<String>,
) -> Result<Json<FileDescriptor>, ServerError> {
    let file = state
        .meter
        .enforcer()
        .delete(&principal.tenant, &filename)
        .await?;
    Ok(Json(file))
}

fn file_headers(file: &FileDescriptor) -> [(header::HeaderName, String); 2] {
    [
        (header::CONTENT_TYPE, file.content_type.clone()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file.name.replace('"', "")),
        ),
    ]
}
