//! Recording upload, completion, and archive access.
//!
//! Clients stream base64 chunks while recording, then call complete once.
//! Completion assembles the bytes, tries to attach the recording to the
//! session it overlaps in time, and hands the result to the archive.

use crate::routes::error_response;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flowcap_core::FlowcapError;
use flowcap_types::{ChunkReceipt, RecordingMeta};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Request body for one chunk upload.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUpload {
    pub index: usize,
    pub total: usize,
    /// Base64-encoded chunk payload.
    pub data: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub recording_start_timestamp: Option<u64>,
}

/// POST /api/recordings/{id}/chunks - Buffer one chunk.
pub async fn put_chunk(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(upload): Json<ChunkUpload>,
) -> Result<Json<ChunkReceipt>, (StatusCode, String)> {
    debug!(
        target: "flowcap::api",
        "Chunk {}/{} for recording {}",
        upload.index, upload.total, id
    );

    let deadline = Duration::from_millis(state.config.request_timeout_ms);
    let receipt = tokio::time::timeout(
        deadline,
        state.assembler.put_chunk(
            &id,
            upload.index,
            upload.total,
            &upload.data,
            upload.mime_type,
            upload.recording_start_timestamp,
        ),
    )
    .await
    .map_err(|_| error_response(FlowcapError::Timeout))?
    .map_err(error_response)?;

    Ok(Json(receipt))
}

/// Request body for completing a recording; every field is optional.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CompleteRequest {
    pub duration_ms: Option<u64>,
    pub mime_type: Option<String>,
    pub completion_timestamp: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResponse {
    pub ok: bool,
    pub recording_id: String,
    pub size_bytes: usize,
    pub sha256: String,
    /// Whether a session overlapped enough to claim this recording.
    pub linked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// POST /api/recordings/{id}/complete - Assemble, link, and archive.
///
/// The deadline covers only the assembly step. Once the bytes exist, the
/// link attempt and archive insert always run to completion, so a timeout
/// can never leave an assembled recording unarchived.
pub async fn complete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<CompleteRequest>>,
) -> Result<Json<CompleteResponse>, (StatusCode, String)> {
    let request = body.map(|Json(request)| request).unwrap_or_default();

    let deadline = Duration::from_millis(state.config.request_timeout_ms);
    let recording = tokio::time::timeout(
        deadline,
        state.assembler.complete(
            &id,
            request.duration_ms,
            request.mime_type,
            request.completion_timestamp,
        ),
    )
    .await
    .map_err(|_| error_response(FlowcapError::Timeout))?
    .map_err(error_response)?;

    let outcome = state
        .session_store
        .link_recording(&id, recording.completion_timestamp, recording.duration_ms)
        .await;

    let response = CompleteResponse {
        ok: true,
        recording_id: recording.recording_id.clone(),
        size_bytes: recording.size_bytes,
        sha256: recording.sha256.clone(),
        linked: outcome.linked,
        session_id: outcome.session_id.clone(),
    };
    state.archive.insert(recording, outcome.session_id);

    Ok(Json(response))
}

/// GET /api/recordings - Archive metadata, newest completion first.
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<RecordingMeta>> {
    Json(state.archive.list())
}

#[derive(Deserialize, Default)]
pub struct FetchParams {
    /// Include the base64 payload in the response.
    #[serde(default)]
    pub data: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingResponse {
    #[serde(flatten)]
    pub meta: RecordingMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// GET /api/recordings/{id} - Metadata, plus the payload with `?data=true`.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<FetchParams>,
) -> Result<Json<RecordingResponse>, (StatusCode, String)> {
    if params.data {
        let (meta, data) = state
            .archive
            .fetch(&id)
            .ok_or_else(|| error_response(FlowcapError::UnknownRecording(id.clone())))?;
        return Ok(Json(RecordingResponse {
            meta,
            data: Some(BASE64.encode(data)),
        }));
    }

    let meta = state
        .archive
        .meta(&id)
        .ok_or_else(|| error_response(FlowcapError::UnknownRecording(id.clone())))?;
    Ok(Json(RecordingResponse { meta, data: None }))
}
