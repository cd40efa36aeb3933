//! Session inspection and maintenance.

use crate::routes::error_response;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use flowcap_core::{classify_events, prune, PruneConfig};
use flowcap_types::{CriticalEvent, RawBrowserEvent, SessionSummary, WorkflowSession};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// GET /api/sessions - Session summaries, newest first.
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<SessionSummary>> {
    Json(state.session_store.list().await)
}

/// GET /api/sessions/{id} - Full session including events.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowSession>, (StatusCode, String)> {
    state
        .session_store
        .get(&id)
        .await
        .map(Json)
        .map_err(error_response)
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub removed: bool,
}

/// DELETE /api/sessions/{id} - Idempotent delete.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<DeleteResponse> {
    let removed = state.session_store.delete(&id).await;
    if removed {
        info!(target: "flowcap::session", "Deleted session {}", id);
    }
    Json(DeleteResponse { removed })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneResponse {
    pub session_id: String,
    pub original_count: usize,
    pub kept_count: usize,
    pub events: Vec<RawBrowserEvent>,
}

/// POST /api/sessions/{id}/prune - Pruned view of a session.
///
/// Never mutates the stored session; callers get a cleaned copy. An optional
/// JSON body overrides individual thresholds.
pub async fn prune_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<PruneConfig>>,
) -> Result<Json<PruneResponse>, (StatusCode, String)> {
    let session = state.session_store.get(&id).await.map_err(error_response)?;
    let config = body.map(|Json(config)| config).unwrap_or_default();

    let events = prune(&session.events, &config);
    Ok(Json(PruneResponse {
        session_id: session.session_id,
        original_count: session.events.len(),
        kept_count: events.len(),
        events,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalEventsResponse {
    pub session_id: String,
    pub critical_events: Vec<CriticalEvent>,
}

/// GET /api/sessions/{id}/critical-events - Classify a stored session.
pub async fn critical_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CriticalEventsResponse>, (StatusCode, String)> {
    let session = state.session_store.get(&id).await.map_err(error_response)?;
    let critical_events = classify_events(&session.events);

    Ok(Json(CriticalEventsResponse {
        session_id: session.session_id,
        critical_events,
    }))
}

/// Request body for a manual cleanup pass.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CleanupRequest {
    /// Session age cutoff; defaults to the configured max age.
    pub max_age_ms: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub removed_sessions: usize,
    pub removed_buffers: usize,
}

/// POST /api/cleanup - Sweep idle sessions and stale recording buffers now.
pub async fn cleanup(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CleanupRequest>>,
) -> Json<CleanupResponse> {
    let max_age_ms = body
        .and_then(|Json(request)| request.max_age_ms)
        .unwrap_or_else(|| state.config.session_max_age_ms());

    let removed_sessions = state.session_store.cleanup_older_than(max_age_ms).await;
    let removed_buffers = state
        .assembler
        .evict_stale(state.config.recording_buffer_ttl_ms())
        .await;
    state
        .session_store
        .announce_sweep(removed_sessions, removed_buffers);

    Json(CleanupResponse {
        removed_sessions,
        removed_buffers,
    })
}
