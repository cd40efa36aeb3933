//! Event ingestion and ad-hoc classification.
//!
//! Ingestion is the hot path: capture extensions POST every browser event
//! here, one at a time, and rely on the response flags to learn where the
//! event landed (fresh session, merged into an existing one, or dropped as
//! a duplicate).

use crate::routes::error_response;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use flowcap_core::{classify_events, FlowcapError};
use flowcap_types::{CriticalEvent, RawBrowserEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Response for one ingested event.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub status: &'static str,
    /// Session the event ended up in; differs from the submitted id when a
    /// temporary record was merged away.
    pub session_id: String,
    pub created: bool,
    pub merged: bool,
    pub deduplicated: bool,
}

/// POST /api/events - Receive one captured browser event.
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(event): Json<RawBrowserEvent>,
) -> Result<Json<IngestResponse>, (StatusCode, String)> {
    debug!(
        target: "flowcap::api",
        "Ingest {} event for session {}",
        event.kind.as_str(),
        event.session_id
    );

    let deadline = Duration::from_millis(state.config.request_timeout_ms);
    let outcome = tokio::time::timeout(deadline, state.session_store.append(event))
        .await
        .map_err(|_| error_response(FlowcapError::Timeout))?
        .map_err(error_response)?;

    Ok(Json(IngestResponse {
        status: "ok",
        session_id: outcome.session_id,
        created: outcome.created,
        merged: outcome.merged,
        deduplicated: outcome.deduplicated,
    }))
}

/// Request body for classification without a stored session.
#[derive(Deserialize)]
pub struct ClassifyRequest {
    pub events: Vec<RawBrowserEvent>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifyResponse {
    pub critical_events: Vec<CriticalEvent>,
    pub original_count: usize,
}

/// POST /api/classify - Classify caller-supplied events.
pub async fn classify(Json(request): Json<ClassifyRequest>) -> Json<ClassifyResponse> {
    let original_count = request.events.len();
    let critical_events = classify_events(&request.events);
    debug!(
        target: "flowcap::api",
        "Classified {} of {} events as critical",
        critical_events.len(),
        original_count
    );

    Json(ClassifyResponse {
        critical_events,
        original_count,
    })
}
