//! HTTP route handlers.

pub mod events;
pub mod recordings;
pub mod sessions;

use axum::http::StatusCode;
use axum::Json;
use flowcap_core::FlowcapError;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Map a pipeline error to its HTTP status; the message becomes the body.
pub fn error_response(err: FlowcapError) -> (StatusCode, String) {
    let status = match &err {
        FlowcapError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        FlowcapError::SessionNotFound(_) | FlowcapError::UnknownRecording(_) => {
            StatusCode::NOT_FOUND
        }
        FlowcapError::IncompleteChunks { .. } => StatusCode::CONFLICT,
        FlowcapError::Timeout => StatusCode::REQUEST_TIMEOUT,
    };
    (status, err.to_string())
}
