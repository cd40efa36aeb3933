//! Integration tests for the recording pipeline: chunk upload, completion,
//! temporal linking to sessions, and archive access.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::{get, post},
    Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flowcap_server::{config::Config, routes, state::AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn create_test_app_with(config: Config) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(config));

    let app = Router::new()
        .route("/api/events", post(routes::events::ingest))
        .route("/api/sessions/{id}", get(routes::sessions::get))
        .route("/api/recordings", get(routes::recordings::list))
        .route("/api/recordings/{id}", get(routes::recordings::get))
        .route("/api/recordings/{id}/chunks", post(routes::recordings::put_chunk))
        .route(
            "/api/recordings/{id}/complete",
            post(routes::recordings::complete),
        )
        .route("/api/cleanup", post(routes::sessions::cleanup))
        .with_state(state.clone());

    (app, state)
}

fn create_test_app() -> (Router, Arc<AppState>) {
    create_test_app_with(Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..Config::default()
    })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, String) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn parsed(body: &str) -> Value {
    serde_json::from_str(body).unwrap()
}

fn chunk(index: usize, total: usize, payload: &[u8]) -> Value {
    json!({
        "index": index,
        "total": total,
        "data": BASE64.encode(payload),
    })
}

/// Two events bounding a stored session in time.
async fn seed_session(app: &Router, session_id: &str, start: u64, last: u64) {
    for (kind, ts) in [("page_load", start), ("click", last)] {
        let payload = json!({"type": kind, "timestamp": ts, "sessionId": session_id});
        let (status, _) = send(app, "POST", "/api/events", Some(payload)).await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_chunks_assemble_in_index_order() {
    let (app, _) = create_test_app();

    // upload out of order, as a flaky client would
    for (index, payload) in [(2usize, b"world".as_ref()), (0, b"hel"), (1, b"lo ")] {
        let (status, body) = send(
            &app,
            "POST",
            "/api/recordings/rec_1/chunks",
            Some(chunk(index, 3, payload)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(parsed(&body)["received"], index);
    }

    let (status, body) = send(
        &app,
        "POST",
        "/api/recordings/rec_1/complete",
        Some(json!({"durationMs": 4_000, "completionTimestamp": 1_000})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = parsed(&body);
    assert_eq!(body["ok"], true);
    assert_eq!(body["recordingId"], "rec_1");
    assert_eq!(body["sizeBytes"], 11);
    assert_eq!(
        body["sha256"],
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
    );
    assert_eq!(body["linked"], false);

    let (status, body) = send(&app, "GET", "/api/recordings/rec_1?data=true", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = parsed(&body);
    assert_eq!(body["mimeType"], "video/webm");
    assert_eq!(body["completionTimestamp"], 1_000);
    let payload = BASE64.decode(body["data"].as_str().unwrap()).unwrap();
    assert_eq!(payload, b"hello world");
}

#[tokio::test]
async fn test_chunk_receipt_counts_distinct_slots() {
    let (app, _) = create_test_app();

    let (_, first) = send(
        &app,
        "POST",
        "/api/recordings/rec_1/chunks",
        Some(chunk(0, 2, b"aa")),
    )
    .await;
    assert_eq!(parsed(&first)["have"], 1);

    // a retried index does not inflate the count
    let (_, retry) = send(
        &app,
        "POST",
        "/api/recordings/rec_1/chunks",
        Some(chunk(0, 2, b"aa")),
    )
    .await;
    let retry = parsed(&retry);
    assert_eq!(retry["have"], 1);
    assert_eq!(retry["total"], 2);

    let (_, second) = send(
        &app,
        "POST",
        "/api/recordings/rec_1/chunks",
        Some(chunk(1, 2, b"bb")),
    )
    .await;
    assert_eq!(parsed(&second)["have"], 2);
}

#[tokio::test]
async fn test_incomplete_completion_conflicts_then_succeeds() {
    let (app, _) = create_test_app();

    send(
        &app,
        "POST",
        "/api/recordings/rec_1/chunks",
        Some(chunk(1, 4, b"b")),
    )
    .await;

    let (status, body) = send(&app, "POST", "/api/recordings/rec_1/complete", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("missing chunks [0, 2, 3]"), "unexpected body: {body}");

    // fill the gaps on the retained buffer and try again
    for index in [0usize, 2, 3] {
        send(
            &app,
            "POST",
            "/api/recordings/rec_1/chunks",
            Some(chunk(index, 4, b"x")),
        )
        .await;
    }
    let (status, body) = send(&app, "POST", "/api/recordings/rec_1/complete", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parsed(&body)["sizeBytes"], 4);
}

#[tokio::test]
async fn test_unknown_recording_is_not_found() {
    let (app, _) = create_test_app();

    let (status, body) = send(&app, "POST", "/api/recordings/rec_ghost/complete", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("rec_ghost"));

    let (status, _) = send(&app, "GET", "/api/recordings/rec_ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bad_base64_is_rejected() {
    let (app, _) = create_test_app();

    let payload = json!({"index": 0, "total": 1, "data": "not base64!!!"});
    let (status, body) = send(&app, "POST", "/api/recordings/rec_1/chunks", Some(payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("not valid base64"));
}

#[tokio::test]
async fn test_chunk_validation_rejections() {
    let (app, _) = create_test_app();

    let (status, _) = send(
        &app,
        "POST",
        "/api/recordings/rec_1/chunks",
        Some(chunk(0, 0, b"x")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/recordings/rec_1/chunks",
        Some(chunk(3, 3, b"x")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // a chunk disagreeing with the declared total is refused
    send(
        &app,
        "POST",
        "/api/recordings/rec_1/chunks",
        Some(chunk(0, 3, b"x")),
    )
    .await;
    let (status, _) = send(
        &app,
        "POST",
        "/api/recordings/rec_1/chunks",
        Some(chunk(1, 5, b"x")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_completed_recording_links_to_overlapping_session() {
    let (app, _) = create_test_app();
    seed_session(&app, "sess_checkout", 10_000, 17_000).await;

    send(
        &app,
        "POST",
        "/api/recordings/rec_cam/chunks",
        Some(chunk(0, 1, b"frames")),
    )
    .await;

    // recording window [8000, 16000] against session [10000, 17000]
    let (status, body) = send(
        &app,
        "POST",
        "/api/recordings/rec_cam/complete",
        Some(json!({"durationMs": 8_000, "completionTimestamp": 16_000})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let body = parsed(&body);
    assert_eq!(body["linked"], true);
    assert_eq!(body["sessionId"], "sess_checkout");

    let (_, session) = send(&app, "GET", "/api/sessions/sess_checkout", None).await;
    assert_eq!(parsed(&session)["recordingId"], "rec_cam");

    let (_, meta) = send(&app, "GET", "/api/recordings/rec_cam", None).await;
    assert_eq!(parsed(&meta)["linkedSessionId"], "sess_checkout");
}

#[tokio::test]
async fn test_recording_far_from_any_session_stays_unlinked() {
    let (app, _) = create_test_app();
    seed_session(&app, "sess_1", 10_000, 11_000).await;

    send(
        &app,
        "POST",
        "/api/recordings/rec_late/chunks",
        Some(chunk(0, 1, b"frames")),
    )
    .await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/recordings/rec_late/complete",
        Some(json!({"durationMs": 1_000, "completionTimestamp": 500_000})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "an unlinked completion is not an error");
    let body = parsed(&body);
    assert_eq!(body["ok"], true);
    assert_eq!(body["linked"], false);
    assert!(body.get("sessionId").is_none());

    let (_, session) = send(&app, "GET", "/api/sessions/sess_1", None).await;
    assert!(parsed(&session).get("recordingId").is_none());
}

#[tokio::test]
async fn test_second_recording_cannot_claim_a_linked_session() {
    let (app, _) = create_test_app();
    seed_session(&app, "sess_1", 10_000, 20_000).await;

    for rec in ["rec_a", "rec_b"] {
        send(
            &app,
            "POST",
            &format!("/api/recordings/{rec}/chunks"),
            Some(chunk(0, 1, b"frames")),
        )
        .await;
    }

    let (_, first) = send(
        &app,
        "POST",
        "/api/recordings/rec_a/complete",
        Some(json!({"durationMs": 8_000, "completionTimestamp": 15_000})),
    )
    .await;
    assert_eq!(parsed(&first)["linked"], true);

    let (_, second) = send(
        &app,
        "POST",
        "/api/recordings/rec_b/complete",
        Some(json!({"durationMs": 8_000, "completionTimestamp": 16_000})),
    )
    .await;
    assert_eq!(parsed(&second)["linked"], false);

    let (_, session) = send(&app, "GET", "/api/sessions/sess_1", None).await;
    assert_eq!(parsed(&session)["recordingId"], "rec_a");
}

#[tokio::test]
async fn test_archive_lists_newest_completion_first() {
    let (app, _) = create_test_app();

    for (rec, completed_at) in [("rec_old", 1_000u64), ("rec_new", 2_000)] {
        send(
            &app,
            "POST",
            &format!("/api/recordings/{rec}/chunks"),
            Some(chunk(0, 1, b"frames")),
        )
        .await;
        send(
            &app,
            "POST",
            &format!("/api/recordings/{rec}/complete"),
            Some(json!({"completionTimestamp": completed_at})),
        )
        .await;
    }

    let (status, body) = send(&app, "GET", "/api/recordings", None).await;
    assert_eq!(status, StatusCode::OK);
    let listing = parsed(&body);
    let metas = listing.as_array().unwrap();
    assert_eq!(metas.len(), 2);
    assert_eq!(metas[0]["recordingId"], "rec_new");
    assert_eq!(metas[1]["recordingId"], "rec_old");
    assert!(metas[0]["completedAt"].as_str().is_some());
    assert!(metas[0].get("data").is_none());
}

#[tokio::test]
async fn test_archive_meta_omits_payload_by_default() {
    let (app, _) = create_test_app();

    send(
        &app,
        "POST",
        "/api/recordings/rec_1/chunks",
        Some(chunk(0, 1, b"frames")),
    )
    .await;
    send(&app, "POST", "/api/recordings/rec_1/complete", None).await;

    let (status, body) = send(&app, "GET", "/api/recordings/rec_1", None).await;
    assert_eq!(status, StatusCode::OK);
    let meta = parsed(&body);
    assert_eq!(meta["sizeBytes"], 6);
    assert!(!meta["sha256"].as_str().unwrap().is_empty());
    assert!(meta.get("data").is_none());
}

#[tokio::test]
async fn test_complete_without_body_uses_defaults() {
    let (app, _) = create_test_app();

    send(
        &app,
        "POST",
        "/api/recordings/rec_1/chunks",
        Some(chunk(0, 1, b"frames")),
    )
    .await;

    let (status, body) = send(&app, "POST", "/api/recordings/rec_1/complete", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = parsed(&body);
    assert_eq!(body["ok"], true);
    assert_eq!(body["sizeBytes"], 6);
    assert_eq!(body["linked"], false);

    let (_, meta) = send(&app, "GET", "/api/recordings/rec_1", None).await;
    let meta = parsed(&meta);
    assert_eq!(meta["mimeType"], "video/webm");
    assert!(meta["completionTimestamp"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_cleanup_evicts_stale_upload_buffers() {
    // a zero TTL turns the sweep into "evict everything in flight"
    let (app, _) = create_test_app_with(Config {
        recording_buffer_ttl_secs: 0,
        ..Config::default()
    });

    send(
        &app,
        "POST",
        "/api/recordings/rec_stuck/chunks",
        Some(chunk(0, 3, b"a")),
    )
    .await;
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    let (status, body) = send(&app, "POST", "/api/cleanup", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(parsed(&body)["removedBuffers"], 1);

    let (status, _) = send(&app, "POST", "/api/recordings/rec_stuck/complete", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
