//! Live feed WebSocket for dashboards.
//!
//! Forwards store notifications (ingests, merges, completed recordings,
//! links, sweeps) to every connected client. Strictly best-effort: a slow
//! client skips messages, and the pipeline never waits on the feed.

use crate::state::AppState;
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use flowcap_core::StoreEvent;
use flowcap_types::FeedMessage;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;

/// Translate a store notification into its wire form.
fn feed_message(event: StoreEvent) -> FeedMessage {
    match event {
        StoreEvent::EventIngested {
            session_id,
            kind,
            timestamp,
        } => FeedMessage::EventIngested {
            session_id,
            kind: kind.to_string(),
            timestamp,
        },
        StoreEvent::SessionMerged {
            from,
            into,
            migrated_events,
        } => FeedMessage::SessionMerged {
            from,
            into,
            migrated_events,
        },
        StoreEvent::RecordingCompleted {
            recording_id,
            size_bytes,
        } => FeedMessage::RecordingCompleted {
            recording_id,
            size_bytes,
        },
        StoreEvent::RecordingLinked {
            recording_id,
            session_id,
            overlap_ms,
        } => FeedMessage::RecordingLinked {
            recording_id,
            session_id,
            overlap_ms,
        },
        StoreEvent::SweepCompleted {
            removed_sessions,
            removed_buffers,
        } => FeedMessage::SweepCompleted {
            removed_sessions,
            removed_buffers,
        },
    }
}

/// Handle one feed connection.
pub async fn handle_feed_socket(socket: WebSocket, state: Arc<AppState>) -> Result<()> {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // One merged stream over both stores' notification channels
    let store_rx = BroadcastStream::new(state.session_store.subscribe());
    let assembler_rx = BroadcastStream::new(state.assembler.subscribe());
    let mut events = futures::stream::select(store_rx, assembler_rx);

    tracing::info!(target: "flowcap::ws", "Feed client connected");

    // Forward notifications until the client goes away
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            // A lagged receiver reports the gap and keeps going
            let Ok(event) = event else { continue };
            let json = match serde_json::to_string(&feed_message(event)) {
                Ok(j) => j,
                Err(_) => continue,
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                tracing::debug!(target: "flowcap::ws", "Feed client dropped mid-send");
                break;
            }
        }
    });

    // Incoming traffic is keepalive only
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Ping(_) => {
                    // Pong is handled automatically by axum
                    tracing::trace!(target: "flowcap::ws::keepalive", "Ping from feed client");
                }
                Message::Close(_) => {
                    tracing::debug!(target: "flowcap::ws", "Feed client closed the connection");
                    break;
                }
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    tracing::info!(target: "flowcap::ws", "Feed client disconnected");
    Ok(())
}
