//! Live feed protocol: notifications pushed to dashboards.

use serde::{Deserialize, Serialize};

/// Messages pushed over the `/ws/events` feed.
///
/// The feed is best-effort: the pipeline never blocks or fails on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum FeedMessage {
    /// An event was appended to a session.
    EventIngested {
        session_id: String,
        kind: String,
        timestamp: u64,
    },
    /// A temporary session was folded into a durable one.
    SessionMerged {
        from: String,
        into: String,
        migrated_events: usize,
    },
    /// A recording finished reassembly.
    RecordingCompleted {
        recording_id: String,
        size_bytes: usize,
    },
    /// A recording was attached to a session.
    RecordingLinked {
        recording_id: String,
        session_id: String,
        overlap_ms: u64,
    },
    /// A cleanup sweep ran.
    SweepCompleted {
        removed_sessions: usize,
        removed_buffers: usize,
    },
}
