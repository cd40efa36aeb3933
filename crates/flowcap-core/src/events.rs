//! Internal store notifications.
//!
//! Emitted over `tokio::sync::broadcast` after a mutation commits and every
//! lock is released. Sending is best-effort: no subscribers is normal and a
//! full channel only drops messages for lagging subscribers, never blocks
//! the pipeline.

/// A notification from one of the stores.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// An event was appended to a session.
    EventIngested {
        session_id: String,
        kind: &'static str,
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
    /// A cleanup sweep removed aged records.
    SweepCompleted {
        removed_sessions: usize,
        removed_buffers: usize,
    },
}
