//! Reassembled screen recordings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A fully reassembled recording with its byte payload.
///
/// Not a wire type: the payload is handed to the archive whole, and the
/// HTTP surface serves metadata (or re-encodes the payload on demand).
#[derive(Debug, Clone)]
pub struct CompletedRecording {
    pub recording_id: String,
    /// Concatenated chunk bytes, exactly as the client recorded them.
    pub data: Vec<u8>,
    pub size_bytes: usize,
    /// Recorded from the first chunk that declared one, else the completion
    /// request, else `video/webm`.
    pub mime_type: String,
    /// Declared by the client at completion, if known.
    pub duration_ms: Option<u64>,
    /// When the client finished recording, epoch ms.
    pub completion_timestamp: u64,
    /// When the client started recording, epoch ms, if any chunk carried it.
    pub recording_start_timestamp: Option<u64>,
    /// Hex sha256 of `data`, so the archive handoff is verifiable.
    pub sha256: String,
}

impl CompletedRecording {
    /// Metadata view for listings and the archive API.
    pub fn meta(&self, linked_session_id: Option<String>) -> RecordingMeta {
        RecordingMeta {
            recording_id: self.recording_id.clone(),
            size_bytes: self.size_bytes,
            mime_type: self.mime_type.clone(),
            duration_ms: self.duration_ms,
            completion_timestamp: self.completion_timestamp,
            sha256: self.sha256.clone(),
            completed_at: DateTime::<Utc>::from_timestamp_millis(
                self.completion_timestamp as i64,
            )
            .unwrap_or_default(),
            linked_session_id,
        }
    }
}

/// Wire metadata for a completed recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMeta {
    pub recording_id: String,
    pub size_bytes: usize,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub completion_timestamp: u64,
    pub sha256: String,
    pub completed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_session_id: Option<String>,
}

/// Acknowledgement for one uploaded chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkReceipt {
    /// Index this acknowledgement is for.
    pub received: usize,
    /// Distinct chunk slots filled so far.
    pub have: usize,
    /// Declared chunk count for the recording.
    pub total: usize,
}

/// Result of trying to attach a recording to a session.
///
/// `linked: false` is a normal outcome (short recordings, idle sessions),
/// never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkOutcome {
    pub linked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlap_ms: Option<u64>,
}

impl LinkOutcome {
    pub fn attached(session_id: impl Into<String>, overlap_ms: u64) -> Self {
        Self {
            linked: true,
            session_id: Some(session_id.into()),
            overlap_ms: Some(overlap_ms),
        }
    }

    pub fn unlinked() -> Self {
        Self {
            linked: false,
            session_id: None,
            overlap_ms: None,
        }
    }
}
