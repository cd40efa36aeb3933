//! Archive of fully assembled recordings.

use dashmap::DashMap;

use flowcap_types::{CompletedRecording, RecordingMeta};

#[derive(Debug, Clone)]
struct ArchiveEntry {
    recording: CompletedRecording,
    linked_session_id: Option<String>,
}

/// Completed recordings, keyed by recording id.
///
/// Assembly hands recordings over here after the link attempt, so each entry
/// already knows which session it belongs to, if any. Entries are immutable
/// after insertion.
#[derive(Debug, Default)]
pub struct RecordingArchive {
    entries: DashMap<String, ArchiveEntry>,
}

impl RecordingArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a completed recording; a re-assembled id replaces the old entry.
    pub fn insert(&self, recording: CompletedRecording, linked_session_id: Option<String>) {
        self.entries.insert(
            recording.recording_id.clone(),
            ArchiveEntry {
                recording,
                linked_session_id,
            },
        );
    }

    pub fn meta(&self, recording_id: &str) -> Option<RecordingMeta> {
        self.entries
            .get(recording_id)
            .map(|entry| entry.recording.meta(entry.linked_session_id.clone()))
    }

    /// Metadata plus the raw bytes, for payload downloads.
    pub fn fetch(&self, recording_id: &str) -> Option<(RecordingMeta, Vec<u8>)> {
        self.entries.get(recording_id).map(|entry| {
            (
                entry.recording.meta(entry.linked_session_id.clone()),
                entry.recording.data.clone(),
            )
        })
    }

    /// All recordings, newest completion first.
    pub fn list(&self) -> Vec<RecordingMeta> {
        let mut all: Vec<RecordingMeta> = self
            .entries
            .iter()
            .map(|entry| entry.recording.meta(entry.linked_session_id.clone()))
            .collect();
        all.sort_by(|a, b| {
            b.completion_timestamp
                .cmp(&a.completion_timestamp)
                .then_with(|| a.recording_id.cmp(&b.recording_id))
        });
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
