//! Chunked recording reassembly.
//!
//! The capture client uploads screen recordings as ordered base64 chunks,
//! possibly out of order and with retries. Chunks are decoded at ingest (so
//! bad payloads fail the upload request, not the completion), buffered
//! sparsely, and concatenated in index order on completion. Same keyed-slot
//! locking discipline as the session store.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use flowcap_types::{ChunkReceipt, CompletedRecording};

use crate::error::FlowcapError;
use crate::events::StoreEvent;
use crate::store::now_ms;
use crate::Result;

/// Upper bound on a single decoded chunk.
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 8 * 1024 * 1024;

/// Upper bound on the declared chunk count.
pub const DEFAULT_MAX_TOTAL_CHUNKS: usize = 4_096;

/// Buffers idle longer than this are evicted by the sweep.
pub const DEFAULT_BUFFER_TTL_MS: u64 = 15 * 60 * 1000;

/// Mime type when neither chunks nor completion declared one.
const DEFAULT_MIME_TYPE: &str = "video/webm";

/// Broadcast capacity for assembler notifications.
const FEED_CAPACITY: usize = 64;

/// Sparse reassembly state for one in-flight recording.
struct RecordingBuffer {
    chunks: Vec<Option<Vec<u8>>>,
    total: usize,
    mime_type: Option<String>,
    recording_start_timestamp: Option<u64>,
    created_at: u64,
}

impl RecordingBuffer {
    fn new(total: usize) -> Self {
        Self {
            chunks: vec![None; total],
            total,
            mime_type: None,
            recording_start_timestamp: None,
            created_at: now_ms(),
        }
    }

    fn have(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_some()).count()
    }

    fn missing(&self) -> Vec<usize> {
        self.chunks
            .iter()
            .enumerate()
            .filter(|(_, chunk)| chunk.is_none())
            .map(|(index, _)| index)
            .collect()
    }
}

/// Keyed store of in-flight recording buffers.
pub struct RecordingAssembler {
    buffers: DashMap<String, Arc<Mutex<RecordingBuffer>>>,
    feed: broadcast::Sender<StoreEvent>,
    max_chunk_bytes: usize,
    max_total_chunks: usize,
}

impl Default for RecordingAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingAssembler {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            buffers: DashMap::new(),
            feed,
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            max_total_chunks: DEFAULT_MAX_TOTAL_CHUNKS,
        }
    }

    /// Override the per-chunk and chunk-count caps.
    pub fn with_limits(mut self, max_chunk_bytes: usize, max_total_chunks: usize) -> Self {
        self.max_chunk_bytes = max_chunk_bytes;
        self.max_total_chunks = max_total_chunks;
        self
    }

    /// Subscribe to assembler notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.feed.subscribe()
    }

    /// Buffer one chunk. Re-sending an index is last-write-wins, so client
    /// retries are harmless.
    #[allow(clippy::too_many_arguments)]
    pub async fn put_chunk(
        &self,
        recording_id: &str,
        index: usize,
        total: usize,
        payload_b64: &str,
        mime_type: Option<String>,
        recording_start_timestamp: Option<u64>,
    ) -> Result<ChunkReceipt> {
        if recording_id.trim().is_empty() {
            return Err(FlowcapError::InvalidArgument(
                "chunk is missing a recording id".into(),
            ));
        }
        if total == 0 {
            return Err(FlowcapError::InvalidArgument(
                "declared chunk count must be at least 1".into(),
            ));
        }
        if total > self.max_total_chunks {
            return Err(FlowcapError::InvalidArgument(format!(
                "declared chunk count {} exceeds the limit of {}",
                total, self.max_total_chunks
            )));
        }
        if index >= total {
            return Err(FlowcapError::InvalidArgument(format!(
                "chunk index {index} out of range for {total} chunks"
            )));
        }

        let bytes = BASE64.decode(payload_b64).map_err(|e| {
            FlowcapError::InvalidArgument(format!("chunk {index} is not valid base64: {e}"))
        })?;
        if bytes.len() > self.max_chunk_bytes {
            return Err(FlowcapError::InvalidArgument(format!(
                "chunk {index} is {} bytes, over the {} byte limit",
                bytes.len(),
                self.max_chunk_bytes
            )));
        }

        let slot = match self.buffers.entry(recording_id.to_string()) {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                debug!(
                    target: "flowcap::recording",
                    "Opened buffer for recording {} ({} chunks expected)",
                    recording_id, total
                );
                let slot = Arc::new(Mutex::new(RecordingBuffer::new(total)));
                vacant.insert(slot.clone());
                slot
            }
        };

        let mut buffer = slot.lock().await;
        if buffer.total != total {
            return Err(FlowcapError::InvalidArgument(format!(
                "recording {} declared {} chunks, chunk {} claims {}",
                recording_id, buffer.total, index, total
            )));
        }
        if buffer.chunks[index].replace(bytes).is_some() {
            debug!(
                target: "flowcap::recording",
                "Rewrote chunk {} of recording {} (client retry)",
                index, recording_id
            );
        }
        if buffer.mime_type.is_none() {
            buffer.mime_type = mime_type;
        }
        if buffer.recording_start_timestamp.is_none() {
            buffer.recording_start_timestamp = recording_start_timestamp;
        }

        Ok(ChunkReceipt {
            received: index,
            have: buffer.have(),
            total: buffer.total,
        })
    }

    /// Concatenate a fully received buffer into a [`CompletedRecording`].
    ///
    /// With gaps the buffer is retained and the error lists the missing
    /// indices, so the client re-sends just those and completes again. On
    /// success the buffer is dropped; chunk retries arriving afterwards are
    /// acknowledged into a detached buffer that is never read.
    pub async fn complete(
        &self,
        recording_id: &str,
        duration_ms: Option<u64>,
        mime_type: Option<String>,
        completion_timestamp: Option<u64>,
    ) -> Result<CompletedRecording> {
        let slot = self
            .buffers
            .get(recording_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FlowcapError::UnknownRecording(recording_id.to_string()))?;

        let mut buffer = slot.lock().await;
        let missing = buffer.missing();
        if !missing.is_empty() {
            debug!(
                target: "flowcap::recording",
                "Recording {} completion refused: {} of {} chunks missing",
                recording_id,
                missing.len(),
                buffer.total
            );
            return Err(FlowcapError::IncompleteChunks {
                recording_id: recording_id.to_string(),
                missing,
            });
        }

        let mut data = Vec::new();
        for chunk in buffer.chunks.iter_mut() {
            if let Some(bytes) = chunk.take() {
                data.extend_from_slice(&bytes);
            }
        }
        let sha256 = format!("{:x}", Sha256::digest(&data));
        let size_bytes = data.len();

        let completed = CompletedRecording {
            recording_id: recording_id.to_string(),
            mime_type: buffer
                .mime_type
                .clone()
                .or(mime_type)
                .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
            duration_ms,
            completion_timestamp: completion_timestamp.unwrap_or_else(now_ms),
            recording_start_timestamp: buffer.recording_start_timestamp,
            sha256,
            size_bytes,
            data,
        };

        // Remove while the lock is held, same discipline as the session
        // store: a buffer re-created under this id must not be swept away.
        let total = buffer.total;
        self.buffers.remove(recording_id);
        drop(buffer);

        info!(
            target: "flowcap::recording",
            "Recording {} assembled: {} bytes from {} chunks",
            recording_id, size_bytes, total
        );
        let _ = self.feed.send(StoreEvent::RecordingCompleted {
            recording_id: recording_id.to_string(),
            size_bytes,
        });
        Ok(completed)
    }

    /// Drop buffers that have been open longer than `max_age_ms`.
    ///
    /// Abandoned uploads (crashed tabs, lost clients) otherwise hold their
    /// chunks forever; this runs from the same sweep as session cleanup.
    pub async fn evict_stale(&self, max_age_ms: u64) -> usize {
        let cutoff = now_ms().saturating_sub(max_age_ms);
        let snapshot: Vec<(String, Arc<Mutex<RecordingBuffer>>)> = self
            .buffers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut removed = 0;
        for (recording_id, slot) in snapshot {
            let buffer = slot.lock().await;
            if buffer.created_at >= cutoff {
                continue;
            }
            let have = buffer.have();
            let total = buffer.total;
            self.buffers.remove(&recording_id);
            drop(buffer);
            removed += 1;
            info!(
                target: "flowcap::recording",
                "Evicted stale buffer for recording {} ({}/{} chunks received)",
                recording_id, have, total
            );
        }
        removed
    }

    /// Number of in-flight buffers (racy, for stats only).
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn b64(bytes: &[u8]) -> String {
        BASE64.encode(bytes)
    }

    #[tokio::test]
    async fn test_in_order_round_trip() {
        let assembler = RecordingAssembler::new();
        assembler
            .put_chunk("rec_1", 0, 3, &b64(b"hel"), Some("video/webm".into()), None)
            .await
            .unwrap();
        assembler
            .put_chunk("rec_1", 1, 3, &b64(b"lo "), None, None)
            .await
            .unwrap();
        let receipt = assembler
            .put_chunk("rec_1", 2, 3, &b64(b"world"), None, None)
            .await
            .unwrap();
        assert_eq!(receipt.have, 3);

        let recording = assembler
            .complete("rec_1", Some(4_000), None, Some(1_000))
            .await
            .unwrap();
        assert_eq!(recording.data, b"hello world");
        assert_eq!(recording.size_bytes, 11);
        assert_eq!(recording.mime_type, "video/webm");
        assert_eq!(recording.completion_timestamp, 1_000);
    }

    #[tokio::test]
    async fn test_out_of_order_and_duplicate_chunks() {
        let assembler = RecordingAssembler::new();
        for (index, payload) in [(2usize, b"cc".as_ref()), (0, b"aa"), (1, b"bb"), (0, b"aa")] {
            assembler
                .put_chunk("rec_1", index, 3, &b64(payload), None, None)
                .await
                .unwrap();
        }
        let recording = assembler.complete("rec_1", None, None, None).await.unwrap();
        assert_eq!(recording.data, b"aabbcc");
    }

    #[tokio::test]
    async fn test_incomplete_reports_missing_and_retains_buffer() {
        let assembler = RecordingAssembler::new();
        assembler
            .put_chunk("rec_1", 1, 4, &b64(b"b"), None, None)
            .await
            .unwrap();

        let err = assembler.complete("rec_1", None, None, None).await.unwrap_err();
        match err {
            FlowcapError::IncompleteChunks { missing, .. } => {
                assert_eq!(missing, vec![0, 2, 3]);
            }
            other => panic!("expected IncompleteChunks, got {other:?}"),
        }

        // fill the gaps and complete on the retained buffer
        for index in [0usize, 2, 3] {
            assembler
                .put_chunk("rec_1", index, 4, &b64(b"x"), None, None)
                .await
                .unwrap();
        }
        let recording = assembler.complete("rec_1", None, None, None).await.unwrap();
        assert_eq!(recording.data, b"xbxx");
    }

    #[tokio::test]
    async fn test_unknown_recording() {
        let assembler = RecordingAssembler::new();
        let err = assembler.complete("rec_missing", None, None, None).await.unwrap_err();
        assert!(matches!(err, FlowcapError::UnknownRecording(_)));
    }

    #[tokio::test]
    async fn test_validation_rejections() {
        let assembler = RecordingAssembler::new().with_limits(4, 8);

        assert!(assembler
            .put_chunk("", 0, 1, &b64(b"x"), None, None)
            .await
            .is_err());
        assert!(assembler
            .put_chunk("rec_1", 0, 0, &b64(b"x"), None, None)
            .await
            .is_err());
        assert!(assembler
            .put_chunk("rec_1", 3, 3, &b64(b"x"), None, None)
            .await
            .is_err());
        assert!(assembler
            .put_chunk("rec_1", 0, 9, &b64(b"x"), None, None)
            .await
            .is_err());
        assert!(assembler
            .put_chunk("rec_1", 0, 1, "not base64!!!", None, None)
            .await
            .is_err());
        // over the 4-byte decoded cap
        assert!(assembler
            .put_chunk("rec_1", 0, 1, &b64(b"toolarge"), None, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_total_mismatch_rejected() {
        let assembler = RecordingAssembler::new();
        assembler
            .put_chunk("rec_1", 0, 3, &b64(b"a"), None, None)
            .await
            .unwrap();
        let err = assembler
            .put_chunk("rec_1", 1, 5, &b64(b"b"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowcapError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_first_mime_type_wins() {
        let assembler = RecordingAssembler::new();
        assembler
            .put_chunk("rec_1", 0, 2, &b64(b"a"), None, Some(500))
            .await
            .unwrap();
        assembler
            .put_chunk("rec_1", 1, 2, &b64(b"b"), Some("video/mp4".into()), Some(900))
            .await
            .unwrap();

        let recording = assembler.complete("rec_1", None, None, None).await.unwrap();
        assert_eq!(recording.mime_type, "video/mp4");
        assert_eq!(recording.recording_start_timestamp, Some(500));
    }

    #[tokio::test]
    async fn test_completion_mime_fallback() {
        let assembler = RecordingAssembler::new();
        assembler
            .put_chunk("rec_1", 0, 1, &b64(b"a"), None, None)
            .await
            .unwrap();
        let recording = assembler
            .complete("rec_1", None, Some("video/mp4".into()), None)
            .await
            .unwrap();
        assert_eq!(recording.mime_type, "video/mp4");

        assembler
            .put_chunk("rec_2", 0, 1, &b64(b"a"), None, None)
            .await
            .unwrap();
        let recording = assembler.complete("rec_2", None, None, None).await.unwrap();
        assert_eq!(recording.mime_type, "video/webm");
    }

    #[tokio::test]
    async fn test_complete_drops_buffer() {
        let assembler = RecordingAssembler::new();
        assembler
            .put_chunk("rec_1", 0, 1, &b64(b"a"), None, None)
            .await
            .unwrap();
        assembler.complete("rec_1", None, None, None).await.unwrap();

        let err = assembler.complete("rec_1", None, None, None).await.unwrap_err();
        assert!(matches!(err, FlowcapError::UnknownRecording(_)));
        assert!(assembler.is_empty());
    }

    #[tokio::test]
    async fn test_evict_stale_only_sweeps_old_buffers() {
        let assembler = RecordingAssembler::new();
        assembler
            .put_chunk("rec_fresh", 0, 2, &b64(b"a"), None, None)
            .await
            .unwrap();

        // a fresh buffer survives any sane TTL
        assert_eq!(assembler.evict_stale(DEFAULT_BUFFER_TTL_MS).await, 0);
        assert_eq!(assembler.len(), 1);

        // TTL of zero sweeps everything currently buffered
        assert_eq!(assembler.evict_stale(0).await, 1);
        assert!(assembler.is_empty());
    }

    #[tokio::test]
    async fn test_checksum_matches_payload() {
        let assembler = RecordingAssembler::new();
        assembler
            .put_chunk("rec_1", 0, 1, &b64(b"hello"), None, None)
            .await
            .unwrap();
        let recording = assembler.complete("rec_1", None, None, None).await.unwrap();
        assert_eq!(recording.sha256, format!("{:x}", Sha256::digest(b"hello")));
    }

    proptest! {
        /// Any payload, any split, any arrival order: completion returns the
        /// exact original bytes.
        #[test]
        fn prop_reassembly_round_trips(
            payload in proptest::collection::vec(any::<u8>(), 1..2048),
            chunk_count in 1usize..16,
            seed in any::<u64>(),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            runtime.block_on(async {
                let assembler = RecordingAssembler::new();
                let chunk_size = payload.len().div_ceil(chunk_count);
                let chunks: Vec<&[u8]> = payload.chunks(chunk_size).collect();
                let total = chunks.len();

                // deterministic shuffle of upload order from the seed
                let mut order: Vec<usize> = (0..total).collect();
                let mut state = seed | 1;
                for i in (1..total).rev() {
                    state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    let j = (state >> 33) as usize % (i + 1);
                    order.swap(i, j);
                }

                for &index in &order {
                    assembler
                        .put_chunk("rec_p", index, total, &BASE64.encode(chunks[index]), None, None)
                        .await
                        .unwrap();
                }
                // retry one chunk to exercise last-write-wins
                assembler
                    .put_chunk("rec_p", order[0], total, &BASE64.encode(chunks[order[0]]), None, None)
                    .await
                    .unwrap();

                let recording = assembler.complete("rec_p", None, None, None).await.unwrap();
                assert_eq!(recording.data, payload);
            });
        }
    }
}
