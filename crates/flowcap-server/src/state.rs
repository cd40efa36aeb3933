//! Shared application state.

use crate::config::Config;
use flowcap_core::{RecordingArchive, RecordingAssembler, SessionStore};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub session_store: Arc<SessionStore>,
    pub assembler: Arc<RecordingAssembler>,
    pub archive: Arc<RecordingArchive>,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let session_store =
            Arc::new(SessionStore::new().with_dedup_window(config.dedup_window_ms));
        let assembler = Arc::new(
            RecordingAssembler::new().with_limits(config.max_chunk_bytes, config.max_total_chunks),
        );
        let archive = Arc::new(RecordingArchive::new());

        Self {
            session_store,
            assembler,
            archive,
            config,
        }
    }
}
