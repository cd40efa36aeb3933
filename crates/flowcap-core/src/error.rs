//! Error types for flowcap.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowcapError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Unknown recording: {0}")]
    UnknownRecording(String),

    #[error("Recording {recording_id} is incomplete: missing chunks {missing:?}")]
    IncompleteChunks {
        recording_id: String,
        /// Ascending chunk indices still unreceived. The buffer is kept so
        /// the client can re-send just these.
        missing: Vec<usize>,
    },

    #[error("Deadline expired before the operation started")]
    Timeout,
}
