//! Core capture pipeline for Flowcap: session aggregation, recording
//! reassembly, temporal linking, pruning, and critical-event classification.
//! Transport-agnostic; the HTTP surface lives in `flowcap-server`.

mod archive;
mod classifier;
mod error;
mod events;
mod fingerprint;
mod linker;
mod pruner;
mod reassembly;
mod store;

pub use archive::RecordingArchive;
pub use classifier::{classify, classify_events};
pub use error::FlowcapError;
pub use events::StoreEvent;
pub use fingerprint::{fingerprint, FINGERPRINT_BUCKET_MS};
pub use linker::{DEFAULT_RECORDING_SPAN_MS, MIN_LINK_OVERLAP_MS, SESSION_GRACE_MS};
pub use pruner::{prune, PruneConfig};
pub use reassembly::{
    RecordingAssembler, DEFAULT_BUFFER_TTL_MS, DEFAULT_MAX_CHUNK_BYTES, DEFAULT_MAX_TOTAL_CHUNKS,
};
pub use store::{
    AppendOutcome, SessionStore, DEDUP_WINDOW_MS, DEFAULT_MAX_AGE_MS, MERGE_WINDOW_MS,
};

/// Result type for Flowcap operations.
pub type Result<T> = std::result::Result<T, FlowcapError>;
