//! Periodic maintenance sweep.
//!
//! One background task ages out idle sessions and abandoned recording
//! buffers, then announces the result on the feed.

use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Spawn the background sweep task.
pub fn spawn_sweep(state: Arc<AppState>) {
    let period = Duration::from_secs(state.config.sweep_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // interval fires immediately on the first tick
        ticker.tick().await;
        loop {
            ticker.tick().await;

            let removed_sessions = state
                .session_store
                .cleanup_older_than(state.config.session_max_age_ms())
                .await;
            let removed_buffers = state
                .assembler
                .evict_stale(state.config.recording_buffer_ttl_ms())
                .await;

            if removed_sessions > 0 || removed_buffers > 0 {
                info!(
                    target: "flowcap::sweep",
                    "Sweep removed {} session(s) and {} buffer(s)",
                    removed_sessions, removed_buffers
                );
                state
                    .session_store
                    .announce_sweep(removed_sessions, removed_buffers);
            } else {
                debug!(target: "flowcap::sweep", "Sweep found nothing to remove");
            }
        }
    });
}
