//! Attaching completed recordings to workflow sessions.
//!
//! A recording carries no session id, only a time span. The linker scores
//! every unlinked session by temporal overlap with that span and attaches
//! the recording to the best one, if any overlap is meaningful.

use tracing::info;

use flowcap_types::LinkOutcome;

use crate::events::StoreEvent;
use crate::store::SessionStore;

/// Assumed recording span when the client declared no duration.
pub const DEFAULT_RECORDING_SPAN_MS: u64 = 8_000;

/// Grace added on both sides of a session's window; capture start and
/// recording start rarely align exactly.
pub const SESSION_GRACE_MS: u64 = 1_500;

/// A link needs strictly more overlap than this.
pub const MIN_LINK_OVERLAP_MS: u64 = 500;

/// Overlap between a recording span and a session window with grace applied.
fn overlap_ms(rec_start: u64, rec_end: u64, session_start: u64, session_last: u64) -> u64 {
    let window_start = session_start.saturating_sub(SESSION_GRACE_MS);
    let window_end = session_last + SESSION_GRACE_MS;
    let lo = rec_start.max(window_start);
    let hi = rec_end.min(window_end);
    hi.saturating_sub(lo)
}

impl SessionStore {
    /// Attach a completed recording to the best-overlapping session.
    ///
    /// Sessions already carrying a recording are skipped. Ties break toward
    /// the earlier-started session, then the smaller id, so the outcome does
    /// not depend on map iteration order. Returns `linked: false` when no
    /// session qualifies; that is a normal outcome, not an error.
    pub async fn link_recording(
        &self,
        recording_id: &str,
        completion_timestamp: u64,
        duration_ms: Option<u64>,
    ) -> LinkOutcome {
        let span = duration_ms.unwrap_or(DEFAULT_RECORDING_SPAN_MS);
        let rec_start = completion_timestamp.saturating_sub(span);
        let rec_end = completion_timestamp;

        // Score every candidate without holding more than one lock at a time.
        let mut scored = Vec::new();
        for (session_id, slot) in self.snapshot() {
            let guard = slot.lock().await;
            if guard.retired || guard.session.recording_id.is_some() {
                continue;
            }
            let overlap = overlap_ms(
                rec_start,
                rec_end,
                guard.session.start_time,
                guard.session.last_event_time,
            );
            let start_time = guard.session.start_time;
            drop(guard);
            if overlap > MIN_LINK_OVERLAP_MS {
                scored.push((overlap, start_time, session_id, slot));
            }
        }
        scored.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });

        // First successful link wins; losing a race to another recording
        // moves on to the next-best candidate.
        for (overlap, _, session_id, slot) in scored {
            let mut guard = slot.lock().await;
            if guard.retired || guard.session.recording_id.is_some() {
                continue;
            }
            guard.session.recording_id = Some(recording_id.to_string());
            drop(guard);

            info!(
                target: "flowcap::linker",
                "Linked recording {} to session {} ({} ms overlap)",
                recording_id, session_id, overlap
            );
            let _ = self.feed.send(StoreEvent::RecordingLinked {
                recording_id: recording_id.to_string(),
                session_id: session_id.clone(),
                overlap_ms: overlap,
            });
            return LinkOutcome::attached(session_id, overlap);
        }

        info!(
            target: "flowcap::linker",
            "No session overlaps recording {} (window {}..{})",
            recording_id, rec_start, rec_end
        );
        LinkOutcome::unlinked()
    }
}
