//! Workflow sessions aggregated from raw events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{is_temporary_id, RawBrowserEvent};

/// A reconstructed browsing workflow: every event the capture layer
/// attributed to one user task, ordered by timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSession {
    pub session_id: String,
    /// Timestamp of the earliest event, epoch ms.
    pub start_time: u64,
    /// Timestamp of the latest event, epoch ms.
    pub last_event_time: u64,
    /// Ascending by timestamp.
    pub events: Vec<RawBrowserEvent>,
    /// Screen recording attached by the linker, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_id: Option<String>,
}

impl WorkflowSession {
    /// Create a session seeded by its first event.
    pub fn seeded(event: RawBrowserEvent) -> Self {
        let timestamp = event.timestamp;
        Self {
            session_id: event.session_id.clone(),
            start_time: timestamp,
            last_event_time: timestamp,
            events: vec![event],
            recording_id: None,
        }
    }

    /// Whether this session still carries a client-assigned temporary id.
    pub fn is_temporary(&self) -> bool {
        is_temporary_id(&self.session_id)
    }

    /// Append one event, restoring timestamp order and the start/last bounds.
    ///
    /// Out-of-order arrival is normal (the capture client batches and
    /// retries), so ordering is an invariant of the stored session rather
    /// than of the wire.
    pub fn push_event(&mut self, event: RawBrowserEvent) {
        self.events.push(event);
        self.restore_order();
    }

    /// Absorb events migrated from another session (temp-to-global merge).
    pub fn absorb(&mut self, events: Vec<RawBrowserEvent>) {
        self.events.extend(events);
        self.restore_order();
    }

    fn restore_order(&mut self) {
        // Stable sort: equal timestamps keep arrival order.
        self.events.sort_by_key(|e| e.timestamp);
        if let Some(first) = self.events.first() {
            self.start_time = first.timestamp;
        }
        if let Some(last) = self.events.last() {
            self.last_event_time = last.timestamp;
        }
    }
}

/// Compact session view for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub start_time: u64,
    pub last_event_time: u64,
    pub event_count: usize,
    pub temporary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_id: Option<String>,
    /// RFC 3339 mirror of `start_time`, for dashboards.
    pub started_at: DateTime<Utc>,
    /// RFC 3339 mirror of `last_event_time`.
    pub last_event_at: DateTime<Utc>,
}

impl From<&WorkflowSession> for SessionSummary {
    fn from(session: &WorkflowSession) -> Self {
        Self {
            session_id: session.session_id.clone(),
            start_time: session.start_time,
            last_event_time: session.last_event_time,
            event_count: session.events.len(),
            temporary: session.is_temporary(),
            recording_id: session.recording_id.clone(),
            started_at: datetime_from_ms(session.start_time),
            last_event_at: datetime_from_ms(session.last_event_time),
        }
    }
}

/// Epoch-ms to chrono, clamping out-of-range values to the epoch.
fn datetime_from_ms(ms: u64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms as i64).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn event_at(timestamp: u64) -> RawBrowserEvent {
        RawBrowserEvent::new(EventKind::Click, timestamp, "sess_1")
    }

    #[test]
    fn test_push_event_restores_order() {
        let mut session = WorkflowSession::seeded(event_at(500));
        session.push_event(event_at(100));
        session.push_event(event_at(900));
        session.push_event(event_at(300));

        let times: Vec<u64> = session.events.iter().map(|e| e.timestamp).collect();
        assert_eq!(times, vec![100, 300, 500, 900]);
        assert_eq!(session.start_time, 100);
        assert_eq!(session.last_event_time, 900);
    }

    #[test]
    fn test_absorb_merges_and_reorders() {
        let mut global = WorkflowSession::seeded(event_at(5000));
        global.absorb(vec![
            RawBrowserEvent::new(EventKind::PageLoad, 0, "temp_1"),
            RawBrowserEvent::new(EventKind::Click, 200, "temp_1"),
        ]);

        assert_eq!(global.events.len(), 3);
        assert_eq!(global.start_time, 0);
        assert_eq!(global.last_event_time, 5000);
        assert_eq!(global.session_id, "sess_1");
    }

    #[test]
    fn test_summary_reflects_session() {
        let mut session = WorkflowSession::seeded(event_at(1_712_000_000_000));
        session.push_event(event_at(1_712_000_004_000));
        session.recording_id = Some("rec_9".into());

        let summary = SessionSummary::from(&session);
        assert_eq!(summary.event_count, 2);
        assert_eq!(summary.start_time, 1_712_000_000_000);
        assert_eq!(summary.recording_id.as_deref(), Some("rec_9"));
        assert!(!summary.temporary);
        assert_eq!(summary.started_at.timestamp_millis(), 1_712_000_000_000);
    }
}
