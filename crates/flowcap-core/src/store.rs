//! Keyed in-memory store of workflow sessions.
//!
//! Concurrency discipline: the dashmap shard lock is held only long enough
//! to resolve or insert a slot; every mutation happens under the slot's own
//! async mutex, with no I/O and no awaits inside the critical section.
//! Operations on different session ids therefore run in parallel, while
//! operations on one id are serialized. Deleting a slot marks it `retired`
//! under its lock before removal, so a racing append re-resolves instead of
//! mutating an orphan; events are never lost to a delete/append race.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use flowcap_types::{is_temporary_id, RawBrowserEvent, SessionSummary, WorkflowSession};

use crate::error::FlowcapError;
use crate::events::StoreEvent;
use crate::fingerprint::fingerprint;
use crate::Result;

/// A temporary session merges into a durable one when their start times lie
/// within this window.
pub const MERGE_WINDOW_MS: u64 = 30_000;

/// How long a seen fingerprint keeps suppressing duplicates.
pub const DEDUP_WINDOW_MS: u64 = 10_000;

/// Default cleanup age: sessions idle longer than this are swept.
pub const DEFAULT_MAX_AGE_MS: u64 = 24 * 60 * 60 * 1000;

/// Hard cap on remembered fingerprints per session.
const MAX_SEEN_FINGERPRINTS: usize = 512;

/// Broadcast capacity for store notifications.
const FEED_CAPACITY: usize = 256;

pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// What `append` did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    /// Session the event ended up in. Differs from the id on the event after
    /// a temp-to-global merge.
    pub session_id: String,
    /// A new session record was created.
    pub created: bool,
    /// A temporary record was folded into a durable session on this append.
    pub merged: bool,
    /// The event was a duplicate inside the dedup window and was dropped.
    pub deduplicated: bool,
}

/// Guarded per-session state.
pub(crate) struct SessionSlot {
    pub(crate) session: WorkflowSession,
    /// Recently seen fingerprints with their ingest times, oldest first.
    seen: VecDeque<(String, u64)>,
    /// Set under the lock when the slot leaves the map. A waiter holding a
    /// stale `Arc` must re-resolve instead of mutating.
    pub(crate) retired: bool,
}

impl SessionSlot {
    fn seeded(event: RawBrowserEvent) -> Self {
        Self {
            session: WorkflowSession::seeded(event),
            seen: VecDeque::new(),
            retired: false,
        }
    }

    /// Purge expired fingerprints, then record this one. Returns true if it
    /// was already present (the event is a duplicate).
    fn check_duplicate(&mut self, fp: &str, now: u64, window_ms: u64) -> bool {
        purge_seen(&mut self.seen, now, window_ms);
        if self.seen.iter().any(|(seen_fp, _)| seen_fp == fp) {
            return true;
        }
        if self.seen.len() >= MAX_SEEN_FINGERPRINTS {
            self.seen.pop_front();
        }
        self.seen.push_back((fp.to_string(), now));
        false
    }
}

fn purge_seen(seen: &mut VecDeque<(String, u64)>, now: u64, window_ms: u64) {
    while let Some((_, at)) = seen.front() {
        if now.saturating_sub(*at) > window_ms {
            seen.pop_front();
        } else {
            break;
        }
    }
}

/// In-memory workflow session store.
///
/// One instance per server, owned by the application state; constructed at
/// startup and dropped at shutdown.
pub struct SessionStore {
    pub(crate) sessions: DashMap<String, Arc<Mutex<SessionSlot>>>,
    pub(crate) feed: broadcast::Sender<StoreEvent>,
    dedup_window_ms: u64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            sessions: DashMap::new(),
            feed,
            dedup_window_ms: DEDUP_WINDOW_MS,
        }
    }

    /// Override the dedup window (0 disables dedup entirely).
    pub fn with_dedup_window(mut self, window_ms: u64) -> Self {
        self.dedup_window_ms = window_ms;
        self
    }

    /// Subscribe to store notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.feed.subscribe()
    }

    /// Ingest one event, applying dedup and temporary-session merging.
    pub async fn append(&self, event: RawBrowserEvent) -> Result<AppendOutcome> {
        if event.session_id.trim().is_empty() {
            return Err(FlowcapError::InvalidArgument(
                "event is missing a session id".into(),
            ));
        }

        let fp = event
            .dedup_fingerprint
            .clone()
            .unwrap_or_else(|| fingerprint(&event));

        loop {
            // Temporary-id events first try to land in a nearby durable
            // session instead of growing a temporary record.
            if event.is_temporary_session() {
                if let Some((global_id, slot)) = self.nearest_global(event.timestamp).await {
                    // Lock order everywhere: durable target, then temp donor.
                    let mut target = slot.lock().await;
                    if target.retired {
                        continue;
                    }
                    if self.is_duplicate(&mut target, &fp) {
                        return Ok(AppendOutcome {
                            session_id: global_id,
                            created: false,
                            merged: false,
                            deduplicated: true,
                        });
                    }
                    let migrated = self.migrate_temp_record(&event.session_id, &mut target).await;
                    let temp_id = event.session_id.clone();
                    let timestamp = event.timestamp;
                    let kind = event.kind.as_str();
                    target.session.push_event(event);
                    drop(target);

                    if migrated > 0 {
                        info!(
                            target: "flowcap::session",
                            "Merged temporary session {} into {} ({} events migrated)",
                            temp_id, global_id, migrated
                        );
                        let _ = self.feed.send(StoreEvent::SessionMerged {
                            from: temp_id,
                            into: global_id.clone(),
                            migrated_events: migrated,
                        });
                    }
                    let _ = self.feed.send(StoreEvent::EventIngested {
                        session_id: global_id.clone(),
                        kind,
                        timestamp,
                    });
                    return Ok(AppendOutcome {
                        session_id: global_id,
                        created: false,
                        merged: true,
                        deduplicated: false,
                    });
                }
            }

            // Plain upsert under the event's own id.
            let (slot, created) = match self.sessions.entry(event.session_id.clone()) {
                Entry::Occupied(occupied) => (occupied.get().clone(), false),
                Entry::Vacant(vacant) => {
                    let slot = Arc::new(Mutex::new(SessionSlot::seeded(event.clone())));
                    vacant.insert(slot.clone());
                    (slot, true)
                }
            };

            let mut guard = slot.lock().await;
            if guard.retired {
                continue;
            }
            if self.is_duplicate(&mut guard, &fp) {
                return Ok(AppendOutcome {
                    session_id: event.session_id,
                    created: false,
                    merged: false,
                    deduplicated: true,
                });
            }

            let session_id = event.session_id.clone();
            let timestamp = event.timestamp;
            let kind = event.kind.as_str();

            let mut absorbed = Vec::new();
            if created {
                // The slot was seeded with this event; don't push it twice.
                // A brand-new durable session may reconcile temp records that
                // accumulated before its id propagated to the capture layer.
                if !event.is_temporary_session() {
                    absorbed = self.absorb_nearby_temps(&mut guard, timestamp).await;
                }
            } else {
                guard.session.push_event(event);
            }
            drop(guard);

            if created {
                debug!(
                    target: "flowcap::session",
                    "Created session {} (first event {} at {})",
                    session_id, kind, timestamp
                );
            }
            let merged = !absorbed.is_empty();
            for (temp_id, migrated) in absorbed {
                let _ = self.feed.send(StoreEvent::SessionMerged {
                    from: temp_id,
                    into: session_id.clone(),
                    migrated_events: migrated,
                });
            }
            let _ = self.feed.send(StoreEvent::EventIngested {
                session_id: session_id.clone(),
                kind,
                timestamp,
            });
            return Ok(AppendOutcome {
                session_id,
                created,
                merged,
                deduplicated: false,
            });
        }
    }

    /// Full session by id.
    pub async fn get(&self, session_id: &str) -> Result<WorkflowSession> {
        let slot = self
            .resolve(session_id)
            .ok_or_else(|| FlowcapError::SessionNotFound(session_id.to_string()))?;
        let guard = slot.lock().await;
        if guard.retired {
            return Err(FlowcapError::SessionNotFound(session_id.to_string()));
        }
        Ok(guard.session.clone())
    }

    /// Summaries of all sessions, newest start first.
    pub async fn list(&self) -> Vec<SessionSummary> {
        let mut summaries = Vec::new();
        for (_, slot) in self.snapshot() {
            let guard = slot.lock().await;
            if !guard.retired {
                summaries.push(SessionSummary::from(&guard.session));
            }
        }
        summaries.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        summaries
    }

    /// Delete one session. Returns false if it did not exist.
    pub async fn delete(&self, session_id: &str) -> bool {
        let Some(slot) = self.resolve(session_id) else {
            return false;
        };
        let mut guard = slot.lock().await;
        if guard.retired {
            return false;
        }
        guard.retired = true;
        self.sessions.remove(session_id);
        true
    }

    /// Sweep sessions whose last event is older than `max_age_ms`.
    ///
    /// Takes each per-session lock before deleting, so an in-flight append
    /// either lands before the sweep observes the session or re-resolves
    /// after it.
    pub async fn cleanup_older_than(&self, max_age_ms: u64) -> usize {
        let cutoff = now_ms().saturating_sub(max_age_ms);
        let mut removed = 0;
        for (session_id, slot) in self.snapshot() {
            let mut guard = slot.lock().await;
            if guard.retired || guard.session.last_event_time >= cutoff {
                continue;
            }
            guard.retired = true;
            self.sessions.remove(&session_id);
            removed += 1;
            debug!(
                target: "flowcap::session",
                "Swept session {} (idle since {})",
                session_id, guard.session.last_event_time
            );
        }
        if removed > 0 {
            info!(target: "flowcap::session", "Cleanup removed {} session(s)", removed);
        }
        removed
    }

    /// Announce a finished maintenance sweep on the feed.
    pub fn announce_sweep(&self, removed_sessions: usize, removed_buffers: usize) {
        let _ = self.feed.send(StoreEvent::SweepCompleted {
            removed_sessions,
            removed_buffers,
        });
    }

    /// Number of live sessions (racy, for stats only).
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn is_duplicate(&self, slot: &mut SessionSlot, fp: &str) -> bool {
        if self.dedup_window_ms == 0 {
            return false;
        }
        let duplicate = slot.check_duplicate(fp, now_ms(), self.dedup_window_ms);
        if duplicate {
            debug!(
                target: "flowcap::ingest",
                "Dropped duplicate event for session {} (fingerprint {})",
                slot.session.session_id, fp
            );
        }
        duplicate
    }

    fn resolve(&self, session_id: &str) -> Option<Arc<Mutex<SessionSlot>>> {
        self.sessions.get(session_id).map(|entry| entry.value().clone())
    }

    /// Clone out (id, slot) pairs so no shard lock is held across awaits.
    pub(crate) fn snapshot(&self) -> Vec<(String, Arc<Mutex<SessionSlot>>)> {
        self.sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Closest durable session whose start lies within the merge window.
    async fn nearest_global(&self, anchor_ts: u64) -> Option<(String, Arc<Mutex<SessionSlot>>)> {
        let mut best: Option<(u64, String, Arc<Mutex<SessionSlot>>)> = None;
        for (session_id, slot) in self.snapshot() {
            if is_temporary_id(&session_id) {
                continue;
            }
            let guard = slot.lock().await;
            if guard.retired {
                continue;
            }
            let distance = guard.session.start_time.abs_diff(anchor_ts);
            drop(guard);
            if distance > MERGE_WINDOW_MS {
                continue;
            }
            let closer = match &best {
                None => true,
                Some((best_distance, best_id, _)) => {
                    distance < *best_distance
                        || (distance == *best_distance && session_id < *best_id)
                }
            };
            if closer {
                best = Some((distance, session_id, slot));
            }
        }
        best.map(|(_, session_id, slot)| (session_id, slot))
    }

    /// Move every event recorded under a temporary id into `target`, then
    /// drop the temporary record. Returns the number of migrated events.
    async fn migrate_temp_record(&self, temp_id: &str, target: &mut SessionSlot) -> usize {
        let Some(slot) = self.resolve(temp_id) else {
            return 0;
        };
        let mut donor = slot.lock().await;
        if donor.retired {
            return 0;
        }
        donor.retired = true;
        let events = std::mem::take(&mut donor.session.events);
        let migrated = events.len();
        target.session.absorb(events);
        // Remove while still holding the donor lock: a re-created slot under
        // the same key must never be swept away with it.
        self.sessions.remove(temp_id);
        migrated
    }

    /// Fold temporary sessions near `anchor_ts` into a new durable session.
    /// Returns (temp id, migrated event count) per donor.
    async fn absorb_nearby_temps(
        &self,
        target: &mut SessionSlot,
        anchor_ts: u64,
    ) -> Vec<(String, usize)> {
        let mut absorbed = Vec::new();
        for (session_id, slot) in self.snapshot() {
            if !is_temporary_id(&session_id) {
                continue;
            }
            let mut donor = slot.lock().await;
            if donor.retired || donor.session.start_time.abs_diff(anchor_ts) > MERGE_WINDOW_MS {
                continue;
            }
            donor.retired = true;
            let events = std::mem::take(&mut donor.session.events);
            let migrated = events.len();
            target.session.absorb(events);
            self.sessions.remove(&session_id);
            drop(donor);
            info!(
                target: "flowcap::session",
                "Absorbed temporary session {} into {} ({} events)",
                session_id, target.session.session_id, migrated
            );
            absorbed.push((session_id, migrated));
        }
        absorbed
    }
}
