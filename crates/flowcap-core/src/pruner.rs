//! Heuristic pruning of low-signal browser events.
//!
//! Capture clients emit every scroll tick, keystroke, and intermediate input
//! value. The pruner reduces a session's event list to the events that still
//! describe the workflow: structural anchors, throttled interaction samples,
//! and one final value per input field.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use flowcap_types::{EventKind, RawBrowserEvent};

/// Selector/text vocabulary that marks a click as interactive.
static IMPORTANT_CLICK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)btn|button|submit|link|nav|menu|toggle|plus|minus|add|remove").unwrap()
});

/// Key values that carry a Ctrl/Meta style modifier.
static MODIFIER_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)ctrl|control|meta|cmd").unwrap());

/// Tags whose clicks are always considered interactive.
const INTERACTIVE_TAGS: [&str; 5] = ["a", "button", "input", "select", "textarea"];

/// Thresholds for a pruning pass. Every field has a default, so a partial
/// override (from a request body or a config file) fills in the rest.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PruneConfig {
    /// Minimum spacing between kept scroll events.
    pub scroll_min_gap_ms: u64,
    /// Minimum spacing between kept key events.
    pub key_min_gap_ms: u64,
    /// Plain keys this close after an input event are still kept.
    pub key_after_input_ms: u64,
    /// Minimum spacing between kept clicks on the same selector.
    pub click_min_gap_ms: u64,
    /// Kept clicks allowed per selector inside the burst window,
    /// regardless of spacing.
    pub click_burst_max: usize,
    /// Rolling window for the burst allowance.
    pub click_burst_window_ms: u64,
    /// Input values are retained only this close before the final submit.
    pub input_essential_window_ms: u64,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            scroll_min_gap_ms: 600,
            key_min_gap_ms: 200,
            key_after_input_ms: 1_500,
            click_min_gap_ms: 250,
            click_burst_max: 2,
            click_burst_window_ms: 1_000,
            input_essential_window_ms: 60_000,
        }
    }
}

#[derive(Debug, Default)]
struct ClickThrottle {
    last_kept: Option<u64>,
    /// Timestamps of kept clicks still inside the burst window.
    recent: Vec<u64>,
}

/// Accumulator threaded through one pass over the (sorted) events.
#[derive(Debug, Default)]
struct PruneState {
    last_kept_scroll: Option<u64>,
    last_kept_key: Option<u64>,
    last_input_seen: Option<u64>,
    clicks: HashMap<String, ClickThrottle>,
    /// Last retained input event per selector; collapsed into the output.
    inputs: HashMap<String, RawBrowserEvent>,
}

impl PruneState {
    fn keep_scroll(&mut self, timestamp: u64, config: &PruneConfig) -> bool {
        let keep = self
            .last_kept_scroll
            .is_none_or(|prev| timestamp.saturating_sub(prev) >= config.scroll_min_gap_ms);
        if keep {
            self.last_kept_scroll = Some(timestamp);
        }
        keep
    }

    fn keep_key(&mut self, event: &RawBrowserEvent, config: &PruneConfig) -> bool {
        let near_input = self
            .last_input_seen
            .is_some_and(|seen| event.timestamp.saturating_sub(seen) <= config.key_after_input_ms);
        if !is_special_key(event) && !near_input {
            return false;
        }
        let keep = self
            .last_kept_key
            .is_none_or(|prev| event.timestamp.saturating_sub(prev) >= config.key_min_gap_ms);
        if keep {
            self.last_kept_key = Some(event.timestamp);
        }
        keep
    }

    fn keep_click(&mut self, event: &RawBrowserEvent, config: &PruneConfig) -> bool {
        if !is_important_click(event) {
            return false;
        }
        let throttle = self
            .clicks
            .entry(event.selector.clone().unwrap_or_default())
            .or_default();
        throttle
            .recent
            .retain(|&ts| event.timestamp.saturating_sub(ts) < config.click_burst_window_ms);
        let spaced = throttle
            .last_kept
            .is_none_or(|prev| event.timestamp.saturating_sub(prev) >= config.click_min_gap_ms);
        let keep = spaced || throttle.recent.len() < config.click_burst_max;
        if keep {
            throttle.last_kept = Some(event.timestamp);
            throttle.recent.push(event.timestamp);
        }
        keep
    }

    /// Inputs are never kept verbatim; the last essential value per selector
    /// is re-emitted at the end of the pass.
    fn note_input(&mut self, event: &RawBrowserEvent, last_submit: Option<u64>, config: &PruneConfig) {
        self.last_input_seen = Some(event.timestamp);
        let has_value = event.value.as_deref().is_some_and(|v| !v.is_empty());
        if has_value && input_is_essential(event.timestamp, last_submit, config) {
            self.inputs
                .insert(event.selector.clone().unwrap_or_default(), event.clone());
        }
    }
}

fn is_special_key(event: &RawBrowserEvent) -> bool {
    event
        .value
        .as_deref()
        .is_some_and(|v| v == "Enter" || MODIFIER_KEY.is_match(v))
}

fn is_important_click(event: &RawBrowserEvent) -> bool {
    if event
        .tag()
        .is_some_and(|tag| INTERACTIVE_TAGS.contains(&tag.to_ascii_lowercase().as_str()))
    {
        return true;
    }
    let text = event.text().unwrap_or("");
    if matches!(text.trim(), "+" | "-" | "\u{2212}") || IMPORTANT_CLICK.is_match(text) {
        return true;
    }
    event
        .selector
        .as_deref()
        .is_some_and(|selector| IMPORTANT_CLICK.is_match(selector))
}

/// Values typed long before the final submit are abandoned drafts.
fn input_is_essential(timestamp: u64, last_submit: Option<u64>, config: &PruneConfig) -> bool {
    match last_submit {
        Some(submit) => {
            timestamp <= submit
                && timestamp >= submit.saturating_sub(config.input_essential_window_ms)
        }
        None => true,
    }
}

/// Reduce `events` to the ones that still tell the workflow's story.
///
/// The input is not mutated; the result is a fresh, timestamp-ascending list.
pub fn prune(events: &[RawBrowserEvent], config: &PruneConfig) -> Vec<RawBrowserEvent> {
    let mut ordered: Vec<&RawBrowserEvent> = events.iter().collect();
    ordered.sort_by_key(|event| event.timestamp);

    let last_submit = ordered
        .iter()
        .filter(|event| event.kind == EventKind::Submit)
        .map(|event| event.timestamp)
        .max();

    let mut state = PruneState::default();
    let mut kept: Vec<RawBrowserEvent> = Vec::new();
    for event in ordered {
        match event.kind {
            EventKind::PageLoad | EventKind::Navigate | EventKind::Submit => {
                kept.push(event.clone());
            }
            EventKind::Scroll => {
                if state.keep_scroll(event.timestamp, config) {
                    kept.push(event.clone());
                }
            }
            EventKind::Key => {
                if state.keep_key(event, config) {
                    kept.push(event.clone());
                }
            }
            EventKind::Click => {
                if state.keep_click(event, config) {
                    kept.push(event.clone());
                }
            }
            EventKind::Input => state.note_input(event, last_submit, config),
            EventKind::Hover => {}
        }
    }

    kept.extend(state.inputs.into_values());
    kept.sort_by_key(|event| event.timestamp);
    kept
}
