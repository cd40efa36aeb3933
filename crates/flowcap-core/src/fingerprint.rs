//! Dedup fingerprints for raw events.
//!
//! The capture client computes a fingerprint before transmission; the server
//! recomputes it when absent and uses it to suppress duplicates (retries,
//! double-fired DOM handlers) inside a short window.

use flowcap_types::RawBrowserEvent;

/// Width of the fingerprint time bucket. Identical events inside one bucket
/// collapse to the same fingerprint.
pub const FINGERPRINT_BUCKET_MS: u64 = 200;

/// `"{type}|{bucket}|{url}"`, with an empty url segment when none was
/// captured. Pure and total: any event fingerprints deterministically.
pub fn fingerprint(event: &RawBrowserEvent) -> String {
    let bucket = event.timestamp / FINGERPRINT_BUCKET_MS;
    format!(
        "{}|{}|{}",
        event.kind.as_str(),
        bucket,
        event.url.as_deref().unwrap_or("")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcap_types::EventKind;

    fn click_at(timestamp: u64, url: Option<&str>) -> RawBrowserEvent {
        let mut event = RawBrowserEvent::new(EventKind::Click, timestamp, "sess_1");
        event.url = url.map(str::to_string);
        event
    }

    #[test]
    fn test_same_bucket_same_fingerprint() {
        let a = fingerprint(&click_at(1000, Some("https://a.test/x")));
        let b = fingerprint(&click_at(1199, Some("https://a.test/x")));
        assert_eq!(a, b);
    }

    #[test]
    fn test_bucket_boundary_splits() {
        let a = fingerprint(&click_at(1199, Some("https://a.test/x")));
        let b = fingerprint(&click_at(1200, Some("https://a.test/x")));
        assert_ne!(a, b);
    }

    #[test]
    fn test_missing_url_is_empty_segment() {
        assert_eq!(fingerprint(&click_at(450, None)), "click|2|");
    }

    #[test]
    fn test_kind_in_fingerprint() {
        let click = fingerprint(&click_at(100, Some("https://a.test/x")));
        let mut scroll_event = click_at(100, Some("https://a.test/x"));
        scroll_event.kind = EventKind::Scroll;
        assert_ne!(click, fingerprint(&scroll_event));
    }
}
