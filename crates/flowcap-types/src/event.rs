//! Raw browser interaction events.
//!
//! These are the events the instrumented capture client POSTs to the server,
//! one per user interaction. They arrive at high frequency and possibly out
//! of order; the session store re-sorts on append.

use serde::{Deserialize, Serialize};

/// Prefixes the capture client uses for session ids it invented before a
/// durable id reached it.
const TEMP_ID_PREFIXES: [&str; 2] = ["temp_", "temp-"];

/// Returns true if a session id was assigned client-side before a durable
/// id was known.
pub fn is_temporary_id(session_id: &str) -> bool {
    TEMP_ID_PREFIXES.iter().any(|p| session_id.starts_with(p))
}

/// Kind of browser interaction captured by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Mouse click on any element.
    Click,
    /// Value change on a form control.
    Input,
    /// Location change within the same tab.
    Navigate,
    /// Scroll position change (very high frequency).
    Scroll,
    /// Keystroke; the key descriptor rides in `value`.
    Key,
    /// Form submission.
    Submit,
    /// Initial document load.
    PageLoad,
    /// Pointer hover; some capture builds emit these. Always noise downstream.
    Hover,
}

impl EventKind {
    /// Wire name of the kind, as used in dedup fingerprints.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Click => "click",
            EventKind::Input => "input",
            EventKind::Navigate => "navigate",
            EventKind::Scroll => "scroll",
            EventKind::Key => "key",
            EventKind::Submit => "submit",
            EventKind::PageLoad => "page_load",
            EventKind::Hover => "hover",
        }
    }
}

/// Viewport coordinates of a pointer interaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}

/// Descriptor of the DOM element an event targeted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementInfo {
    /// Lowercase tag name (`a`, `button`, `input`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// The element's `type` attribute (`text`, `email`, `password`, `file`, ...).
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    /// Visible text content, truncated client-side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Placeholder attribute for form controls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// Whether the control carries the `required` attribute.
    #[serde(default)]
    pub required: bool,
}

/// A single interaction event as captured in the browser.
///
/// Field names on the wire are camelCase to match the capture client's
/// payloads. Unknown kinds are rejected at deserialization, which is the
/// ingestion boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBrowserEvent {
    /// What happened.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Client-side capture time, epoch milliseconds.
    pub timestamp: u64,
    /// Session the client believes this event belongs to. May carry a
    /// temporary marker (see [`is_temporary_id`]).
    pub session_id: String,
    /// Page URL at capture time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// CSS selector of the target element.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Target element descriptor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<ElementInfo>,
    /// Input value, or key descriptor for `key` events (`"Enter"`, `"Ctrl+C"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Pointer position for click/hover events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    /// Client-computed dedup fingerprint; the server recomputes when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup_fingerprint: Option<String>,
}

impl RawBrowserEvent {
    /// Create a bare event; optional fields start empty.
    pub fn new(kind: EventKind, timestamp: u64, session_id: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp,
            session_id: session_id.into(),
            url: None,
            selector: None,
            element: None,
            value: None,
            coordinates: None,
            dedup_fingerprint: None,
        }
    }

    /// Whether the session id was assigned before a durable id was known.
    pub fn is_temporary_session(&self) -> bool {
        is_temporary_id(&self.session_id)
    }

    /// Lowercase tag name of the target element, if captured.
    pub fn tag(&self) -> Option<&str> {
        self.element.as_ref().and_then(|e| e.tag.as_deref())
    }

    /// The target element's `type` attribute, if captured.
    pub fn input_type(&self) -> Option<&str> {
        self.element.as_ref().and_then(|e| e.input_type.as_deref())
    }

    /// Visible text of the target element, if captured.
    pub fn text(&self) -> Option<&str> {
        self.element.as_ref().and_then(|e| e.text.as_deref())
    }

    /// Placeholder of the target element, if captured.
    pub fn placeholder(&self) -> Option<&str> {
        self.element.as_ref().and_then(|e| e.placeholder.as_deref())
    }

    /// Whether the target element carries the `required` attribute.
    pub fn is_required(&self) -> bool {
        self.element.as_ref().is_some_and(|e| e.required)
    }
}
