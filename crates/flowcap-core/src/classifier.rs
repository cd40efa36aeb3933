//! Classifying raw events into the critical-event view.
//!
//! The classifier answers "what did the user actually do" over a noisy
//! capture: it drops filler, buckets the rest into categories, names each
//! action with a snake_case label, and grades how much it matters.

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use flowcap_types::{
    CriticalEvent, CriticalEventKind, EventContext, EventKind, Importance, RawBrowserEvent,
};

/// Selector vocabulary that makes a click/key count as a form control.
static FORM_CONTROL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)input|textarea|select|field|checkbox|radio").unwrap());

/// URL/selector vocabulary for credential flows.
static AUTH_CONTEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)auth|login|sign-?in").unwrap());

static EMAIL_HINT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)e-?mail").unwrap());

static PASSWORD_HINT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)password|passwd").unwrap());

static UPLOAD_HINT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)upload|attach|\bfile\b").unwrap());

/// Ordered verb table for button clicks; the first hit names the action.
/// Visible text is searched before the selector.
const BUTTON_VERBS: &[(&str, &str, Importance)] = &[
    ("submit", "submit_form", Importance::High),
    ("apply", "submit_application", Importance::High),
    ("login", "login", Importance::High),
    ("log in", "login", Importance::High),
    ("sign in", "login", Importance::High),
    ("signin", "login", Importance::High),
    ("save", "save", Importance::High),
    ("confirm", "confirm", Importance::High),
    ("upload", "upload_file", Importance::High),
    ("next", "next_step", Importance::Medium),
    ("continue", "next_step", Importance::Medium),
    ("back", "previous_step", Importance::Medium),
    ("previous", "previous_step", Importance::Medium),
    ("search", "search", Importance::Low),
    ("add", "add_item", Importance::Low),
    ("remove", "remove_item", Importance::Low),
    ("cancel", "cancel", Importance::Low),
];

/// Form vocabulary for context extraction, matched over url + selector.
const FORM_HINTS: &[(&str, &str)] = &[
    ("login", "login"),
    ("signin", "login"),
    ("sign-in", "login"),
    ("register", "registration"),
    ("signup", "registration"),
    ("sign-up", "registration"),
    ("application", "application"),
    ("apply", "application"),
    ("contact", "contact"),
];

/// Wizard step vocabulary for context extraction.
const STEP_HINTS: [&str; 5] = ["personal", "contact", "experience", "education", "skills"];

const TAG_FORM_CONTROLS: [&str; 3] = ["input", "textarea", "select"];

const LABEL_MAX_CHARS: usize = 80;

/// Classify one raw event. `None` means "not workflow-relevant".
pub fn classify(event: &RawBrowserEvent) -> Option<CriticalEvent> {
    if is_noise(event) {
        return None;
    }
    let context = extract_context(event);
    let (kind, action, importance) = if is_form_interaction(event) {
        classify_form(event, &context)
    } else if matches!(event.kind, EventKind::Navigate | EventKind::PageLoad) {
        classify_navigation(event)
    } else if event.kind == EventKind::Click {
        classify_button(event)?
    } else {
        return None;
    };

    Some(CriticalEvent {
        id: Uuid::new_v4(),
        kind,
        action,
        element: element_label(event),
        context,
        timestamp: event.timestamp,
        importance,
    })
}

/// Classify a whole event list, keeping input order.
pub fn classify_events(events: &[RawBrowserEvent]) -> Vec<CriticalEvent> {
    events.iter().filter_map(classify).collect()
}

/// Filler that never reaches the category predicates.
fn is_noise(event: &RawBrowserEvent) -> bool {
    match event.kind {
        EventKind::Scroll | EventKind::Hover => true,
        EventKind::Click => {
            event.text().is_none_or(|t| t.trim().is_empty())
                && event.placeholder().is_none_or(|p| p.trim().is_empty())
        }
        EventKind::Key => !has_form_tag(event),
        _ => false,
    }
}

fn has_form_tag(event: &RawBrowserEvent) -> bool {
    event
        .tag()
        .is_some_and(|tag| TAG_FORM_CONTROLS.contains(&tag.to_ascii_lowercase().as_str()))
}

fn is_form_interaction(event: &RawBrowserEvent) -> bool {
    match event.kind {
        EventKind::Input | EventKind::Submit => true,
        EventKind::Click | EventKind::Key => {
            has_form_tag(event)
                || event
                    .selector
                    .as_deref()
                    .is_some_and(|s| FORM_CONTROL.is_match(s))
        }
        _ => false,
    }
}

fn classify_form(
    event: &RawBrowserEvent,
    context: &EventContext,
) -> (CriticalEventKind, String, Importance) {
    if is_file_field(event) {
        return (
            CriticalEventKind::FileUpload,
            "upload_file".to_string(),
            Importance::High,
        );
    }
    if is_password_field(event) {
        return (
            CriticalEventKind::Authentication,
            "enter_password".to_string(),
            Importance::High,
        );
    }
    if is_email_field(event) {
        let kind = if in_auth_context(event, context) {
            CriticalEventKind::Authentication
        } else {
            CriticalEventKind::FormInteraction
        };
        return (kind, "enter_email".to_string(), Importance::High);
    }
    match event.kind {
        EventKind::Submit => (
            CriticalEventKind::FormInteraction,
            "submit_form".to_string(),
            Importance::High,
        ),
        EventKind::Input => {
            let filled = event.value.as_deref().is_some_and(|v| !v.is_empty());
            let importance = if event.is_required() {
                Importance::High
            } else if filled {
                Importance::Medium
            } else {
                Importance::Low
            };
            (
                CriticalEventKind::FormInteraction,
                "fill_field".to_string(),
                importance,
            )
        }
        EventKind::Key => {
            if event.value.as_deref() == Some("Enter") {
                (
                    CriticalEventKind::FormInteraction,
                    "press_enter".to_string(),
                    Importance::Medium,
                )
            } else {
                (
                    CriticalEventKind::FormInteraction,
                    "keystroke".to_string(),
                    Importance::Low,
                )
            }
        }
        _ => (
            CriticalEventKind::FormInteraction,
            "select_option".to_string(),
            Importance::Medium,
        ),
    }
}

fn classify_navigation(event: &RawBrowserEvent) -> (CriticalEventKind, String, Importance) {
    let action = if event.kind == EventKind::PageLoad {
        "load_page"
    } else {
        "navigate"
    };
    (
        CriticalEventKind::Navigation,
        action.to_string(),
        Importance::Low,
    )
}

fn classify_button(event: &RawBrowserEvent) -> Option<(CriticalEventKind, String, Importance)> {
    if let Some(text) = event.text() {
        if let Some(hit) = verb_hit(&text.to_lowercase()) {
            return Some(hit);
        }
    }
    event
        .selector
        .as_deref()
        .and_then(|selector| verb_hit(&selector.to_lowercase()))
}

fn verb_hit(haystack: &str) -> Option<(CriticalEventKind, String, Importance)> {
    for (verb, action, importance) in BUTTON_VERBS {
        if haystack.contains(verb) {
            let kind = if *action == "upload_file" {
                CriticalEventKind::FileUpload
            } else {
                CriticalEventKind::ButtonAction
            };
            return Some((kind, (*action).to_string(), *importance));
        }
    }
    None
}

fn is_file_field(event: &RawBrowserEvent) -> bool {
    if event
        .input_type()
        .is_some_and(|t| t.eq_ignore_ascii_case("file"))
    {
        return true;
    }
    let haystack = format!(
        "{} {}",
        event.selector.as_deref().unwrap_or(""),
        event.placeholder().unwrap_or("")
    );
    UPLOAD_HINT.is_match(&haystack)
}

fn is_password_field(event: &RawBrowserEvent) -> bool {
    if event
        .input_type()
        .is_some_and(|t| t.eq_ignore_ascii_case("password"))
    {
        return true;
    }
    let haystack = format!(
        "{} {}",
        event.selector.as_deref().unwrap_or(""),
        event.placeholder().unwrap_or("")
    );
    PASSWORD_HINT.is_match(&haystack)
}

fn is_email_field(event: &RawBrowserEvent) -> bool {
    if event
        .input_type()
        .is_some_and(|t| t.eq_ignore_ascii_case("email"))
    {
        return true;
    }
    let haystack = format!(
        "{} {}",
        event.selector.as_deref().unwrap_or(""),
        event.placeholder().unwrap_or("")
    );
    if EMAIL_HINT.is_match(&haystack) {
        return true;
    }
    // a typed value shaped like an address also marks the field
    event.kind == EventKind::Input
        && event.value.as_deref().is_some_and(|v| {
            v.contains('@') && v.contains('.') && !v.contains(char::is_whitespace)
        })
}

fn in_auth_context(event: &RawBrowserEvent, context: &EventContext) -> bool {
    if context.form.as_deref() == Some("login") {
        return true;
    }
    let haystack = format!(
        "{} {}",
        event.url.as_deref().unwrap_or(""),
        event.selector.as_deref().unwrap_or("")
    );
    AUTH_CONTEXT.is_match(&haystack)
}

fn extract_context(event: &RawBrowserEvent) -> EventContext {
    let url = event.url.as_deref().unwrap_or("");
    let haystack = format!("{} {}", url, event.selector.as_deref().unwrap_or("")).to_lowercase();

    let form = FORM_HINTS
        .iter()
        .find(|(hint, _)| haystack.contains(hint))
        .map(|(_, name)| (*name).to_string());
    let step = STEP_HINTS
        .iter()
        .find(|hint| haystack.contains(*hint))
        .map(|hint| (*hint).to_string());

    EventContext {
        page: page_from_url(url),
        form,
        step,
    }
}

/// Last non-empty path segment, falling back to the host, then "unknown".
fn page_from_url(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = rest.split(['?', '#']).next().unwrap_or("");
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let host = segments.next();
    match segments.last() {
        Some(page) => page.to_string(),
        None => host.map_or_else(|| "unknown".to_string(), str::to_string),
    }
}

/// Human label for the target: visible text, then placeholder, then selector.
fn element_label(event: &RawBrowserEvent) -> Option<String> {
    let label = event
        .text()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| event.placeholder().filter(|p| !p.trim().is_empty()))
        .or(event.selector.as_deref())?;
    Some(label.trim().chars().take(LABEL_MAX_CHARS).collect())
}
