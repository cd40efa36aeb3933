//! Critical events: the compact "what the user actually did" view.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of a critical event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalEventKind {
    /// Filling or operating a form control.
    FormInteraction,
    /// Moving between pages.
    Navigation,
    /// Clicking an action button or link.
    ButtonAction,
    /// Credential entry (login/signin vocabulary).
    Authentication,
    /// Attaching a file.
    FileUpload,
}

/// How much a critical event matters for understanding the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    High,
    Medium,
    Low,
}

/// Where in the site/form flow an event happened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    /// Page identifier derived from the URL path.
    pub page: String,
    /// Form vocabulary hit (login, registration, application, contact).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<String>,
    /// Wizard step vocabulary hit (personal, contact, experience, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
}

/// One classified, workflow-relevant user action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: CriticalEventKind,
    /// snake_case action label (`submit_form`, `next_step`, `enter_email`, ...).
    pub action: String,
    /// Best-effort human label of the target element.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    pub context: EventContext,
    /// Timestamp of the underlying raw event, epoch ms.
    pub timestamp: u64,
    pub importance: Importance,
}
