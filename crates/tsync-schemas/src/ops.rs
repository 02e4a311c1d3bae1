//! Operational records: rolling API status, request log, queued notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rolling health of the upstream integration. One row per platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiStatus {
    /// Last HTTP status observed; 0 before the first call or after a transport failure.
    pub last_status: u16,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    /// API calls are refused until this instant when the last status was an error.
    pub next_callable_at: Option<DateTime<Utc>>,
    /// Set once a credential alert has been queued for the current failure streak.
    pub credential_alert_sent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub at: DateTime<Utc>,
    pub platform: String,
    pub method: String,
    pub uri: String,
    pub status: Option<u16>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    CredentialFailure,
    DuplicateUserMatch,
    MergeFailure,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::CredentialFailure => "credential_failure",
            NotificationKind::DuplicateUserMatch => "duplicate_user_match",
            NotificationKind::MergeFailure => "merge_failure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "credential_failure" => Some(NotificationKind::CredentialFailure),
            "duplicate_user_match" => Some(NotificationKind::DuplicateUserMatch),
            "merge_failure" => Some(NotificationKind::MergeFailure),
            _ => None,
        }
    }
}

/// Queued, fire-and-forget operator message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Storage id; `None` until queued.
    pub id: Option<i64>,
    pub kind: NotificationKind,
    /// What the message is about, e.g. a contact GUID or merge request id.
    pub subject: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}
