//! Upstream resource snapshots and the local rows that mirror them.
//!
//! A snapshot (`Event`, `Contact`, ...) carries only what the upstream system
//! reports. A record (`ContactRecord`, `RegistrationRecord`) wraps a snapshot
//! together with the local-only state the engine maintains alongside it, so an
//! upstream refresh can never clobber a user binding or a pending outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Cursor;

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateStatus {
    Active,
    Draft,
    Archived,
    Unknown,
}

impl TemplateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateStatus::Active => "Active",
            TemplateStatus::Draft => "Draft",
            TemplateStatus::Archived => "Archived",
            TemplateStatus::Unknown => "Unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "Active" => TemplateStatus::Active,
            "Draft" => TemplateStatus::Draft,
            "Archived" => TemplateStatus::Archived,
            _ => TemplateStatus::Unknown,
        }
    }
}

/// Lifecycle status shared by events and online activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Draft,
    Active,
    Completed,
    Cancelled,
    Unknown,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "Draft",
            EventStatus::Active => "Active",
            EventStatus::Completed => "Completed",
            EventStatus::Cancelled => "Cancelled",
            EventStatus::Unknown => "Unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "Draft" => EventStatus::Draft,
            "Active" => EventStatus::Active,
            "Completed" => EventStatus::Completed,
            "Cancelled" => EventStatus::Cancelled,
            _ => EventStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Approved,
    Completed,
    Cancelled,
    Pending,
    Unknown,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Approved => "Approved",
            RegistrationStatus::Completed => "Completed",
            RegistrationStatus::Cancelled => "Cancelled",
            RegistrationStatus::Pending => "Pending",
            RegistrationStatus::Unknown => "Unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "Approved" => RegistrationStatus::Approved,
            "Completed" => RegistrationStatus::Completed,
            "Cancelled" => RegistrationStatus::Cancelled,
            "Pending" => RegistrationStatus::Pending,
            _ => RegistrationStatus::Unknown,
        }
    }

    /// Statuses that grant the bound user an enrolment.
    pub fn grants_enrolment(&self) -> bool {
        matches!(
            self,
            RegistrationStatus::Approved | RegistrationStatus::Completed
        )
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTemplate {
    pub platform: String,
    pub source_id: i64,
    pub source_guid: String,
    pub code: String,
    pub name: String,
    pub status: TemplateStatus,
    pub source_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub platform: String,
    pub source_id: i64,
    pub source_guid: String,
    pub template_guid: Option<String>,
    pub code: String,
    pub start_at: Option<DateTime<Utc>>,
    pub finish_at: Option<DateTime<Utc>>,
    pub status: EventStatus,
    pub source_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineActivity {
    pub platform: String,
    pub source_id: i64,
    pub source_guid: String,
    pub template_guid: Option<String>,
    pub code: String,
    pub name: String,
    pub status: EventStatus,
    pub source_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub platform: String,
    pub source_id: i64,
    pub source_guid: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub code: Option<String>,
    pub source_modified: DateTime<Utc>,
}

/// Progress and result fields the engine pushes back upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeFields {
    pub grade: Option<String>,
    pub outcome: Option<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub progress_status: Option<String>,
    pub progress_percent: Option<f64>,
}

impl OutcomeFields {
    pub fn is_empty(&self) -> bool {
        self == &OutcomeFields::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub platform: String,
    pub source_id: i64,
    pub source_guid: String,
    pub contact_guid: String,
    pub event_guid: Option<String>,
    pub online_activity_guid: Option<String>,
    pub status: RegistrationStatus,
    /// Outcome values upstream currently holds; decides add vs replace on push.
    pub upstream_outcome: OutcomeFields,
    pub source_modified: DateTime<Utc>,
}

macro_rules! impl_cursor {
    ($($t:ty),*) => {
        $(impl $t {
            /// Position of this snapshot in the composite `(modified, id)` order.
            pub fn cursor(&self) -> Cursor {
                Cursor::new(self.source_modified, self.source_id)
            }
        })*
    };
}

impl_cursor!(EventTemplate, Event, OnlineActivity, Contact, Registration);

// ---------------------------------------------------------------------------
// Local rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: i64,
    pub contact: Contact,
    pub user_id: Option<i64>,
    /// Set when user association found more than one candidate.
    pub user_association_failed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub id: i64,
    pub instance_id: i64,
    pub user_id: Option<i64>,
    pub registration: Registration,
    /// Locally computed outcome awaiting push.
    pub pending_outcome: OutcomeFields,
    pub update_source: bool,
    pub expired: bool,
    /// The user the enrolment service last enrolled for this row.
    pub enrolled_user_id: Option<i64>,
}
