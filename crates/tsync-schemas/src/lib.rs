//! tsync-schemas
//!
//! Shared record shapes for the synchronization engine. Every crate in the
//! workspace speaks these types; none of them carry behaviour beyond small
//! parse/format helpers and the composite cursor ordering.

mod instance;
mod kind;
mod merge;
mod ops;
mod resources;
mod watermark;

pub use instance::{EnrolmentInstance, InstanceSource};
pub use kind::{ResourceKind, Scope};
pub use merge::ContactMergeRequest;
pub use ops::{ApiStatus, Notification, NotificationKind, RequestLogEntry};
pub use resources::{
    Contact, ContactRecord, Event, EventStatus, EventTemplate, OnlineActivity, OutcomeFields,
    Registration, RegistrationRecord, RegistrationStatus, TemplateStatus,
};
pub use watermark::{Cursor, Watermark};

/// Epoch-zero timestamp used as the origin cursor and the "never" schedule value.
pub fn epoch() -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::<chrono::Utc>::from(std::time::UNIX_EPOCH)
}
