//! Collaborator contracts.
//!
//! The engine owns no IO. Persistence, locking, enrolment, the user directory,
//! notification delivery and the clock are injected behind these traits;
//! `tsync-db` provides the Postgres store and lock service, `tsync-testkit`
//! provides in-memory versions of everything.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tsync_schemas::{
    ApiStatus, Contact, ContactMergeRequest, ContactRecord, EnrolmentInstance, Event,
    EventTemplate, Notification, OnlineActivity, OutcomeFields, Registration,
    RegistrationRecord, RequestLogEntry, ResourceKind, Scope, Watermark,
};

/// What an upsert-by-`(platform, source_guid)` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Identical snapshot already stored; nothing was written.
    Unchanged,
}

/// How a merge request left the pending set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeResolution {
    /// `active = false`.
    Resolved,
    /// `merge_failed = true`; `active` untouched.
    Failed,
}

#[async_trait]
pub trait SyncStore: Send + Sync {
    // --- watermarks -------------------------------------------------------

    async fn load_watermark(
        &self,
        platform: &str,
        kind: ResourceKind,
        scope: Scope,
    ) -> anyhow::Result<Option<Watermark>>;

    /// Persists every field of the watermark in one write.
    async fn save_watermark(&self, watermark: &Watermark) -> anyhow::Result<()>;

    async fn list_watermarks(&self, platform: &str) -> anyhow::Result<Vec<Watermark>>;

    // --- api status, request log, notifications ---------------------------

    async fn load_api_status(&self, platform: &str) -> anyhow::Result<ApiStatus>;

    async fn save_api_status(&self, platform: &str, status: &ApiStatus) -> anyhow::Result<()>;

    async fn append_request_log(&self, entry: &RequestLogEntry) -> anyhow::Result<()>;

    /// Deletes entries older than `before`; returns how many went.
    async fn purge_request_log(&self, before: DateTime<Utc>) -> anyhow::Result<u64>;

    async fn enqueue_notification(&self, notification: &Notification) -> anyhow::Result<i64>;

    /// Oldest first.
    async fn pending_notifications(&self, limit: u32) -> anyhow::Result<Vec<Notification>>;

    async fn delete_notification(&self, id: i64) -> anyhow::Result<()>;

    // --- catalog mirrors ----------------------------------------------------

    async fn upsert_event_template(&self, template: &EventTemplate)
        -> anyhow::Result<UpsertOutcome>;

    async fn upsert_event(&self, event: &Event) -> anyhow::Result<UpsertOutcome>;

    async fn upsert_online_activity(&self, activity: &OnlineActivity)
        -> anyhow::Result<UpsertOutcome>;

    async fn find_event(&self, platform: &str, guid: &str) -> anyhow::Result<Option<Event>>;

    async fn find_online_activity(
        &self,
        platform: &str,
        guid: &str,
    ) -> anyhow::Result<Option<OnlineActivity>>;

    // --- enrolment instances ------------------------------------------------

    async fn list_instances(&self, platform: &str) -> anyhow::Result<Vec<EnrolmentInstance>>;

    async fn find_instance(&self, id: i64) -> anyhow::Result<Option<EnrolmentInstance>>;

    async fn instances_for_source(
        &self,
        platform: &str,
        source_guid: &str,
    ) -> anyhow::Result<Vec<EnrolmentInstance>>;

    async fn update_instance(
        &self,
        id: i64,
        end_at: Option<DateTime<Utc>>,
        enabled: bool,
    ) -> anyhow::Result<()>;

    // --- contacts -------------------------------------------------------------

    /// Upsert the snapshot; the user binding of an existing row is kept.
    async fn upsert_contact(
        &self,
        contact: &Contact,
    ) -> anyhow::Result<(ContactRecord, UpsertOutcome)>;

    async fn find_contact(&self, platform: &str, guid: &str)
        -> anyhow::Result<Option<ContactRecord>>;

    /// Contacts referenced by the instance's registrations.
    async fn contacts_for_instance(&self, instance_id: i64) -> anyhow::Result<Vec<ContactRecord>>;

    async fn bind_contact_user(
        &self,
        platform: &str,
        guid: &str,
        user_id: Option<i64>,
    ) -> anyhow::Result<()>;

    async fn set_contact_association_failed(
        &self,
        platform: &str,
        guid: &str,
        failed: bool,
    ) -> anyhow::Result<()>;

    async fn delete_contact(&self, platform: &str, guid: &str) -> anyhow::Result<()>;

    // --- merge requests ---------------------------------------------------

    /// Insert, or refresh the upstream fields of an existing request while
    /// keeping its local `active` and `merge_failed` flags.
    async fn upsert_merge_request(
        &self,
        request: &ContactMergeRequest,
    ) -> anyhow::Result<UpsertOutcome>;

    /// Active, not failed, targeting `destination_guid`.
    async fn pending_merge_requests(
        &self,
        platform: &str,
        destination_guid: &str,
    ) -> anyhow::Result<Vec<ContactMergeRequest>>;

    async fn close_merge_request(
        &self,
        platform: &str,
        request_id: i64,
        resolution: MergeResolution,
        source_user_id: Option<i64>,
        destination_user_id: Option<i64>,
    ) -> anyhow::Result<()>;

    async fn failed_merge_requests(&self, platform: &str)
        -> anyhow::Result<Vec<ContactMergeRequest>>;

    /// Oldest still-active failed request targeting `destination_guid`. While
    /// one exists the destination's chain waits for an operator.
    async fn failed_merge_for_destination(
        &self,
        platform: &str,
        destination_guid: &str,
    ) -> anyhow::Result<Option<i64>>;

    // --- registrations ----------------------------------------------------

    /// Upsert the snapshot under `instance_id`; pending outcome, push flag,
    /// expiry and enrolled user of an existing row are kept.
    async fn upsert_registration(
        &self,
        instance_id: i64,
        registration: &Registration,
        user_id: Option<i64>,
    ) -> anyhow::Result<(RegistrationRecord, UpsertOutcome)>;

    async fn find_registration(
        &self,
        platform: &str,
        guid: &str,
    ) -> anyhow::Result<Option<RegistrationRecord>>;

    async fn delete_registration(&self, id: i64) -> anyhow::Result<()>;

    /// Registrations whose instance no longer exists.
    async fn orphan_registrations(&self, platform: &str)
        -> anyhow::Result<Vec<RegistrationRecord>>;

    async fn registrations_for_instance(
        &self,
        instance_id: i64,
    ) -> anyhow::Result<Vec<RegistrationRecord>>;

    /// Rows with `update_source` set.
    async fn registrations_pending_push(
        &self,
        instance_id: i64,
    ) -> anyhow::Result<Vec<RegistrationRecord>>;

    /// Local outcome written by the surrounding application; flags the row
    /// for the next outcome push.
    async fn queue_outcome(&self, id: i64, outcome: &OutcomeFields) -> anyhow::Result<()>;

    /// Upstream now holds `upstream`; clears `update_source`.
    async fn mark_registration_pushed(
        &self,
        id: i64,
        upstream: &OutcomeFields,
    ) -> anyhow::Result<()>;

    async fn mark_registration_expired(&self, id: i64) -> anyhow::Result<()>;

    /// Records which user the enrolment service now holds for the row.
    async fn mark_registration_enrolled(&self, id: i64, user_id: Option<i64>)
        -> anyhow::Result<()>;
}

/// A held lease. Released explicitly; expires on its own if the holder dies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    pub name: String,
    pub token: String,
}

#[async_trait]
pub trait LockService: Send + Sync {
    /// Waits up to `timeout`; `None` when someone else still holds it.
    async fn acquire(&self, name: &str, timeout: Duration) -> anyhow::Result<Option<LockLease>>;

    async fn release(&self, lease: LockLease) -> anyhow::Result<()>;
}

/// Course enrolment side effects. Calls are idempotent on the collaborator side.
#[async_trait]
pub trait EnrolmentService: Send + Sync {
    async fn enrol(&self, instance_id: i64, user_id: i64) -> anyhow::Result<()>;

    async fn unenrol(&self, instance_id: i64, user_id: i64) -> anyhow::Result<()>;

    /// End access without removing the enrolment record.
    async fn expire(&self, instance_id: i64, user_id: i64) -> anyhow::Result<()>;
}

/// Local user accounts.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_users_by_email(&self, email: &str) -> anyhow::Result<Vec<i64>>;

    async fn create_user(&self, contact: &Contact) -> anyhow::Result<i64>;

    async fn suspend_user(&self, user_id: i64) -> anyhow::Result<()>;

    async fn has_enrolments(&self, user_id: i64) -> anyhow::Result<bool>;
}

/// Fire-and-forget delivery of an operator message.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
