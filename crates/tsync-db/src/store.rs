use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tsync_engine::{MergeResolution, SyncStore, UpsertOutcome};
use tsync_schemas::{
    ApiStatus, Contact, ContactMergeRequest, ContactRecord, EnrolmentInstance, Event,
    EventTemplate, Notification, OnlineActivity, OutcomeFields, Registration,
    RegistrationRecord, RequestLogEntry, ResourceKind, Scope, Watermark,
};

use crate::{catalog, contacts, ops, registrations, watermarks};

/// `SyncStore` over a Postgres pool. Each call is one statement (or one
/// upsert plus a read-back); the engine orders writes so that a crash
/// between two calls never loses a record it already advanced past.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SyncStore for PgStore {
    async fn load_watermark(
        &self,
        platform: &str,
        kind: ResourceKind,
        scope: Scope,
    ) -> Result<Option<Watermark>> {
        watermarks::load(&self.pool, platform, kind, scope).await
    }

    async fn save_watermark(&self, watermark: &Watermark) -> Result<()> {
        watermarks::save(&self.pool, watermark).await
    }

    async fn list_watermarks(&self, platform: &str) -> Result<Vec<Watermark>> {
        watermarks::list(&self.pool, platform).await
    }

    async fn load_api_status(&self, platform: &str) -> Result<ApiStatus> {
        ops::load_api_status(&self.pool, platform).await
    }

    async fn save_api_status(&self, platform: &str, status: &ApiStatus) -> Result<()> {
        ops::save_api_status(&self.pool, platform, status).await
    }

    async fn append_request_log(&self, entry: &RequestLogEntry) -> Result<()> {
        ops::append_request_log(&self.pool, entry).await
    }

    async fn purge_request_log(&self, before: DateTime<Utc>) -> Result<u64> {
        ops::purge_request_log(&self.pool, before).await
    }

    async fn enqueue_notification(&self, notification: &Notification) -> Result<i64> {
        ops::enqueue_notification(&self.pool, notification).await
    }

    async fn pending_notifications(&self, limit: u32) -> Result<Vec<Notification>> {
        ops::pending_notifications(&self.pool, limit).await
    }

    async fn delete_notification(&self, id: i64) -> Result<()> {
        ops::delete_notification(&self.pool, id).await
    }

    async fn upsert_event_template(&self, template: &EventTemplate) -> Result<UpsertOutcome> {
        catalog::upsert_event_template(&self.pool, template).await
    }

    async fn upsert_event(&self, event: &Event) -> Result<UpsertOutcome> {
        catalog::upsert_event(&self.pool, event).await
    }

    async fn upsert_online_activity(&self, activity: &OnlineActivity) -> Result<UpsertOutcome> {
        catalog::upsert_online_activity(&self.pool, activity).await
    }

    async fn find_event(&self, platform: &str, guid: &str) -> Result<Option<Event>> {
        catalog::find_event(&self.pool, platform, guid).await
    }

    async fn find_online_activity(
        &self,
        platform: &str,
        guid: &str,
    ) -> Result<Option<OnlineActivity>> {
        catalog::find_online_activity(&self.pool, platform, guid).await
    }

    async fn list_instances(&self, platform: &str) -> Result<Vec<EnrolmentInstance>> {
        catalog::list_instances(&self.pool, platform).await
    }

    async fn find_instance(&self, id: i64) -> Result<Option<EnrolmentInstance>> {
        catalog::find_instance(&self.pool, id).await
    }

    async fn instances_for_source(
        &self,
        platform: &str,
        source_guid: &str,
    ) -> Result<Vec<EnrolmentInstance>> {
        catalog::instances_for_source(&self.pool, platform, source_guid).await
    }

    async fn update_instance(
        &self,
        id: i64,
        end_at: Option<DateTime<Utc>>,
        enabled: bool,
    ) -> Result<()> {
        catalog::update_instance(&self.pool, id, end_at, enabled).await
    }

    async fn upsert_contact(&self, contact: &Contact) -> Result<(ContactRecord, UpsertOutcome)> {
        contacts::upsert_contact(&self.pool, contact).await
    }

    async fn find_contact(&self, platform: &str, guid: &str) -> Result<Option<ContactRecord>> {
        contacts::find_contact(&self.pool, platform, guid).await
    }

    async fn contacts_for_instance(&self, instance_id: i64) -> Result<Vec<ContactRecord>> {
        contacts::contacts_for_instance(&self.pool, instance_id).await
    }

    async fn bind_contact_user(
        &self,
        platform: &str,
        guid: &str,
        user_id: Option<i64>,
    ) -> Result<()> {
        contacts::bind_contact_user(&self.pool, platform, guid, user_id).await
    }

    async fn set_contact_association_failed(
        &self,
        platform: &str,
        guid: &str,
        failed: bool,
    ) -> Result<()> {
        contacts::set_contact_association_failed(&self.pool, platform, guid, failed).await
    }

    async fn delete_contact(&self, platform: &str, guid: &str) -> Result<()> {
        contacts::delete_contact(&self.pool, platform, guid).await
    }

    async fn upsert_merge_request(&self, request: &ContactMergeRequest) -> Result<UpsertOutcome> {
        contacts::upsert_merge_request(&self.pool, request).await
    }

    async fn pending_merge_requests(
        &self,
        platform: &str,
        destination_guid: &str,
    ) -> Result<Vec<ContactMergeRequest>> {
        contacts::pending_merge_requests(&self.pool, platform, destination_guid).await
    }

    async fn close_merge_request(
        &self,
        platform: &str,
        request_id: i64,
        resolution: MergeResolution,
        source_user_id: Option<i64>,
        destination_user_id: Option<i64>,
    ) -> Result<()> {
        contacts::close_merge_request(
            &self.pool,
            platform,
            request_id,
            resolution,
            source_user_id,
            destination_user_id,
        )
        .await
    }

    async fn failed_merge_requests(&self, platform: &str) -> Result<Vec<ContactMergeRequest>> {
        contacts::failed_merge_requests(&self.pool, platform).await
    }

    async fn failed_merge_for_destination(
        &self,
        platform: &str,
        destination_guid: &str,
    ) -> Result<Option<i64>> {
        contacts::failed_merge_for_destination(&self.pool, platform, destination_guid).await
    }

    async fn upsert_registration(
        &self,
        instance_id: i64,
        registration: &Registration,
        user_id: Option<i64>,
    ) -> Result<(RegistrationRecord, UpsertOutcome)> {
        registrations::upsert_registration(&self.pool, instance_id, registration, user_id).await
    }

    async fn find_registration(
        &self,
        platform: &str,
        guid: &str,
    ) -> Result<Option<RegistrationRecord>> {
        registrations::find_registration(&self.pool, platform, guid).await
    }

    async fn delete_registration(&self, id: i64) -> Result<()> {
        registrations::delete_registration(&self.pool, id).await
    }

    async fn orphan_registrations(&self, platform: &str) -> Result<Vec<RegistrationRecord>> {
        registrations::orphan_registrations(&self.pool, platform).await
    }

    async fn registrations_for_instance(&self, instance_id: i64) -> Result<Vec<RegistrationRecord>> {
        registrations::registrations_for_instance(&self.pool, instance_id).await
    }

    async fn registrations_pending_push(&self, instance_id: i64) -> Result<Vec<RegistrationRecord>> {
        registrations::registrations_pending_push(&self.pool, instance_id).await
    }

    async fn queue_outcome(&self, id: i64, outcome: &OutcomeFields) -> Result<()> {
        registrations::queue_outcome(&self.pool, id, outcome).await
    }

    async fn mark_registration_pushed(&self, id: i64, upstream: &OutcomeFields) -> Result<()> {
        registrations::mark_registration_pushed(&self.pool, id, upstream).await
    }

    async fn mark_registration_expired(&self, id: i64) -> Result<()> {
        registrations::mark_registration_expired(&self.pool, id).await
    }

    async fn mark_registration_enrolled(&self, id: i64, user_id: Option<i64>) -> Result<()> {
        registrations::mark_registration_enrolled(&self.pool, id, user_id).await
    }
}
