//! In-memory [`SyncStore`] with the same upsert semantics as the Postgres
//! store: keyed by `(platform, guid)`, identical snapshots are not written,
//! local-only fields survive an upstream refresh.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use tsync_engine::{MergeResolution, SyncStore, UpsertOutcome};
use tsync_schemas::{
    ApiStatus, Contact, ContactMergeRequest, ContactRecord, EnrolmentInstance, Event,
    EventTemplate, Notification, OnlineActivity, OutcomeFields, Registration, RegistrationRecord,
    RequestLogEntry, ResourceKind, Scope, Watermark,
};

type Key = (String, String);

fn key(platform: &str, guid: &str) -> Key {
    (platform.to_string(), guid.to_string())
}

#[derive(Default)]
struct State {
    watermarks: BTreeMap<(String, ResourceKind, Scope), Watermark>,
    api_status: HashMap<String, ApiStatus>,
    request_log: Vec<RequestLogEntry>,
    notifications: BTreeMap<i64, Notification>,
    templates: HashMap<Key, EventTemplate>,
    events: HashMap<Key, Event>,
    activities: HashMap<Key, OnlineActivity>,
    instances: BTreeMap<i64, EnrolmentInstance>,
    contacts: BTreeMap<Key, ContactRecord>,
    merge_requests: BTreeMap<(String, i64), ContactMergeRequest>,
    registrations: BTreeMap<i64, RegistrationRecord>,
    next_id: i64,
    /// Mirror rows actually written (inserts and changed updates).
    mirror_writes: u64,
    /// Upserts of these guids fail as if the database went away.
    broken_guids: BTreeSet<String>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

fn upsert_plain<T: Clone + PartialEq>(
    map: &mut HashMap<Key, T>,
    k: Key,
    value: &T,
    writes: &mut u64,
) -> UpsertOutcome {
    match map.get(&k) {
        Some(existing) if existing == value => UpsertOutcome::Unchanged,
        Some(_) => {
            map.insert(k, value.clone());
            *writes += 1;
            UpsertOutcome::Updated
        }
        None => {
            map.insert(k, value.clone());
            *writes += 1;
            UpsertOutcome::Inserted
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- seeding and inspection --------------------------------------------

    /// Every later upsert of `guid` fails until [`MemoryStore::repair`].
    pub fn break_writes_for(&self, guid: &str) {
        self.state().broken_guids.insert(guid.to_string());
    }

    pub fn repair(&self) {
        self.state().broken_guids.clear();
    }

    pub fn insert_instance(&self, instance: EnrolmentInstance) {
        self.state().instances.insert(instance.id, instance);
    }

    pub fn remove_instance(&self, id: i64) {
        self.state().instances.remove(&id);
    }

    pub fn instance(&self, id: i64) -> Option<EnrolmentInstance> {
        self.state().instances.get(&id).cloned()
    }

    pub fn watermark(&self, platform: &str, kind: ResourceKind, scope: Scope) -> Option<Watermark> {
        self.state()
            .watermarks
            .get(&(platform.to_string(), kind, scope))
            .cloned()
    }

    pub fn put_watermark(&self, wm: Watermark) {
        self.state()
            .watermarks
            .insert((wm.platform.clone(), wm.kind, wm.scope), wm);
    }

    pub fn api_status_of(&self, platform: &str) -> ApiStatus {
        self.state()
            .api_status
            .get(platform)
            .cloned()
            .unwrap_or_default()
    }

    pub fn put_contact(&self, record: ContactRecord) {
        let mut s = self.state();
        let k = key(&record.contact.platform, &record.contact.source_guid);
        s.contacts.insert(k, record);
    }

    pub fn contact(&self, platform: &str, guid: &str) -> Option<ContactRecord> {
        self.state().contacts.get(&key(platform, guid)).cloned()
    }

    pub fn put_merge_request(&self, request: ContactMergeRequest) {
        self.state()
            .merge_requests
            .insert((request.platform.clone(), request.source_id), request);
    }

    pub fn merge_request(&self, platform: &str, id: i64) -> Option<ContactMergeRequest> {
        self.state()
            .merge_requests
            .get(&(platform.to_string(), id))
            .cloned()
    }

    pub fn put_event(&self, event: Event) {
        let k = key(&event.platform, &event.source_guid);
        self.state().events.insert(k, event);
    }

    pub fn event_count(&self) -> usize {
        self.state().events.len()
    }

    pub fn template_count(&self) -> usize {
        self.state().templates.len()
    }

    pub fn registrations(&self) -> Vec<RegistrationRecord> {
        self.state().registrations.values().cloned().collect()
    }

    /// Seed a registration row directly, e.g. one whose instance is gone.
    pub fn put_registration(&self, record: RegistrationRecord) {
        let mut s = self.state();
        s.next_id = s.next_id.max(record.id);
        s.registrations.insert(record.id, record);
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.state().notifications.values().cloned().collect()
    }

    pub fn request_log(&self) -> Vec<RequestLogEntry> {
        self.state().request_log.clone()
    }

    pub fn mirror_writes(&self) -> u64 {
        self.state().mirror_writes
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn load_watermark(
        &self,
        platform: &str,
        kind: ResourceKind,
        scope: Scope,
    ) -> Result<Option<Watermark>> {
        Ok(self.watermark(platform, kind, scope))
    }

    async fn save_watermark(&self, watermark: &Watermark) -> Result<()> {
        self.put_watermark(watermark.clone());
        Ok(())
    }

    async fn list_watermarks(&self, platform: &str) -> Result<Vec<Watermark>> {
        Ok(self
            .state()
            .watermarks
            .values()
            .filter(|w| w.platform == platform)
            .cloned()
            .collect())
    }

    async fn load_api_status(&self, platform: &str) -> Result<ApiStatus> {
        Ok(self.api_status_of(platform))
    }

    async fn save_api_status(&self, platform: &str, status: &ApiStatus) -> Result<()> {
        self.state()
            .api_status
            .insert(platform.to_string(), status.clone());
        Ok(())
    }

    async fn append_request_log(&self, entry: &RequestLogEntry) -> Result<()> {
        self.state().request_log.push(entry.clone());
        Ok(())
    }

    async fn purge_request_log(&self, before: DateTime<Utc>) -> Result<u64> {
        let mut s = self.state();
        let len = s.request_log.len();
        s.request_log.retain(|e| e.at >= before);
        Ok((len - s.request_log.len()) as u64)
    }

    async fn enqueue_notification(&self, notification: &Notification) -> Result<i64> {
        let mut s = self.state();
        let id = s.next_id();
        let mut n = notification.clone();
        n.id = Some(id);
        s.notifications.insert(id, n);
        Ok(id)
    }

    async fn pending_notifications(&self, limit: u32) -> Result<Vec<Notification>> {
        Ok(self
            .state()
            .notifications
            .values()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn delete_notification(&self, id: i64) -> Result<()> {
        self.state().notifications.remove(&id);
        Ok(())
    }

    async fn upsert_event_template(&self, template: &EventTemplate) -> Result<UpsertOutcome> {
        let mut guard = self.state();
        let s = &mut *guard;
        let k = key(&template.platform, &template.source_guid);
        Ok(upsert_plain(&mut s.templates, k, template, &mut s.mirror_writes))
    }

    async fn upsert_event(&self, event: &Event) -> Result<UpsertOutcome> {
        let mut guard = self.state();
        let s = &mut *guard;
        if s.broken_guids.contains(&event.source_guid) {
            return Err(anyhow!("connection reset while writing event {}", event.source_guid));
        }
        let k = key(&event.platform, &event.source_guid);
        Ok(upsert_plain(&mut s.events, k, event, &mut s.mirror_writes))
    }

    async fn upsert_online_activity(&self, activity: &OnlineActivity) -> Result<UpsertOutcome> {
        let mut guard = self.state();
        let s = &mut *guard;
        let k = key(&activity.platform, &activity.source_guid);
        Ok(upsert_plain(&mut s.activities, k, activity, &mut s.mirror_writes))
    }

    async fn find_event(&self, platform: &str, guid: &str) -> Result<Option<Event>> {
        Ok(self.state().events.get(&key(platform, guid)).cloned())
    }

    async fn find_online_activity(
        &self,
        platform: &str,
        guid: &str,
    ) -> Result<Option<OnlineActivity>> {
        Ok(self.state().activities.get(&key(platform, guid)).cloned())
    }

    async fn list_instances(&self, platform: &str) -> Result<Vec<EnrolmentInstance>> {
        Ok(self
            .state()
            .instances
            .values()
            .filter(|i| i.platform == platform)
            .cloned()
            .collect())
    }

    async fn find_instance(&self, id: i64) -> Result<Option<EnrolmentInstance>> {
        Ok(self.instance(id))
    }

    async fn instances_for_source(
        &self,
        platform: &str,
        source_guid: &str,
    ) -> Result<Vec<EnrolmentInstance>> {
        Ok(self
            .state()
            .instances
            .values()
            .filter(|i| i.platform == platform && i.source.guid() == source_guid)
            .cloned()
            .collect())
    }

    async fn update_instance(
        &self,
        id: i64,
        end_at: Option<DateTime<Utc>>,
        enabled: bool,
    ) -> Result<()> {
        let mut s = self.state();
        let inst = s
            .instances
            .get_mut(&id)
            .ok_or_else(|| anyhow!("instance {id} not found"))?;
        inst.end_at = end_at;
        inst.enabled = enabled;
        Ok(())
    }

    async fn upsert_contact(&self, contact: &Contact) -> Result<(ContactRecord, UpsertOutcome)> {
        let mut s = self.state();
        let k = key(&contact.platform, &contact.source_guid);
        if let Some(existing) = s.contacts.get(&k).cloned() {
            if &existing.contact == contact {
                return Ok((existing, UpsertOutcome::Unchanged));
            }
            let updated = ContactRecord {
                contact: contact.clone(),
                ..existing
            };
            s.contacts.insert(k, updated.clone());
            s.mirror_writes += 1;
            return Ok((updated, UpsertOutcome::Updated));
        }
        let record = ContactRecord {
            id: s.next_id(),
            contact: contact.clone(),
            user_id: None,
            user_association_failed: false,
        };
        s.contacts.insert(k, record.clone());
        s.mirror_writes += 1;
        Ok((record, UpsertOutcome::Inserted))
    }

    async fn find_contact(&self, platform: &str, guid: &str) -> Result<Option<ContactRecord>> {
        Ok(self.contact(platform, guid))
    }

    async fn contacts_for_instance(&self, instance_id: i64) -> Result<Vec<ContactRecord>> {
        let s = self.state();
        let wanted: BTreeSet<Key> = s
            .registrations
            .values()
            .filter(|r| r.instance_id == instance_id)
            .map(|r| key(&r.registration.platform, &r.registration.contact_guid))
            .collect();
        Ok(wanted
            .iter()
            .filter_map(|k| s.contacts.get(k).cloned())
            .collect())
    }

    async fn bind_contact_user(
        &self,
        platform: &str,
        guid: &str,
        user_id: Option<i64>,
    ) -> Result<()> {
        let mut s = self.state();
        let c = s
            .contacts
            .get_mut(&key(platform, guid))
            .ok_or_else(|| anyhow!("contact {guid} not found"))?;
        c.user_id = user_id;
        Ok(())
    }

    async fn set_contact_association_failed(
        &self,
        platform: &str,
        guid: &str,
        failed: bool,
    ) -> Result<()> {
        let mut s = self.state();
        let c = s
            .contacts
            .get_mut(&key(platform, guid))
            .ok_or_else(|| anyhow!("contact {guid} not found"))?;
        c.user_association_failed = failed;
        Ok(())
    }

    async fn delete_contact(&self, platform: &str, guid: &str) -> Result<()> {
        self.state().contacts.remove(&key(platform, guid));
        Ok(())
    }

    async fn upsert_merge_request(&self, request: &ContactMergeRequest) -> Result<UpsertOutcome> {
        let mut s = self.state();
        let k = (request.platform.clone(), request.source_id);
        let (merged, outcome) = match s.merge_requests.get(&k) {
            Some(existing) => {
                let merged = ContactMergeRequest {
                    source_user_id: existing.source_user_id,
                    destination_user_id: existing.destination_user_id,
                    active: existing.active,
                    merge_failed: existing.merge_failed,
                    ..request.clone()
                };
                if &merged == existing {
                    return Ok(UpsertOutcome::Unchanged);
                }
                (merged, UpsertOutcome::Updated)
            }
            None => (request.clone(), UpsertOutcome::Inserted),
        };
        s.merge_requests.insert(k, merged);
        s.mirror_writes += 1;
        Ok(outcome)
    }

    async fn pending_merge_requests(
        &self,
        platform: &str,
        destination_guid: &str,
    ) -> Result<Vec<ContactMergeRequest>> {
        Ok(self
            .state()
            .merge_requests
            .values()
            .filter(|r| {
                r.platform == platform
                    && r.destination_contact_guid == destination_guid
                    && r.is_pending()
            })
            .cloned()
            .collect())
    }

    async fn close_merge_request(
        &self,
        platform: &str,
        request_id: i64,
        resolution: MergeResolution,
        source_user_id: Option<i64>,
        destination_user_id: Option<i64>,
    ) -> Result<()> {
        let mut s = self.state();
        let r = s
            .merge_requests
            .get_mut(&(platform.to_string(), request_id))
            .ok_or_else(|| anyhow!("merge request {request_id} not found"))?;
        match resolution {
            MergeResolution::Resolved => r.active = false,
            MergeResolution::Failed => r.merge_failed = true,
        }
        r.source_user_id = source_user_id;
        r.destination_user_id = destination_user_id;
        Ok(())
    }

    async fn failed_merge_requests(&self, platform: &str) -> Result<Vec<ContactMergeRequest>> {
        Ok(self
            .state()
            .merge_requests
            .values()
            .filter(|r| r.platform == platform && r.merge_failed)
            .cloned()
            .collect())
    }

    async fn failed_merge_for_destination(
        &self,
        platform: &str,
        destination_guid: &str,
    ) -> Result<Option<i64>> {
        Ok(self
            .state()
            .merge_requests
            .values()
            .filter(|r| {
                r.platform == platform
                    && r.destination_contact_guid == destination_guid
                    && r.active
                    && r.merge_failed
            })
            .min_by_key(|r| (r.created_at, r.source_id))
            .map(|r| r.source_id))
    }

    async fn upsert_registration(
        &self,
        instance_id: i64,
        registration: &Registration,
        user_id: Option<i64>,
    ) -> Result<(RegistrationRecord, UpsertOutcome)> {
        let mut s = self.state();
        let existing = s
            .registrations
            .values()
            .find(|r| {
                r.registration.platform == registration.platform
                    && r.registration.source_guid == registration.source_guid
            })
            .cloned();
        if let Some(existing) = existing {
            let updated = RegistrationRecord {
                instance_id,
                user_id: user_id.or(existing.user_id),
                registration: registration.clone(),
                ..existing.clone()
            };
            if updated == existing {
                return Ok((existing, UpsertOutcome::Unchanged));
            }
            s.registrations.insert(updated.id, updated.clone());
            s.mirror_writes += 1;
            return Ok((updated, UpsertOutcome::Updated));
        }
        let record = RegistrationRecord {
            id: s.next_id(),
            instance_id,
            user_id,
            registration: registration.clone(),
            pending_outcome: OutcomeFields::default(),
            update_source: false,
            expired: false,
            enrolled_user_id: None,
        };
        s.registrations.insert(record.id, record.clone());
        s.mirror_writes += 1;
        Ok((record, UpsertOutcome::Inserted))
    }

    async fn find_registration(
        &self,
        platform: &str,
        guid: &str,
    ) -> Result<Option<RegistrationRecord>> {
        Ok(self
            .state()
            .registrations
            .values()
            .find(|r| r.registration.platform == platform && r.registration.source_guid == guid)
            .cloned())
    }

    async fn delete_registration(&self, id: i64) -> Result<()> {
        self.state().registrations.remove(&id);
        Ok(())
    }

    async fn orphan_registrations(&self, platform: &str) -> Result<Vec<RegistrationRecord>> {
        let s = self.state();
        Ok(s.registrations
            .values()
            .filter(|r| {
                r.registration.platform == platform && !s.instances.contains_key(&r.instance_id)
            })
            .cloned()
            .collect())
    }

    async fn registrations_for_instance(&self, instance_id: i64) -> Result<Vec<RegistrationRecord>> {
        Ok(self
            .state()
            .registrations
            .values()
            .filter(|r| r.instance_id == instance_id)
            .cloned()
            .collect())
    }

    async fn registrations_pending_push(&self, instance_id: i64) -> Result<Vec<RegistrationRecord>> {
        Ok(self
            .state()
            .registrations
            .values()
            .filter(|r| r.instance_id == instance_id && r.update_source)
            .cloned()
            .collect())
    }

    async fn queue_outcome(&self, id: i64, outcome: &OutcomeFields) -> Result<()> {
        let mut s = self.state();
        let r = s
            .registrations
            .get_mut(&id)
            .ok_or_else(|| anyhow!("registration {id} not found"))?;
        r.pending_outcome = outcome.clone();
        r.update_source = true;
        Ok(())
    }

    async fn mark_registration_pushed(&self, id: i64, upstream: &OutcomeFields) -> Result<()> {
        let mut s = self.state();
        let r = s
            .registrations
            .get_mut(&id)
            .ok_or_else(|| anyhow!("registration {id} not found"))?;
        r.registration.upstream_outcome = upstream.clone();
        r.update_source = false;
        Ok(())
    }

    async fn mark_registration_expired(&self, id: i64) -> Result<()> {
        let mut s = self.state();
        let r = s
            .registrations
            .get_mut(&id)
            .ok_or_else(|| anyhow!("registration {id} not found"))?;
        r.expired = true;
        Ok(())
    }

    async fn mark_registration_enrolled(&self, id: i64, user_id: Option<i64>) -> Result<()> {
        let mut s = self.state();
        let r = s
            .registrations
            .get_mut(&id)
            .ok_or_else(|| anyhow!("registration {id} not found"))?;
        r.enrolled_user_id = user_id;
        Ok(())
    }
}
