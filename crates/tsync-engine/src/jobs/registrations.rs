//! Per-instance registrations, pulled with the contact expanded inline.
//!
//! For each record: mirror the contact, apply its pending merge chain, bind
//! it to a user, then mirror the registration. Enrolment side effects run
//! after the drain against the instance's local rows, comparing each row's
//! bound user with the user last enrolled for it. A failed enrol or unenrol
//! is a record error and is retried by the next run; a cancelled row is
//! deleted once its user is unenrolled.

use async_trait::async_trait;
use tracing::{debug, warn};
use tsync_client::xml::Element;
use tsync_client::{CollectionQuery, FromElement, RegistrationItem, RegistrationParent};
use tsync_schemas::{
    EnrolmentInstance, InstanceSource, RegistrationRecord, RegistrationStatus, Watermark,
};

use crate::error::JobError;
use crate::fetcher::{drain, PageHandler};
use crate::identity::associate_user;
use crate::jobs::reconcile_contact;
use crate::{EngineError, JobReport, SyncEngine};

pub(super) async fn run(
    engine: &SyncEngine,
    instance: &EnrolmentInstance,
    wm: &mut Watermark,
    report: &mut JobReport,
) -> Result<(), JobError> {
    let parent = resolve_parent(engine, instance).await?;
    let query = CollectionQuery::registrations(parent, wm.cursor, engine.context().page_size());
    let mut handler = RegistrationHandler { engine, instance };
    drain(engine, &query, wm, &mut handler, report).await?;
    settle_enrolments(engine, instance.id, report).await
}

/// The upstream id of the instance's event or activity. The linked resource
/// must already be mirrored; the catalog stages run first.
async fn resolve_parent(
    engine: &SyncEngine,
    instance: &EnrolmentInstance,
) -> Result<RegistrationParent, EngineError> {
    let store = engine.store();
    let platform = engine.context().platform();
    match &instance.source {
        InstanceSource::Event { guid } => match store.find_event(platform, guid).await? {
            Some(e) => Ok(RegistrationParent::Event(e.source_id)),
            None => Err(EngineError::invariant(format!(
                "instance {} is linked to event {guid}, which is not mirrored locally",
                instance.id
            ))),
        },
        InstanceSource::OnlineActivity { guid } => {
            match store.find_online_activity(platform, guid).await? {
                Some(a) => Ok(RegistrationParent::OnlineActivity(a.source_id)),
                None => Err(EngineError::invariant(format!(
                    "instance {} is linked to online activity {guid}, which is not mirrored locally",
                    instance.id
                ))),
            }
        }
    }
}

struct RegistrationHandler<'a> {
    engine: &'a SyncEngine,
    instance: &'a EnrolmentInstance,
}

#[async_trait]
impl<'a> PageHandler for RegistrationHandler<'a> {
    async fn handle(&mut self, item: &Element, report: &mut JobReport) -> Result<(), JobError> {
        let engine = self.engine;
        let store = engine.store();
        let platform = engine.context().platform();
        let instance_id = self.instance.id;

        let RegistrationItem {
            mut registration,
            contact,
        } = match RegistrationItem::from_element(platform, item) {
            Ok(r) => r,
            Err(e) => {
                report.record_error(e.source_id, e.to_string());
                return Ok(());
            }
        };

        let mut user_id = None;
        if let Some(contact) = contact {
            let (record, _) = store.upsert_contact(&contact).await?;
            let record = reconcile_contact(engine, record, report).await?;
            user_id = associate_user(engine, &record, report).await?;
        }

        if registration.status == RegistrationStatus::Cancelled
            && store
                .find_registration(platform, &registration.source_guid)
                .await?
                .is_none()
        {
            return Ok(());
        }

        match &self.instance.source {
            InstanceSource::Event { guid } if registration.event_guid.is_none() => {
                registration.event_guid = Some(guid.clone());
            }
            InstanceSource::OnlineActivity { guid }
                if registration.online_activity_guid.is_none() =>
            {
                registration.online_activity_guid = Some(guid.clone());
            }
            _ => {}
        }

        let (_, outcome) = store
            .upsert_registration(instance_id, &registration, user_id)
            .await?;
        report.count(outcome);
        Ok(())
    }
}

/// What the enrolment service still has to do for one local row.
#[derive(Debug, PartialEq, Eq)]
enum Settle {
    Nothing,
    Enrol(i64),
    /// Cancelled upstream: unenrol the held user, if any, then drop the row.
    Remove(Option<i64>),
}

fn settle(record: &RegistrationRecord) -> Settle {
    let status = record.registration.status;
    if status == RegistrationStatus::Cancelled {
        return Settle::Remove(record.enrolled_user_id);
    }
    match record.user_id {
        Some(user) if status.grants_enrolment() && record.enrolled_user_id != Some(user) => {
            Settle::Enrol(user)
        }
        _ => Settle::Nothing,
    }
}

async fn settle_enrolments(
    engine: &SyncEngine,
    instance_id: i64,
    report: &mut JobReport,
) -> Result<(), JobError> {
    let store = engine.store();
    for record in store.registrations_for_instance(instance_id).await? {
        let source_id = Some(record.registration.source_id);
        match settle(&record) {
            Settle::Nothing => {}
            Settle::Enrol(user) => match engine.enrolments().enrol(instance_id, user).await {
                Ok(()) => store.mark_registration_enrolled(record.id, Some(user)).await?,
                Err(e) => {
                    warn!(instance = instance_id, user, error = %format!("{e:#}"), "enrol failed");
                    report.record_error(source_id, format!("enrol of user {user} failed: {e:#}"));
                }
            },
            Settle::Remove(held) => {
                if let Some(user) = held {
                    if let Err(e) = engine.enrolments().unenrol(instance_id, user).await {
                        warn!(instance = instance_id, user, error = %format!("{e:#}"), "unenrol failed");
                        report.record_error(
                            source_id,
                            format!("unenrol of user {user} failed: {e:#}"),
                        );
                        continue;
                    }
                }
                store.delete_registration(record.id).await?;
                report.deleted += 1;
                debug!(
                    instance = instance_id,
                    registration = %record.registration.source_guid,
                    "cancelled registration removed"
                );
            }
        }
    }
    Ok(())
}
