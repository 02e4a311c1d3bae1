//! Contact merge requests: mirror them, then fold every pending chain whose
//! destination contact is known locally.

use async_trait::async_trait;
use tracing::warn;
use tsync_client::xml::Element;
use tsync_client::{CollectionQuery, FromElement};
use tsync_merge::{reconcile_chain, MergeDirectory, MergeEffect};
use tsync_schemas::{
    ContactMergeRequest, ContactRecord, Notification, NotificationKind, ResourceKind, Watermark,
};

use crate::error::JobError;
use crate::fetcher::{drain, PageHandler};
use crate::{EngineError, JobReport, MergeResolution, SyncEngine};

pub(super) async fn run(
    engine: &SyncEngine,
    wm: &mut Watermark,
    report: &mut JobReport,
) -> Result<(), JobError> {
    let query = CollectionQuery::for_kind(
        ResourceKind::ContactMergeRequests,
        wm.cursor,
        engine.context().page_size(),
    )
    .ok_or_else(|| EngineError::invariant("contact merge requests have no collection query"))?;
    let mut handler = MergeRequestHandler { engine };
    drain(engine, &query, wm, &mut handler, report).await
}

struct MergeRequestHandler<'a> {
    engine: &'a SyncEngine,
}

#[async_trait]
impl<'a> PageHandler for MergeRequestHandler<'a> {
    async fn handle(&mut self, item: &Element, report: &mut JobReport) -> Result<(), JobError> {
        let store = self.engine.store();
        let platform = self.engine.context().platform();
        let request = match ContactMergeRequest::from_element(platform, item) {
            Ok(r) => r,
            Err(e) => {
                report.record_error(e.source_id, e.to_string());
                return Ok(());
            }
        };
        if request.source_contact_guid == request.destination_contact_guid {
            report.record_error(
                Some(request.source_id),
                "merge request names the same contact on both sides",
            );
            return Ok(());
        }
        report.count(store.upsert_merge_request(&request).await?);

        if let Some(dest) = store
            .find_contact(platform, &request.destination_contact_guid)
            .await?
        {
            reconcile_contact(self.engine, dest, report).await?;
        }
        Ok(())
    }
}

/// Apply the pending merge chain targeting `contact`. Returns the contact as
/// it stands afterwards.
///
/// A chain with a failed request still active is held: nothing further is
/// applied to the destination until an operator resolves that request, and
/// each held request is reported as a record error.
pub(crate) async fn reconcile_contact(
    engine: &SyncEngine,
    contact: ContactRecord,
    report: &mut JobReport,
) -> Result<ContactRecord, JobError> {
    let store = engine.store();
    let platform = engine.context().platform();
    let destination = &contact.contact.source_guid;
    let pending = store.pending_merge_requests(platform, destination).await?;
    if pending.is_empty() {
        return Ok(contact);
    }

    if let Some(blocking) = store.failed_merge_for_destination(platform, destination).await? {
        warn!(
            contact = %destination,
            blocking,
            held = pending.len(),
            "merge chain held behind a failed request"
        );
        for request in &pending {
            report.record_error(
                Some(request.source_id),
                format!(
                    "merge of {} into {destination} held: request {blocking} needs manual resolution",
                    request.source_contact_guid
                ),
            );
        }
        return Ok(contact);
    }

    let directory = EngineMergeDirectory { engine };
    let outcome = reconcile_chain(&directory, contact, pending).await?;
    if let Some(failed) = &outcome.failed_request {
        report.record_error(
            Some(failed.source_id),
            format!(
                "merge of {} into {} needs manual resolution: both users have enrolments",
                failed.source_contact_guid, failed.destination_contact_guid
            ),
        );
    }
    Ok(outcome.contact)
}

/// Merge effects applied through the engine's store and user directory.
struct EngineMergeDirectory<'a> {
    engine: &'a SyncEngine,
}

#[async_trait]
impl<'a> MergeDirectory for EngineMergeDirectory<'a> {
    async fn find_contact(&self, guid: &str) -> anyhow::Result<Option<ContactRecord>> {
        self.engine
            .store()
            .find_contact(self.engine.context().platform(), guid)
            .await
    }

    async fn has_enrolments(&self, user_id: i64) -> anyhow::Result<bool> {
        self.engine.users().has_enrolments(user_id).await
    }

    async fn apply(&self, effect: &MergeEffect) -> anyhow::Result<()> {
        let store = self.engine.store();
        let platform = self.engine.context().platform();
        match effect {
            MergeEffect::BindUser {
                contact_guid,
                user_id,
            } => store.bind_contact_user(platform, contact_guid, Some(*user_id)).await,
            MergeEffect::SuspendUser { user_id } => self.engine.users().suspend_user(*user_id).await,
            MergeEffect::DeleteContact { contact_guid } => {
                store.delete_contact(platform, contact_guid).await
            }
            MergeEffect::ResolveRequest {
                request_id,
                source_user_id,
                destination_user_id,
            } => {
                store
                    .close_merge_request(
                        platform,
                        *request_id,
                        MergeResolution::Resolved,
                        *source_user_id,
                        *destination_user_id,
                    )
                    .await
            }
            MergeEffect::FailRequest {
                request_id,
                source_user_id,
                destination_user_id,
            } => {
                store
                    .close_merge_request(
                        platform,
                        *request_id,
                        MergeResolution::Failed,
                        *source_user_id,
                        *destination_user_id,
                    )
                    .await?;
                warn!(request_id, "merge request queued for operator review");
                store
                    .enqueue_notification(&Notification {
                        id: None,
                        kind: NotificationKind::MergeFailure,
                        subject: request_id.to_string(),
                        message: format!(
                            "contact merge request {request_id} could not be applied: users {} and {} both hold enrolments",
                            fmt_user(*source_user_id),
                            fmt_user(*destination_user_id)
                        ),
                        created_at: self.engine.now(),
                    })
                    .await?;
                Ok(())
            }
        }
    }
}

fn fmt_user(user: Option<i64>) -> String {
    user.map_or_else(|| "-".to_string(), |u| u.to_string())
}
