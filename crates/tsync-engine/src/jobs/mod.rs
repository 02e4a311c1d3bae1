//! One module per job kind. Each job runs with its lock held and its
//! watermark loaded; the runner owns eligibility, scheduling and cleanup.

mod catalog;
mod contacts;
mod expirations;
mod merge_requests;
mod notifications;
mod outcomes;
mod registrations;

use tsync_schemas::{EnrolmentInstance, ResourceKind, Watermark};

use crate::error::JobError;
use crate::{EngineError, JobReport, SyncEngine};

pub(crate) use merge_requests::reconcile_contact;

pub(crate) async fn execute(
    engine: &SyncEngine,
    kind: ResourceKind,
    instance: Option<&EnrolmentInstance>,
    wm: &mut Watermark,
    report: &mut JobReport,
) -> Result<(), JobError> {
    match (kind, instance) {
        (ResourceKind::EventTemplates | ResourceKind::Events | ResourceKind::OnlineActivities, _) => {
            catalog::run(engine, kind, wm, report).await
        }
        (ResourceKind::ContactMergeRequests, _) => merge_requests::run(engine, wm, report).await,
        (ResourceKind::EnrolmentExpirations, _) => expirations::run(engine, report).await,
        (ResourceKind::Notifications, _) => notifications::run(engine, report).await,
        (ResourceKind::Registrations, Some(inst)) => {
            registrations::run(engine, inst, wm, report).await
        }
        (ResourceKind::Outcomes, Some(inst)) => outcomes::run(engine, inst, report).await,
        (ResourceKind::Contacts, Some(inst)) => contacts::run(engine, inst, wm, report).await,
        (kind, None) => Err(EngineError::invariant(format!(
            "per-instance job {kind} started without an instance"
        ))
        .into()),
    }
}

/// A 4xx other than 401/403 on a single-resource call concerns that record
/// only; the job moves on.
pub(crate) fn is_record_level(err: &tsync_client::ApiError) -> bool {
    matches!(err.status, Some(s) if (400..500).contains(&s)) && !err.is_auth_failure()
}
