//! Push locally computed outcomes upstream as XML diff documents.

use tracing::{debug, warn};
use tsync_client::OutcomeDiff;
use tsync_schemas::{EnrolmentInstance, OutcomeFields};

use crate::error::JobError;
use crate::jobs::is_record_level;
use crate::session::ApiSession;
use crate::{JobReport, SyncEngine};

pub(super) async fn run(
    engine: &SyncEngine,
    instance: &EnrolmentInstance,
    report: &mut JobReport,
) -> Result<(), JobError> {
    let store = engine.store();
    let session = ApiSession::new(engine);

    for rec in store.registrations_pending_push(instance.id).await? {
        report.records += 1;
        let upstream = &rec.registration.upstream_outcome;
        let merged = merge(upstream, &rec.pending_outcome);
        let diff = OutcomeDiff::between(upstream, &rec.pending_outcome);

        if diff.is_empty() {
            store.mark_registration_pushed(rec.id, &merged).await?;
            report.unchanged += 1;
            continue;
        }

        match session
            .patch_registration(rec.registration.source_id, &diff.to_xml())
            .await
        {
            Ok(_) => {
                store.mark_registration_pushed(rec.id, &merged).await?;
                report.updated += 1;
                debug!(
                    registration = rec.registration.source_id,
                    fields = diff.ops.len(),
                    "outcome pushed"
                );
            }
            Err(JobError::Upstream(e)) if is_record_level(&e) => {
                warn!(registration = rec.registration.source_id, error = %e, "outcome rejected");
                report.record_error(Some(rec.registration.source_id), e.to_string());
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// What upstream holds once the pending values are applied.
fn merge(upstream: &OutcomeFields, pending: &OutcomeFields) -> OutcomeFields {
    OutcomeFields {
        grade: pending.grade.clone().or_else(|| upstream.grade.clone()),
        outcome: pending.outcome.clone().or_else(|| upstream.outcome.clone()),
        last_activity_at: pending.last_activity_at.or(upstream.last_activity_at),
        progress_status: pending
            .progress_status
            .clone()
            .or_else(|| upstream.progress_status.clone()),
        progress_percent: pending.progress_percent.or(upstream.progress_percent),
    }
}
