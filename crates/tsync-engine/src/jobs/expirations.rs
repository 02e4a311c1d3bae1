//! End enrolment access once an instance is past its end date plus the
//! configured expiry delay. Local only. A row whose expiry call fails stays
//! unexpired and is retried by the next run.

use tracing::{info, warn};

use crate::context::secs;
use crate::error::JobError;
use crate::{JobReport, SyncEngine};

pub(super) async fn run(engine: &SyncEngine, report: &mut JobReport) -> Result<(), JobError> {
    let Some(after) = engine.context().settings().enrolment.expire_after_secs else {
        return Ok(());
    };
    let delay = secs(after);
    let store = engine.store();
    let now = engine.now();

    for inst in store.list_instances(engine.context().platform()).await? {
        let Some(end) = inst.end_at else { continue };
        if now <= end + delay {
            continue;
        }
        let mut expired = 0u32;
        for rec in store.registrations_for_instance(inst.id).await? {
            if rec.expired {
                continue;
            }
            report.records += 1;
            if let Some(user) = rec.user_id {
                if let Err(e) = engine.enrolments().expire(inst.id, user).await {
                    warn!(instance = inst.id, user, error = %format!("{e:#}"), "expire failed");
                    report.record_error(
                        Some(rec.registration.source_id),
                        format!("expiry of user {user} failed: {e:#}"),
                    );
                    continue;
                }
            }
            store.mark_registration_expired(rec.id).await?;
            report.updated += 1;
            expired += 1;
        }
        if expired > 0 {
            info!(instance = inst.id, expired, "enrolments expired");
        }
    }
    Ok(())
}
