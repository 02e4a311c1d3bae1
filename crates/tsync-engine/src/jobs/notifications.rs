//! Deliver queued operator notifications. Delivered rows are deleted; a
//! failed delivery stays queued for the next run.

use tracing::warn;

use crate::error::JobError;
use crate::{JobReport, SyncEngine};

const BATCH: u32 = 100;

pub(super) async fn run(engine: &SyncEngine, report: &mut JobReport) -> Result<(), JobError> {
    let store = engine.store();
    for n in store.pending_notifications(BATCH).await? {
        report.records += 1;
        let Some(id) = n.id else { continue };
        match engine.notifier().deliver(&n).await {
            Ok(()) => {
                store.delete_notification(id).await?;
                report.deleted += 1;
            }
            Err(e) => {
                warn!(notification = id, kind = n.kind.as_str(), error = %e, "delivery failed");
                report.record_error(Some(id), format!("delivery failed: {e:#}"));
            }
        }
    }
    Ok(())
}
