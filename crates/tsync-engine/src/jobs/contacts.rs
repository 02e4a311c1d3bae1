//! Per-instance contact refresh: re-read every contact the instance's
//! registrations reference.
//!
//! Contacts are fetched one by one, not as an ordered collection, so the
//! watermark only records the newest modification seen.

use tracing::warn;
use tsync_client::FromElement;
use tsync_schemas::{Contact, EnrolmentInstance, Watermark};

use crate::error::JobError;
use crate::jobs::is_record_level;
use crate::session::ApiSession;
use crate::{JobReport, SyncEngine};

pub(super) async fn run(
    engine: &SyncEngine,
    instance: &EnrolmentInstance,
    wm: &mut Watermark,
    report: &mut JobReport,
) -> Result<(), JobError> {
    let store = engine.store();
    let platform = engine.context().platform();
    let session = ApiSession::new(engine);
    let mut newest = wm.cursor;

    for known in store.contacts_for_instance(instance.id).await? {
        report.records += 1;
        let path = format!("contacts/{}/", known.contact.source_id);
        let fetched = match session.fetch_resource(&path, Contact::ITEM).await {
            Ok(f) => f,
            Err(JobError::Upstream(e)) if is_record_level(&e) => {
                warn!(contact = %known.contact.source_guid, error = %e, "contact not readable");
                report.record_error(Some(known.contact.source_id), e.to_string());
                continue;
            }
            Err(e) => {
                save_newest(engine, wm, newest).await?;
                return Err(e);
            }
        };

        let contact = match Contact::from_element(platform, &fetched.element) {
            Ok(c) => c,
            Err(e) => {
                report.record_error(e.source_id, e.to_string());
                continue;
            }
        };
        let (_, outcome) = store.upsert_contact(&contact).await?;
        report.count(outcome);
        newest = newest.max(contact.cursor());
    }

    save_newest(engine, wm, newest).await
}

async fn save_newest(
    engine: &SyncEngine,
    wm: &mut Watermark,
    newest: tsync_schemas::Cursor,
) -> Result<(), JobError> {
    if newest > wm.cursor {
        engine.watermarks().advance(wm, newest).await?;
    }
    Ok(())
}
