//! Binding a contact to a local user account.
//!
//! | candidates by email | result                                          |
//! |---------------------|-------------------------------------------------|
//! | 0                   | create a user (when enabled), bind it           |
//! | 1                   | bind it                                         |
//! | > 1                 | flag the contact, notify, record the error      |
//!
//! A flagged contact is left alone until an operator clears the flag.

use tracing::{info, warn};
use tsync_schemas::{ContactRecord, Notification, NotificationKind};

use crate::error::JobError;
use crate::{JobReport, SyncEngine};

pub(crate) async fn associate_user(
    engine: &SyncEngine,
    record: &ContactRecord,
    report: &mut JobReport,
) -> Result<Option<i64>, JobError> {
    if record.user_id.is_some() {
        return Ok(record.user_id);
    }
    if record.user_association_failed {
        return Ok(None);
    }

    let store = engine.store();
    let users = engine.users();
    let platform = engine.context().platform();
    let contact = &record.contact;

    let candidates = match contact.email.as_deref() {
        Some(email) => users.find_users_by_email(email).await?,
        None => Vec::new(),
    };

    let user_id = match candidates.as_slice() {
        [] if engine.context().settings().enrolment.create_users => {
            let id = users.create_user(contact).await?;
            info!(contact = %contact.source_guid, user = id, "user created for contact");
            id
        }
        [] => return Ok(None),
        [only] => *only,
        many => {
            warn!(
                contact = %contact.source_guid,
                candidates = many.len(),
                "ambiguous user match"
            );
            store
                .set_contact_association_failed(platform, &contact.source_guid, true)
                .await?;
            store
                .enqueue_notification(&Notification {
                    id: None,
                    kind: NotificationKind::DuplicateUserMatch,
                    subject: contact.source_guid.clone(),
                    message: format!(
                        "contact {} {} ({}) matches {} user accounts by email",
                        contact.first_name,
                        contact.last_name,
                        contact.email.as_deref().unwrap_or("-"),
                        many.len()
                    ),
                    created_at: engine.now(),
                })
                .await?;
            report.record_error(
                Some(contact.source_id),
                format!(
                    "AmbiguousUserMatch: contact {} matches {} users",
                    contact.source_guid,
                    many.len()
                ),
            );
            return Ok(None);
        }
    };

    store
        .bind_contact_user(platform, &contact.source_guid, Some(user_id))
        .await?;
    Ok(Some(user_id))
}
