use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Cursor;

/// Upstream instruction that two contact identities were unified.
///
/// `active` flips to false once the request has been applied or judged
/// inapplicable. `merge_failed` is terminal and never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactMergeRequest {
    pub platform: String,
    pub source_id: i64,
    pub source_contact_guid: String,
    pub destination_contact_guid: String,
    pub source_user_id: Option<i64>,
    pub destination_user_id: Option<i64>,
    /// Upstream creation time; chains are applied in ascending order of this.
    pub created_at: DateTime<Utc>,
    pub source_modified: DateTime<Utc>,
    pub active: bool,
    pub merge_failed: bool,
}

impl ContactMergeRequest {
    pub fn cursor(&self) -> Cursor {
        Cursor::new(self.source_modified, self.source_id)
    }

    /// Eligible for automatic application.
    pub fn is_pending(&self) -> bool {
        self.active && !self.merge_failed
    }
}
