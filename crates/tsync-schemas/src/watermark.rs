use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{epoch, ResourceKind, Scope};

/// Composite synchronization frontier.
///
/// Field order matters: the derived `Ord` compares `last_modified` first and
/// breaks ties on `last_id`, matching the upstream `(LastModifiedDateTime ASC,
/// <IdField> ASC)` ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cursor {
    pub last_modified: DateTime<Utc>,
    pub last_id: i64,
}

impl Cursor {
    pub fn new(last_modified: DateTime<Utc>, last_id: i64) -> Self {
        Self {
            last_modified,
            last_id,
        }
    }

    /// The cursor a fresh watermark starts from.
    pub fn origin() -> Self {
        Self::new(epoch(), 0)
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::origin()
    }
}

/// Durable per-(kind, scope) synchronization state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    pub kind: ResourceKind,
    pub scope: Scope,
    pub platform: String,
    pub cursor: Cursor,
    pub next_attempt_not_before: DateTime<Utc>,
    /// Stop retrying after this instant (plus the configured grace extension).
    pub attempt_window_end: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub last_error: Option<String>,
    /// Terminal until an operator clears it.
    pub disabled: bool,
}

impl Watermark {
    /// Default state for a watermark that has never been persisted.
    pub fn fresh(kind: ResourceKind, scope: Scope, platform: impl Into<String>) -> Self {
        Self {
            kind,
            scope,
            platform: platform.into(),
            cursor: Cursor::origin(),
            next_attempt_not_before: epoch(),
            attempt_window_end: None,
            error_count: 0,
            last_error: None,
            disabled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cursor_orders_by_timestamp_then_id() {
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap();

        assert!(Cursor::new(t1, 9) < Cursor::new(t1, 10));
        assert!(Cursor::new(t1, 999) < Cursor::new(t2, 1));
        assert!(Cursor::origin() < Cursor::new(t1, 0));
    }

    #[test]
    fn fresh_watermark_starts_at_epoch() {
        let wm = Watermark::fresh(ResourceKind::Events, Scope::Global, "demo");
        assert_eq!(wm.cursor, Cursor::origin());
        assert_eq!(wm.next_attempt_not_before, epoch());
        assert!(!wm.disabled);
    }
}
