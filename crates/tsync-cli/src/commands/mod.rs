pub mod merge;
pub mod sync;
pub mod watermark;

use chrono::{DateTime, Utc};

pub(crate) fn opt_dt(v: &Option<DateTime<Utc>>) -> String {
    v.map(|t| t.to_rfc3339()).unwrap_or_else(|| "null".to_string())
}
