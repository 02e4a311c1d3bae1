use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which upstream resource an enrolment instance is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceSource {
    Event { guid: String },
    OnlineActivity { guid: String },
}

impl InstanceSource {
    pub fn guid(&self) -> &str {
        match self {
            InstanceSource::Event { guid } | InstanceSource::OnlineActivity { guid } => guid,
        }
    }

    pub fn type_str(&self) -> &'static str {
        match self {
            InstanceSource::Event { .. } => "event",
            InstanceSource::OnlineActivity { .. } => "online_activity",
        }
    }
}

/// A local enrolment scope mirroring one Event or OnlineActivity.
///
/// Instances are created by the surrounding application; the engine only
/// refreshes `end_at` and `enabled` from upstream and keys per-instance
/// watermarks and locks by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrolmentInstance {
    pub id: i64,
    pub platform: String,
    pub source: InstanceSource,
    pub end_at: Option<DateTime<Utc>>,
    pub enabled: bool,
}
