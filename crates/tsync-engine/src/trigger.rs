//! Ad-hoc triggers (webhooks, manual "sync now") mapped onto the job
//! contract. A triggered job runs forced: timing is bypassed, the lock and
//! the callability gate are not.

use std::fmt;
use tracing::info;
use tsync_schemas::{ResourceKind, Scope};

use crate::{EngineError, JobOutcome, SyncEngine};

/// `{resource_type, resource_id}` as delivered by an external trigger.
///
/// `resource_type` accepts job names (`registrations`) and singular resource
/// names (`Registration`, `event-template`). For per-instance jobs
/// `resource_id` is the local enrolment instance id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    pub resource_type: String,
    pub resource_id: Option<i64>,
}

#[derive(Debug)]
pub enum TriggerError {
    UnknownResourceType(String),
    /// A per-instance job was triggered without an instance id.
    MissingInstance(ResourceKind),
    Engine(EngineError),
}

impl fmt::Display for TriggerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerError::UnknownResourceType(t) => write!(f, "unknown resource type '{t}'"),
            TriggerError::MissingInstance(kind) => {
                write!(f, "trigger for {kind} needs an instance id")
            }
            TriggerError::Engine(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for TriggerError {}

impl From<EngineError> for TriggerError {
    fn from(e: EngineError) -> Self {
        TriggerError::Engine(e)
    }
}

impl TriggerEvent {
    pub fn new(resource_type: impl Into<String>, resource_id: Option<i64>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id,
        }
    }

    pub fn resolve(&self) -> Result<(ResourceKind, Scope), TriggerError> {
        let wanted = normalise(&self.resource_type);
        let kind = ResourceKind::ALL
            .into_iter()
            .find(|k| {
                let name = normalise(k.as_str());
                name == wanted
                    || name == format!("{wanted}s")
                    || wanted
                        .strip_suffix('y')
                        .is_some_and(|stem| name == format!("{stem}ies"))
            })
            .ok_or_else(|| TriggerError::UnknownResourceType(self.resource_type.clone()))?;

        let scope = if kind.is_per_instance() {
            match self.resource_id {
                Some(id) if id > 0 => Scope::Instance(id),
                _ => return Err(TriggerError::MissingInstance(kind)),
            }
        } else {
            Scope::Global
        };
        Ok((kind, scope))
    }
}

/// Lower case with separators dropped: `Event-Template` and
/// `event_templates` compare on `eventtemplate(s)`.
fn normalise(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl SyncEngine {
    pub async fn run_triggered(&self, event: &TriggerEvent) -> Result<JobOutcome, TriggerError> {
        let (kind, scope) = event.resolve()?;
        info!(job = %kind, %scope, resource_type = %event.resource_type, "triggered run");
        Ok(self.run_job(kind, scope, true).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(t: &str, id: Option<i64>) -> Result<(ResourceKind, Scope), TriggerError> {
        TriggerEvent::new(t, id).resolve()
    }

    #[test]
    fn singular_and_plural_names_map_to_jobs() {
        assert!(matches!(
            resolve("Event", None),
            Ok((ResourceKind::Events, Scope::Global))
        ));
        assert!(matches!(
            resolve("event-template", None),
            Ok((ResourceKind::EventTemplates, Scope::Global))
        ));
        assert!(matches!(
            resolve("OnlineActivity", Some(9)),
            Ok((ResourceKind::OnlineActivities, Scope::Global))
        ));
        assert!(matches!(
            resolve("contact_merge_requests", None),
            Ok((ResourceKind::ContactMergeRequests, Scope::Global))
        ));
    }

    #[test]
    fn per_instance_jobs_need_an_instance() {
        assert!(matches!(
            resolve("Registration", Some(4)),
            Ok((ResourceKind::Registrations, Scope::Instance(4)))
        ));
        assert!(matches!(
            resolve("registrations", None),
            Err(TriggerError::MissingInstance(ResourceKind::Registrations))
        ));
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(matches!(
            resolve("invoice", None),
            Err(TriggerError::UnknownResourceType(_))
        ));
    }
}
