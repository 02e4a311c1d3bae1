use serde::{Deserialize, Serialize};
use std::fmt;

/// Every job the engine knows how to run. One watermark exists per
/// `(ResourceKind, Scope)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    EventTemplates,
    Events,
    OnlineActivities,
    ContactMergeRequests,
    Registrations,
    Outcomes,
    Contacts,
    EnrolmentExpirations,
    Notifications,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 9] = [
        ResourceKind::EventTemplates,
        ResourceKind::Events,
        ResourceKind::OnlineActivities,
        ResourceKind::ContactMergeRequests,
        ResourceKind::Registrations,
        ResourceKind::Outcomes,
        ResourceKind::Contacts,
        ResourceKind::EnrolmentExpirations,
        ResourceKind::Notifications,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::EventTemplates => "event_templates",
            ResourceKind::Events => "events",
            ResourceKind::OnlineActivities => "online_activities",
            ResourceKind::ContactMergeRequests => "contact_merge_requests",
            ResourceKind::Registrations => "registrations",
            ResourceKind::Outcomes => "outcomes",
            ResourceKind::Contacts => "contacts",
            ResourceKind::EnrolmentExpirations => "enrolment_expirations",
            ResourceKind::Notifications => "notifications",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == norm)
    }

    /// Jobs scoped to a single enrolment instance rather than the whole site.
    pub fn is_per_instance(&self) -> bool {
        matches!(
            self,
            ResourceKind::Registrations | ResourceKind::Outcomes | ResourceKind::Contacts
        )
    }

    /// Jobs that never talk to the upstream API.
    pub fn is_local_only(&self) -> bool {
        matches!(
            self,
            ResourceKind::EnrolmentExpirations | ResourceKind::Notifications
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit a watermark and a lock are keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    Global,
    Instance(i64),
}

impl Scope {
    /// Storage representation: 0 for global, the instance id otherwise.
    pub fn as_i64(&self) -> i64 {
        match self {
            Scope::Global => 0,
            Scope::Instance(id) => *id,
        }
    }

    pub fn from_i64(v: i64) -> Self {
        if v == 0 {
            Scope::Global
        } else {
            Scope::Instance(v)
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Instance(id) => write!(f, "instance:{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parse_accepts_dashes_and_case() {
        assert_eq!(
            ResourceKind::parse("Online-Activities"),
            Some(ResourceKind::OnlineActivities)
        );
        assert_eq!(ResourceKind::parse("bogus"), None);
    }

    #[test]
    fn scope_round_trips_through_storage_value() {
        assert_eq!(Scope::from_i64(0), Scope::Global);
        assert_eq!(Scope::from_i64(17), Scope::Instance(17));
        assert_eq!(Scope::Instance(17).as_i64(), 17);
    }
}
