//! Collection request builder.
//!
//! Upstream `LastModifiedDateTime` is not unique, so every collection request
//! filters and orders on the composite `(LastModifiedDateTime, <IdField>)` key:
//!
//! ```text
//! filter  = (LastModifiedDateTime gt T) or (LastModifiedDateTime eq T and <Id> gt N)
//! orderby = LastModifiedDateTime asc, <Id> asc
//! ```
//!
//! Requesting again with the cursor of the last processed record therefore
//! resumes exactly after it, with no gap and no repeat.

use chrono::SecondsFormat;
use reqwest::Url;
use tsync_schemas::{Cursor, ResourceKind};

/// Path prefix under the platform host for every resource.
pub const API_ROOT: &str = "api/2012-02-01/auth/resources/";

/// Parent resource of a per-instance registration collection, by upstream id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationParent {
    Event(i64),
    OnlineActivity(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionQuery {
    /// Collection path relative to [`API_ROOT`], with a trailing slash.
    pub path: String,
    /// Element name of one item, e.g. `Event`.
    pub item: &'static str,
    /// Integer id element used as the tie-break, e.g. `EventID`.
    pub id_field: &'static str,
    pub cursor: Cursor,
    pub top: u32,
    /// Linked resource to inline, e.g. `Contact` on registrations.
    pub expand: Option<&'static str>,
}

impl CollectionQuery {
    /// Query for a site-wide collection. `None` for kinds that are not a
    /// global upstream collection.
    pub fn for_kind(kind: ResourceKind, cursor: Cursor, top: u32) -> Option<Self> {
        let (path, item, id_field) = match kind {
            ResourceKind::EventTemplates => ("eventtemplates/", "EventTemplate", "TemplateID"),
            ResourceKind::Events => ("events/", "Event", "EventID"),
            ResourceKind::OnlineActivities => {
                ("onlineactivities/", "OnlineActivity", "OnlineActivityID")
            }
            ResourceKind::ContactMergeRequests => {
                ("contactmergerequests/", "ContactMergeRequest", "RequestID")
            }
            _ => return None,
        };
        Some(Self {
            path: path.to_string(),
            item,
            id_field,
            cursor,
            top,
            expand: None,
        })
    }

    pub fn registrations(parent: RegistrationParent, cursor: Cursor, top: u32) -> Self {
        let path = match parent {
            RegistrationParent::Event(id) => format!("events/{id}/registrations/"),
            RegistrationParent::OnlineActivity(id) => {
                format!("onlineactivities/{id}/registrations/")
            }
        };
        Self {
            path,
            item: "Registration",
            id_field: "RegistrationID",
            cursor,
            top,
            expand: Some("Contact"),
        }
    }

    /// Same query, resumed after `cursor`.
    pub fn resume_after(&self, cursor: Cursor) -> Self {
        Self {
            cursor,
            ..self.clone()
        }
    }

    pub fn filter_expr(&self) -> String {
        let ts = format_timestamp(&self.cursor);
        format!(
            "(LastModifiedDateTime gt datetime('{ts}')) or \
             (LastModifiedDateTime eq datetime('{ts}') and {} gt {})",
            self.id_field, self.cursor.last_id
        )
    }

    pub fn orderby_expr(&self) -> String {
        format!("LastModifiedDateTime asc,{} asc", self.id_field)
    }

    /// Absolute request URL under `base` (the platform host).
    pub fn to_url(&self, base: &Url) -> Result<Url, String> {
        let mut url = resource_url(base, &self.path)?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(expand) = self.expand {
                pairs.append_pair("expand", expand);
            }
            pairs.append_pair("filter", &self.filter_expr());
            pairs.append_pair("orderby", &self.orderby_expr());
            pairs.append_pair("top", &self.top.to_string());
        }
        Ok(url)
    }
}

/// `base` joined with [`API_ROOT`] and `path`.
pub(crate) fn resource_url(base: &Url, path: &str) -> Result<Url, String> {
    let root = if base.path().ends_with('/') {
        base.clone()
    } else {
        let mut with_slash = base.clone();
        with_slash.set_path(&format!("{}/", base.path()));
        with_slash
    };
    root.join(API_ROOT)
        .and_then(|u| u.join(path.trim_start_matches('/')))
        .map_err(|e| format!("invalid resource url for '{path}': {e}"))
}

fn format_timestamp(cursor: &Cursor) -> String {
    cursor
        .last_modified
        .to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn cursor() -> Cursor {
        Cursor::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(), 41)
    }

    #[test]
    fn filter_is_composite_on_timestamp_and_id() {
        let q = CollectionQuery::for_kind(ResourceKind::Events, cursor(), 250).unwrap();
        assert_eq!(
            q.filter_expr(),
            "(LastModifiedDateTime gt datetime('2024-03-01T09:30:00Z')) or \
             (LastModifiedDateTime eq datetime('2024-03-01T09:30:00Z') and EventID gt 41)"
        );
        assert_eq!(q.orderby_expr(), "LastModifiedDateTime asc,EventID asc");
    }

    #[test]
    fn local_only_and_per_instance_kinds_have_no_global_query() {
        for kind in [
            ResourceKind::Registrations,
            ResourceKind::Outcomes,
            ResourceKind::Contacts,
            ResourceKind::Notifications,
            ResourceKind::EnrolmentExpirations,
        ] {
            assert!(CollectionQuery::for_kind(kind, Cursor::origin(), 10).is_none());
        }
    }

    #[test]
    fn url_carries_root_path_and_encoded_query() {
        let base = Url::parse("https://acme.example.com").unwrap();
        let q = CollectionQuery::registrations(RegistrationParent::Event(12), cursor(), 100);
        let url = q.to_url(&base).unwrap();
        assert_eq!(
            url.path(),
            "/api/2012-02-01/auth/resources/events/12/registrations/"
        );
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(pairs[0], ("expand".to_string(), "Contact".to_string()));
        assert!(pairs[1].1.contains("RegistrationID gt 41"));
        assert_eq!(pairs[3], ("top".to_string(), "100".to_string()));
    }

    #[test]
    fn resume_keeps_everything_but_cursor() {
        let q = CollectionQuery::for_kind(ResourceKind::EventTemplates, Cursor::origin(), 5)
            .unwrap();
        let next = q.resume_after(cursor());
        assert_eq!(next.cursor, cursor());
        assert_eq!(next.path, q.path);
        assert_eq!(next.top, 5);
    }

    #[test]
    fn subsecond_cursor_is_preserved() {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let q = CollectionQuery::for_kind(ResourceKind::Events, Cursor::new(ts, 1), 1).unwrap();
        assert!(q.filter_expr().contains("2023-11-14T22:13:20.123Z"));
    }
}
