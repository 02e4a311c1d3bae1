//! Upstream element builders, shaped like real API items.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use tsync_client::xml::Element;
use tsync_schemas::{EnrolmentInstance, InstanceSource};

pub const PLATFORM: &str = "acme";
pub const HOST: &str = "https://acme.example.com";

/// 2024-09-01 00:00:00 UTC plus `secs`.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_725_148_800 + secs, 0)
        .single()
        .unwrap_or_else(tsync_schemas::epoch)
}

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn related(item: &str, inner: Element) -> Element {
    Element::new("Link")
        .with_attr("rel", format!("http://api.example/related/{item}"))
        .with_attr("href", "https://acme.example.com/")
        .with_child(inner)
}

pub fn template(id: i64, guid: &str, modified: DateTime<Utc>) -> Element {
    Element::new("EventTemplate")
        .with_child(Element::leaf("TemplateID", id.to_string()))
        .with_child(Element::leaf("UniqueIdentifier", guid))
        .with_child(Element::leaf("Code", format!("T{id}")))
        .with_child(Element::leaf("Name", format!("Template {id}")))
        .with_child(Element::leaf("Status", "Active"))
        .with_child(Element::leaf("LastModifiedDateTime", ts(modified)))
}

pub fn event(
    id: i64,
    guid: &str,
    modified: DateTime<Utc>,
    status: &str,
    finish: Option<DateTime<Utc>>,
) -> Element {
    let mut el = Element::new("Event")
        .with_child(Element::leaf("EventID", id.to_string()))
        .with_child(Element::leaf("UniqueIdentifier", guid))
        .with_child(Element::leaf("Code", format!("E{id}")))
        .with_child(Element::leaf("Status", status))
        .with_child(Element::leaf("LastModifiedDateTime", ts(modified)));
    if let Some(f) = finish {
        el = el.with_child(Element::leaf("FinishDateTime", ts(f)));
    }
    el
}

pub fn online_activity(id: i64, guid: &str, modified: DateTime<Utc>, status: &str) -> Element {
    Element::new("OnlineActivity")
        .with_child(Element::leaf("OnlineActivityID", id.to_string()))
        .with_child(Element::leaf("UniqueIdentifier", guid))
        .with_child(Element::leaf("Name", format!("Activity {id}")))
        .with_child(Element::leaf("Status", status))
        .with_child(Element::leaf("LastModifiedDateTime", ts(modified)))
}

pub fn contact(id: i64, guid: &str, email: &str, modified: DateTime<Utc>) -> Element {
    Element::new("Contact")
        .with_child(Element::leaf("ContactID", id.to_string()))
        .with_child(Element::leaf("UniqueIdentifier", guid))
        .with_child(Element::leaf("FirstName", "Ada"))
        .with_child(Element::leaf("LastName", format!("Contact{id}")))
        .with_child(Element::leaf("Email", email))
        .with_child(Element::leaf("LastModifiedDateTime", ts(modified)))
}

/// Registration with its contact expanded inline.
pub fn registration(
    id: i64,
    guid: &str,
    status: &str,
    modified: DateTime<Utc>,
    contact: Element,
) -> Element {
    Element::new("Registration")
        .with_child(Element::leaf("RegistrationID", id.to_string()))
        .with_child(Element::leaf("UniqueIdentifier", guid))
        .with_child(Element::leaf("Status", status))
        .with_child(Element::leaf("LastModifiedDateTime", ts(modified)))
        .with_child(related("Contact", contact))
}

pub fn merge_request(
    id: i64,
    source_guid: &str,
    destination_guid: &str,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
) -> Element {
    let info = |name: &str, guid: &str| {
        Element::new(name).with_child(Element::leaf("UniqueIdentifier", guid))
    };
    Element::new("ContactMergeRequest")
        .with_child(Element::leaf("RequestID", id.to_string()))
        .with_child(info("SourceContactInfo", source_guid))
        .with_child(info("DestinationContactInfo", destination_guid))
        .with_child(Element::leaf("CreatedDateTime", ts(created)))
        .with_child(Element::leaf("LastModifiedDateTime", ts(modified)))
}

pub fn event_instance(id: i64, event_guid: &str, end_at: Option<DateTime<Utc>>) -> EnrolmentInstance {
    EnrolmentInstance {
        id,
        platform: PLATFORM.to_string(),
        source: InstanceSource::Event {
            guid: event_guid.to_string(),
        },
        end_at,
        enabled: true,
    }
}
