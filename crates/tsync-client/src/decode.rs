//! Element -> snapshot mapping, one explicit function per resource kind.
//!
//! A missing required field (`UniqueIdentifier`, the id element,
//! `LastModifiedDateTime`) is a [`DecodeError`] for that record only; the
//! caller logs it and moves on to the next record.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;
use tsync_schemas::{
    Contact, ContactMergeRequest, Event, EventStatus, EventTemplate, OnlineActivity,
    OutcomeFields, Registration, RegistrationStatus, TemplateStatus,
};

use crate::xml::Element;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub item: &'static str,
    /// Upstream id when it could be read, for the error report.
    pub source_id: Option<i64>,
    pub message: String,
}

impl DecodeError {
    fn new(item: &'static str, el: &Element, id_field: &str, message: impl Into<String>) -> Self {
        Self {
            item,
            source_id: el.child_text(id_field).and_then(|v| v.parse().ok()),
            message: message.into(),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source_id {
            Some(id) => write!(f, "{} {id}: {}", self.item, self.message),
            None => write!(f, "{}: {}", self.item, self.message),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Upstream timestamps carry an offset; bare ones are read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|n| n.and_utc())
}

struct Fields<'a> {
    item: &'static str,
    id_field: &'static str,
    el: &'a Element,
}

impl<'a> Fields<'a> {
    fn new(item: &'static str, id_field: &'static str, el: &'a Element) -> Self {
        Self { item, id_field, el }
    }

    fn err(&self, message: impl Into<String>) -> DecodeError {
        DecodeError::new(self.item, self.el, self.id_field, message)
    }

    fn required(&self, name: &str) -> Result<&'a str, DecodeError> {
        self.el
            .child_text(name)
            .ok_or_else(|| self.err(format!("missing required field {name}")))
    }

    fn optional(&self, name: &str) -> Option<String> {
        self.el.child_text(name).map(str::to_string)
    }

    fn id(&self) -> Result<i64, DecodeError> {
        let raw = self.required(self.id_field)?;
        raw.parse()
            .map_err(|_| self.err(format!("{} is not an integer: '{raw}'", self.id_field)))
    }

    fn guid(&self) -> Result<String, DecodeError> {
        Ok(self.required("UniqueIdentifier")?.to_string())
    }

    fn timestamp(&self, name: &str) -> Result<DateTime<Utc>, DecodeError> {
        let raw = self.required(name)?;
        parse_timestamp(raw).ok_or_else(|| self.err(format!("{name} is not a timestamp: '{raw}'")))
    }

    fn optional_timestamp(&self, name: &str) -> Result<Option<DateTime<Utc>>, DecodeError> {
        match self.el.child_text(name) {
            None => Ok(None),
            Some(raw) => parse_timestamp(raw)
                .map(Some)
                .ok_or_else(|| self.err(format!("{name} is not a timestamp: '{raw}'"))),
        }
    }

    fn modified(&self) -> Result<DateTime<Utc>, DecodeError> {
        self.timestamp("LastModifiedDateTime")
    }

    /// GUID of an expanded related resource, if the link was expanded.
    fn related_guid(&self, item: &str) -> Option<String> {
        self.el
            .related(item)
            .and_then(|r| r.child_text("UniqueIdentifier"))
            .map(str::to_string)
    }
}

/// Explicit mapping from an upstream element to a snapshot.
pub trait FromElement: Sized {
    /// Element name of one item.
    const ITEM: &'static str;
    /// Integer id element.
    const ID_FIELD: &'static str;

    fn from_element(platform: &str, el: &Element) -> Result<Self, DecodeError>;
}

impl FromElement for EventTemplate {
    const ITEM: &'static str = "EventTemplate";
    const ID_FIELD: &'static str = "TemplateID";

    fn from_element(platform: &str, el: &Element) -> Result<Self, DecodeError> {
        let f = Fields::new(Self::ITEM, Self::ID_FIELD, el);
        Ok(EventTemplate {
            platform: platform.to_string(),
            source_id: f.id()?,
            source_guid: f.guid()?,
            code: f.optional("Code").unwrap_or_default(),
            name: f.optional("Name").unwrap_or_default(),
            status: f
                .optional("Status")
                .map(|s| TemplateStatus::parse(&s))
                .unwrap_or(TemplateStatus::Unknown),
            source_modified: f.modified()?,
        })
    }
}

impl FromElement for Event {
    const ITEM: &'static str = "Event";
    const ID_FIELD: &'static str = "EventID";

    fn from_element(platform: &str, el: &Element) -> Result<Self, DecodeError> {
        let f = Fields::new(Self::ITEM, Self::ID_FIELD, el);
        Ok(Event {
            platform: platform.to_string(),
            source_id: f.id()?,
            source_guid: f.guid()?,
            template_guid: f.related_guid("EventTemplate"),
            code: f.optional("Code").unwrap_or_default(),
            start_at: f.optional_timestamp("StartDateTime")?,
            finish_at: f.optional_timestamp("FinishDateTime")?,
            status: f
                .optional("Status")
                .map(|s| EventStatus::parse(&s))
                .unwrap_or(EventStatus::Unknown),
            source_modified: f.modified()?,
        })
    }
}

impl FromElement for OnlineActivity {
    const ITEM: &'static str = "OnlineActivity";
    const ID_FIELD: &'static str = "OnlineActivityID";

    fn from_element(platform: &str, el: &Element) -> Result<Self, DecodeError> {
        let f = Fields::new(Self::ITEM, Self::ID_FIELD, el);
        Ok(OnlineActivity {
            platform: platform.to_string(),
            source_id: f.id()?,
            source_guid: f.guid()?,
            template_guid: f.related_guid("EventTemplate"),
            code: f.optional("Code").unwrap_or_default(),
            name: f.optional("Name").unwrap_or_default(),
            status: f
                .optional("Status")
                .map(|s| EventStatus::parse(&s))
                .unwrap_or(EventStatus::Unknown),
            source_modified: f.modified()?,
        })
    }
}

impl FromElement for Contact {
    const ITEM: &'static str = "Contact";
    const ID_FIELD: &'static str = "ContactID";

    fn from_element(platform: &str, el: &Element) -> Result<Self, DecodeError> {
        let f = Fields::new(Self::ITEM, Self::ID_FIELD, el);
        Ok(Contact {
            platform: platform.to_string(),
            source_id: f.id()?,
            source_guid: f.guid()?,
            first_name: f.optional("FirstName").unwrap_or_default(),
            last_name: f.optional("LastName").unwrap_or_default(),
            email: f.optional("Email"),
            code: f.optional("Code"),
            source_modified: f.modified()?,
        })
    }
}

impl FromElement for ContactMergeRequest {
    const ITEM: &'static str = "ContactMergeRequest";
    const ID_FIELD: &'static str = "RequestID";

    fn from_element(platform: &str, el: &Element) -> Result<Self, DecodeError> {
        let f = Fields::new(Self::ITEM, Self::ID_FIELD, el);
        let info_guid = |name: &str| -> Result<String, DecodeError> {
            el.child(name)
                .and_then(|i| i.child_text("UniqueIdentifier"))
                .map(str::to_string)
                .ok_or_else(|| f.err(format!("missing required field {name}/UniqueIdentifier")))
        };
        let source_contact_guid = info_guid("SourceContactInfo")?;
        let destination_contact_guid = info_guid("DestinationContactInfo")?;
        let source_modified = f.modified()?;
        Ok(ContactMergeRequest {
            platform: platform.to_string(),
            source_id: f.id()?,
            source_contact_guid,
            destination_contact_guid,
            // bound users are local state, filled in by the engine
            source_user_id: None,
            destination_user_id: None,
            created_at: f
                .optional_timestamp("CreatedDateTime")?
                .unwrap_or(source_modified),
            source_modified,
            active: true,
            merge_failed: false,
        })
    }
}

/// One registration plus the contact the request expanded inline.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationItem {
    pub registration: Registration,
    pub contact: Option<Contact>,
}

impl FromElement for RegistrationItem {
    const ITEM: &'static str = "Registration";
    const ID_FIELD: &'static str = "RegistrationID";

    fn from_element(platform: &str, el: &Element) -> Result<Self, DecodeError> {
        let f = Fields::new(Self::ITEM, Self::ID_FIELD, el);
        let contact = el
            .related("Contact")
            .map(|c| Contact::from_element(platform, c))
            .transpose()
            .map_err(|e| f.err(format!("embedded contact: {}", e.message)))?;
        let contact_guid = contact
            .as_ref()
            .map(|c| c.source_guid.clone())
            .ok_or_else(|| f.err("missing expanded Contact link"))?;

        let progress_percent = match f.optional("ProgressPercent") {
            None => None,
            Some(raw) => Some(
                raw.parse::<f64>()
                    .map_err(|_| f.err(format!("ProgressPercent is not a number: '{raw}'")))?,
            ),
        };

        let registration = Registration {
            platform: platform.to_string(),
            source_id: f.id()?,
            source_guid: f.guid()?,
            contact_guid,
            event_guid: f.related_guid("Event"),
            online_activity_guid: f.related_guid("OnlineActivity"),
            status: f
                .optional("Status")
                .map(|s| RegistrationStatus::parse(&s))
                .unwrap_or(RegistrationStatus::Unknown),
            upstream_outcome: OutcomeFields {
                grade: f.optional("Grade"),
                outcome: f.optional("Outcome"),
                last_activity_at: f.optional_timestamp("LastActivityDateTime")?,
                progress_status: f.optional("ProgressStatus"),
                progress_percent,
            },
            source_modified: f.modified()?,
        };
        Ok(RegistrationItem {
            registration,
            contact,
        })
    }
}

/// One parsed page of a collection response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionPage {
    pub items: Vec<Element>,
    /// `href` of the `rel="next"` link, present when more pages exist.
    pub next: Option<String>,
}

/// Split a collection root into its items and continuation link.
///
/// Items arrive either wrapped in `<Link rel=".../related/{item}">` or as bare
/// `<{item}>` children.
pub fn parse_collection(root: Element, item: &str) -> CollectionPage {
    let mut items = Vec::new();
    let mut next = None;
    for child in root.children {
        if child.name == "Link" {
            if child.attr("rel") == Some("next") {
                next = child.attr("href").map(str::to_string);
                continue;
            }
            if let Some(inner) = child.children.into_iter().find(|c| c.name == item) {
                items.push(inner);
            }
        } else if child.name == item {
            items.push(child);
        }
    }
    CollectionPage { items, next }
}

/// The single resource of a resource response, unwrapping a related link.
pub fn unwrap_resource(root: Element, item: &str) -> Option<Element> {
    if root.name == item {
        return Some(root);
    }
    parse_collection(root, item).items.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;

    fn registration_xml(extra: &str) -> String {
        format!(
            r#"<Registration>
                 <RegistrationID>88</RegistrationID>
                 <UniqueIdentifier>reg-88</UniqueIdentifier>
                 <Status>Approved</Status>
                 <Grade>B+</Grade>
                 <ProgressPercent>42.5</ProgressPercent>
                 <LastModifiedDateTime>2024-05-01T10:00:00+02:00</LastModifiedDateTime>
                 {extra}
               </Registration>"#
        )
    }

    const CONTACT_LINK: &str = r#"
        <Link rel="http://x/related/Contact" href="https://h/contacts/5/">
          <Contact>
            <ContactID>5</ContactID>
            <UniqueIdentifier>contact-5</UniqueIdentifier>
            <FirstName>Ada</FirstName>
            <LastName>Lovelace</LastName>
            <Email>ada@example.com</Email>
            <LastModifiedDateTime>2024-04-01T00:00:00Z</LastModifiedDateTime>
          </Contact>
        </Link>"#;

    #[test]
    fn registration_maps_fields_and_embedded_contact() {
        let el = parse(&registration_xml(CONTACT_LINK)).unwrap();
        let item = RegistrationItem::from_element("acme", &el).unwrap();
        let reg = &item.registration;
        assert_eq!(reg.source_id, 88);
        assert_eq!(reg.contact_guid, "contact-5");
        assert_eq!(reg.status, RegistrationStatus::Approved);
        assert_eq!(reg.upstream_outcome.grade.as_deref(), Some("B+"));
        assert_eq!(reg.upstream_outcome.progress_percent, Some(42.5));
        assert_eq!(reg.upstream_outcome.outcome, None);
        assert_eq!(reg.source_modified.to_rfc3339(), "2024-05-01T08:00:00+00:00");
        assert_eq!(
            item.contact.unwrap().email.as_deref(),
            Some("ada@example.com")
        );
    }

    #[test]
    fn registration_without_contact_is_a_record_error() {
        let el = parse(&registration_xml("")).unwrap();
        let err = RegistrationItem::from_element("acme", &el).unwrap_err();
        assert_eq!(err.source_id, Some(88));
        assert!(err.message.contains("Contact"));
    }

    #[test]
    fn missing_guid_is_reported_with_id() {
        let el = parse(
            "<Event><EventID>3</EventID><LastModifiedDateTime>2024-01-01T00:00:00Z</LastModifiedDateTime></Event>",
        )
        .unwrap();
        let err = Event::from_element("acme", &el).unwrap_err();
        assert_eq!(err.to_string(), "Event 3: missing required field UniqueIdentifier");
    }

    #[test]
    fn merge_request_reads_contact_infos() {
        let el = parse(
            r#"<ContactMergeRequest>
                 <RequestID>9</RequestID>
                 <SourceContactInfo><UniqueIdentifier>c-src</UniqueIdentifier></SourceContactInfo>
                 <DestinationContactInfo><UniqueIdentifier>c-dst</UniqueIdentifier></DestinationContactInfo>
                 <CreatedDateTime>2024-01-01T00:00:00Z</CreatedDateTime>
                 <LastModifiedDateTime>2024-01-02T00:00:00Z</LastModifiedDateTime>
               </ContactMergeRequest>"#,
        )
        .unwrap();
        let req = ContactMergeRequest::from_element("acme", &el).unwrap();
        assert_eq!(req.source_contact_guid, "c-src");
        assert_eq!(req.destination_contact_guid, "c-dst");
        assert!(req.is_pending());
        assert!(req.created_at < req.source_modified);
    }

    #[test]
    fn bare_timestamp_reads_as_utc() {
        let ts = parse_timestamp("2024-02-03T04:05:06.5").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-02-03T04:05:06.500+00:00");
    }

    #[test]
    fn collection_accepts_linked_and_bare_items() {
        let root = parse(
            r#"<Events>
                 <Link rel="http://x/related/Event" href="h"><Event><EventID>1</EventID></Event></Link>
                 <Event><EventID>2</EventID></Event>
                 <Link rel="next" href="https://h/events/?p=2"/>
               </Events>"#,
        )
        .unwrap();
        let page = parse_collection(root, "Event");
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next.as_deref(), Some("https://h/events/?p=2"));
    }
}
