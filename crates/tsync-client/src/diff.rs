//! Outcome push document (RFC 5261 style XML patch).
//!
//! A field upstream has never held is added under `Registration`; a field it
//! already holds is replaced in place. Fields whose pending value equals the
//! upstream value are left out.

use chrono::SecondsFormat;
use quick_xml::escape::escape;
use tsync_schemas::OutcomeFields;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffOp {
    Add { field: &'static str, value: String },
    Replace { field: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutcomeDiff {
    pub ops: Vec<DiffOp>,
}

fn render(fields: &OutcomeFields) -> [(&'static str, Option<String>); 5] {
    [
        ("Grade", fields.grade.clone()),
        ("Outcome", fields.outcome.clone()),
        (
            "LastActivityDateTime",
            fields
                .last_activity_at
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ),
        ("ProgressStatus", fields.progress_status.clone()),
        ("ProgressPercent", fields.progress_percent.map(|p| p.to_string())),
    ]
}

impl OutcomeDiff {
    pub fn between(upstream: &OutcomeFields, pending: &OutcomeFields) -> Self {
        let ops = render(upstream)
            .into_iter()
            .zip(render(pending))
            .filter_map(|((field, current), (_, wanted))| {
                let value = wanted?;
                match current {
                    Some(cur) if cur == value => None,
                    Some(_) => Some(DiffOp::Replace { field, value }),
                    None => Some(DiffOp::Add { field, value }),
                }
            })
            .collect();
        Self { ops }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::from("<diff>");
        for op in &self.ops {
            match op {
                DiffOp::Add { field, value } => out.push_str(&format!(
                    "<add sel=\"Registration\"><{field}>{}</{field}></add>",
                    escape(value.as_str())
                )),
                DiffOp::Replace { field, value } => out.push_str(&format!(
                    "<replace sel=\"Registration/{field}/text()[1]\">{}</replace>",
                    escape(value.as_str())
                )),
            }
        }
        out.push_str("</diff>");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn add_for_new_fields_replace_for_existing() {
        let upstream = OutcomeFields {
            grade: Some("C".to_string()),
            ..OutcomeFields::default()
        };
        let pending = OutcomeFields {
            grade: Some("A".to_string()),
            progress_percent: Some(100.0),
            ..OutcomeFields::default()
        };
        let diff = OutcomeDiff::between(&upstream, &pending);
        assert_eq!(
            diff.to_xml(),
            "<diff>\
             <replace sel=\"Registration/Grade/text()[1]\">A</replace>\
             <add sel=\"Registration\"><ProgressPercent>100</ProgressPercent></add>\
             </diff>"
        );
    }

    #[test]
    fn unchanged_fields_are_skipped() {
        let same = OutcomeFields {
            outcome: Some("Pass".to_string()),
            last_activity_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            ..OutcomeFields::default()
        };
        assert!(OutcomeDiff::between(&same, &same).is_empty());
    }

    #[test]
    fn values_are_escaped() {
        let pending = OutcomeFields {
            outcome: Some("Pass <with> & merit".to_string()),
            ..OutcomeFields::default()
        };
        let xml = OutcomeDiff::between(&OutcomeFields::default(), &pending).to_xml();
        assert!(xml.contains("Pass &lt;with&gt; &amp; merit"));
    }
}
