//! Job results as values: callers branch on [`JobOutcome`] instead of
//! catching anything.

use chrono::{DateTime, Utc};
use std::fmt;
use tsync_schemas::{ResourceKind, Scope};

/// One upstream record that could not be applied. Processing went on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    pub source_id: Option<i64>,
    pub message: String,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source_id {
            Some(id) => write!(f, "record {id}: {}", self.message),
            None => write!(f, "record: {}", self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub kind: ResourceKind,
    pub scope: Scope,
    pub pages: u32,
    pub records: u32,
    pub inserted: u32,
    pub updated: u32,
    pub unchanged: u32,
    pub deleted: u32,
    pub errors: Vec<RecordError>,
}

impl JobReport {
    pub fn new(kind: ResourceKind, scope: Scope) -> Self {
        Self {
            kind,
            scope,
            pages: 0,
            records: 0,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            deleted: 0,
            errors: Vec::new(),
        }
    }

    pub fn record_error(&mut self, source_id: Option<i64>, message: impl Into<String>) {
        self.errors.push(RecordError {
            source_id,
            message: message.into(),
        });
    }

    pub fn count(&mut self, outcome: crate::UpsertOutcome) {
        match outcome {
            crate::UpsertOutcome::Inserted => self.inserted += 1,
            crate::UpsertOutcome::Updated => self.updated += 1,
            crate::UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

/// Why a job did not run. None of these count against the watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferReason {
    /// Another run holds the lock.
    Locked,
    /// The watermark is disabled until an operator clears it.
    Disabled,
    NotDue { until: DateTime<Utc> },
    /// The attempt window plus grace has passed; the watermark is now disabled.
    WindowClosed,
    /// The callability gate is closed, or closed during this job.
    ApiUnavailable,
    /// The job is switched off in configuration.
    SwitchedOff,
    /// The instance is missing or disabled.
    InstanceUnavailable,
}

impl fmt::Display for DeferReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeferReason::Locked => f.write_str("locked"),
            DeferReason::Disabled => f.write_str("disabled"),
            DeferReason::NotDue { until } => write!(f, "not due until {}", until.to_rfc3339()),
            DeferReason::WindowClosed => f.write_str("attempt window closed"),
            DeferReason::ApiUnavailable => f.write_str("api not callable"),
            DeferReason::SwitchedOff => f.write_str("switched off"),
            DeferReason::InstanceUnavailable => f.write_str("instance unavailable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    /// Progress made before the failure; committed records stay committed.
    pub report: JobReport,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Success(JobReport),
    Deferred(DeferReason),
    Failed(JobFailure),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success(_))
    }

    pub fn report(&self) -> Option<&JobReport> {
        match self {
            JobOutcome::Success(r) => Some(r),
            JobOutcome::Failed(f) => Some(&f.report),
            JobOutcome::Deferred(_) => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            JobOutcome::Success(_) => "success".to_string(),
            JobOutcome::Deferred(r) => format!("deferred ({r})"),
            JobOutcome::Failed(f) => format!("failed ({})", f.error),
        }
    }
}
