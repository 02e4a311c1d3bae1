//! Wire types for the daemon's HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tsync_engine::{JobOutcome, JobRun, PassReport};
use tsync_schemas::{ApiStatus, Watermark};

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub daemon_uptime_secs: u64,
    pub platform: String,
    /// The callability gate is open right now.
    pub callable: bool,
    pub api_status: ApiStatus,
    pub watermarks: Vec<WatermarkView>,
    pub last_pass: Option<PassSummary>,
}

/// Flat rendering of a watermark; the scope is `global` or `instance:<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkView {
    pub kind: String,
    pub scope: String,
    pub cursor_modified: DateTime<Utc>,
    pub cursor_id: i64,
    pub next_attempt_not_before: DateTime<Utc>,
    pub attempt_window_end: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub disabled: bool,
}

impl From<&Watermark> for WatermarkView {
    fn from(wm: &Watermark) -> Self {
        Self {
            kind: wm.kind.as_str().to_string(),
            scope: wm.scope.to_string(),
            cursor_modified: wm.cursor.last_modified,
            cursor_id: wm.cursor.last_id,
            next_attempt_not_before: wm.next_attempt_not_before,
            attempt_window_end: wm.attempt_window_end,
            error_count: wm.error_count,
            last_error: wm.last_error.clone(),
            disabled: wm.disabled,
        }
    }
}

// ---------------------------------------------------------------------------
// Pass and job summaries (POST /v1/sync, POST /v1/trigger)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub forced: bool,
    pub succeeded: usize,
    pub failed: usize,
    /// The callability gate was closed for part of the pass.
    pub gated: bool,
    pub orphans_deleted: u32,
    pub request_log_purged: u64,
    pub jobs: Vec<JobSummary>,
}

impl PassSummary {
    pub fn from_report(report: &PassReport, forced: bool, finished_at: DateTime<Utc>) -> Self {
        Self {
            started_at: report.started_at,
            finished_at,
            forced,
            succeeded: report.succeeded(),
            failed: report.failed(),
            gated: report.gated,
            orphans_deleted: report.orphans_deleted,
            request_log_purged: report.request_log_purged,
            jobs: report.jobs.iter().map(JobSummary::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub kind: String,
    pub scope: String,
    /// `success`, `deferred (<reason>)` or `failed (<error>)`.
    pub outcome: String,
    pub records: u32,
    pub inserted: u32,
    pub updated: u32,
    pub deleted: u32,
    pub record_errors: Vec<String>,
}

impl JobSummary {
    pub fn new(kind: &str, scope: String, outcome: &JobOutcome) -> Self {
        let mut summary = Self {
            kind: kind.to_string(),
            scope,
            outcome: outcome.label(),
            records: 0,
            inserted: 0,
            updated: 0,
            deleted: 0,
            record_errors: Vec::new(),
        };
        if let Some(r) = outcome.report() {
            summary.records = r.records;
            summary.inserted = r.inserted;
            summary.updated = r.updated;
            summary.deleted = r.deleted;
            summary.record_errors = r.errors.iter().map(|e| e.to_string()).collect();
        }
        summary
    }
}

impl From<&JobRun> for JobSummary {
    fn from(run: &JobRun) -> Self {
        JobSummary::new(run.kind.as_str(), run.scope.to_string(), &run.outcome)
    }
}

// ---------------------------------------------------------------------------
// POST /v1/trigger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerRequest {
    pub resource_type: String,
    #[serde(default)]
    pub resource_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
