use std::fmt;
use tsync_merge::MergeError;

use crate::policy::WatermarkRegression;

/// Errors that abort a run. Ordinary upstream and record failures never
/// surface here; they are values in the job report.
#[derive(Debug)]
pub enum EngineError {
    /// Local data-integrity violation, e.g. an instance whose linked event is
    /// not mirrored. Must be looked at by a human.
    Invariant(String),
    /// The local store failed.
    Store(anyhow::Error),
    /// The job's lock could not be released during cleanup.
    LockRelease { name: String, source: anyhow::Error },
}

impl EngineError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        EngineError::Invariant(msg.into())
    }

    pub fn is_invariant(&self) -> bool {
        matches!(self, EngineError::Invariant(_))
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Invariant(msg) => write!(f, "INVARIANT_VIOLATION: {msg}"),
            EngineError::Store(e) => write!(f, "store error: {e:#}"),
            EngineError::LockRelease { name, source } => {
                write!(f, "failed to release lock '{name}': {source:#}")
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        EngineError::Store(e)
    }
}

impl From<WatermarkRegression> for EngineError {
    fn from(e: WatermarkRegression) -> Self {
        EngineError::Invariant(e.to_string())
    }
}

impl From<MergeError> for EngineError {
    fn from(e: MergeError) -> Self {
        match e {
            MergeError::Contract(v) => EngineError::Invariant(v.to_string()),
            MergeError::Directory(e) => EngineError::Store(e),
        }
    }
}

/// Inside a job: an upstream failure stops the job gracefully, anything else
/// aborts the run.
#[derive(Debug)]
pub(crate) enum JobError {
    Upstream(tsync_client::ApiError),
    Abort(EngineError),
}

impl From<EngineError> for JobError {
    fn from(e: EngineError) -> Self {
        JobError::Abort(e)
    }
}

impl From<anyhow::Error> for JobError {
    fn from(e: anyhow::Error) -> Self {
        JobError::Abort(EngineError::Store(e))
    }
}

impl From<MergeError> for JobError {
    fn from(e: MergeError) -> Self {
        JobError::Abort(e.into())
    }
}

impl From<WatermarkRegression> for JobError {
    fn from(e: WatermarkRegression) -> Self {
        JobError::Abort(e.into())
    }
}
