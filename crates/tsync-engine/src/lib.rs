//! tsync-engine
//!
//! Incremental synchronization engine. Owns no IO: every effect goes
//! through the collaborator traits in [`ports`], configuration through
//! [`SyncContext`].
//!
//! - [`policy`]: pure watermark eligibility, cursor advance and backoff.
//! - [`WatermarkBook`]: watermark reads and writes over a [`SyncStore`].
//! - [`SyncEngine::run_job`]: one job under its lock, result as [`JobOutcome`].
//! - [`SyncEngine::run_pass`]: every job in dependency order behind the
//!   callability gate.
//! - [`SyncEngine::run_triggered`]: an ad-hoc [`TriggerEvent`] run forced.

mod context;
mod engine;
mod error;
mod fetcher;
mod identity;
mod jobs;
mod orchestrator;
pub mod policy;
pub mod ports;
mod report;
mod runner;
mod session;
mod trigger;
mod watermarks;

pub use context::SyncContext;
pub use engine::{Collaborators, SyncEngine};
pub use error::EngineError;
pub use orchestrator::{JobRun, PassReport};
pub use policy::{Eligibility, SchedulePolicy, WatermarkRegression};
pub use ports::{
    Clock, EnrolmentService, LockLease, LockService, MergeResolution, Notifier, SyncStore,
    SystemClock, UpsertOutcome, UserDirectory,
};
pub use report::{DeferReason, JobFailure, JobOutcome, JobReport, RecordError};
pub use trigger::{TriggerError, TriggerEvent};
pub use watermarks::WatermarkBook;
