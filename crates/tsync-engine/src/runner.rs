//! One job run: lock, eligibility, gate, execute, schedule, release.
//!
//! ```text
//! switched off? ─ instance usable? ─ acquire lock ─┬─ None ─────────────▶ Deferred(Locked)
//!                                                  └─ lease ─ eligible? ─ gate ─ execute ─ release
//! ```
//!
//! The lease is released on every path. A release failure after a clean run
//! is an [`EngineError::LockRelease`]; after a failed run the original error
//! wins and the release failure is logged.

use tracing::{debug, error, info, warn};
use tsync_schemas::{EnrolmentInstance, ResourceKind, Scope};

use crate::error::JobError;
use crate::jobs;
use crate::policy::{eligibility, Eligibility};
use crate::{DeferReason, EngineError, JobFailure, JobOutcome, JobReport, SyncEngine};

impl SyncEngine {
    pub async fn run_job(
        &self,
        kind: ResourceKind,
        scope: Scope,
        forced: bool,
    ) -> Result<JobOutcome, EngineError> {
        let ctx = self.context();
        if !ctx.job_enabled(kind) {
            return Ok(JobOutcome::Deferred(DeferReason::SwitchedOff));
        }
        if kind.is_per_instance() != matches!(scope, Scope::Instance(_)) {
            return Err(EngineError::invariant(format!(
                "job {kind} cannot run with scope {scope}"
            )));
        }

        let instance = match scope {
            Scope::Global => None,
            Scope::Instance(id) => match self.store().find_instance(id).await? {
                Some(inst) if inst.enabled => Some(inst),
                _ => {
                    debug!(job = %kind, instance = id, "instance missing or disabled");
                    return Ok(JobOutcome::Deferred(DeferReason::InstanceUnavailable));
                }
            },
        };

        let name = ctx.lock_name(kind, scope);
        let timeout = ctx.settings().locks.timeout();
        let Some(lease) = self.locks().acquire(&name, timeout).await? else {
            debug!(job = %kind, %scope, lock = %name, "lock held elsewhere; deferred");
            return Ok(JobOutcome::Deferred(DeferReason::Locked));
        };

        let result = self.run_locked(kind, scope, instance.as_ref(), forced).await;
        let released = self.locks().release(lease).await;

        match (result, released) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(source)) => Err(EngineError::LockRelease { name, source }),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release_err)) => {
                error!(lock = %name, error = %format!("{release_err:#}"), "lock release failed after aborted run");
                Err(e)
            }
        }
    }

    async fn run_locked(
        &self,
        kind: ResourceKind,
        scope: Scope,
        instance: Option<&EnrolmentInstance>,
        forced: bool,
    ) -> Result<JobOutcome, EngineError> {
        let ctx = self.context();
        let book = self.watermarks();
        let schedule = ctx.schedule_policy();
        let mut wm = book.get(ctx.platform(), kind, scope).await?;

        if let Some(inst) = instance {
            book.set_window_end(&mut wm, inst.end_at).await?;
        }

        match eligibility(&wm, self.now(), schedule.window_grace, forced) {
            Eligibility::Eligible => {}
            Eligibility::Disabled => return Ok(JobOutcome::Deferred(DeferReason::Disabled)),
            Eligibility::NotDue { until } => {
                return Ok(JobOutcome::Deferred(DeferReason::NotDue { until }))
            }
            Eligibility::WindowClosed => {
                book.disable(&mut wm).await?;
                info!(job = %kind, %scope, "attempt window closed; watermark disabled");
                return Ok(JobOutcome::Deferred(DeferReason::WindowClosed));
            }
        }

        if !kind.is_local_only() && !self.is_callable().await? {
            return Ok(JobOutcome::Deferred(DeferReason::ApiUnavailable));
        }

        let mut report = JobReport::new(kind, scope);
        let result = jobs::execute(self, kind, instance, &mut wm, &mut report).await;
        let now = self.now();

        match result {
            Ok(()) => {
                book.record_success(&mut wm, now, ctx.interval(kind)).await?;
                info!(
                    job = %kind,
                    %scope,
                    pages = report.pages,
                    records = report.records,
                    inserted = report.inserted,
                    updated = report.updated,
                    deleted = report.deleted,
                    errors = report.errors.len(),
                    "job complete"
                );
                Ok(JobOutcome::Success(report))
            }
            Err(JobError::Upstream(e)) if e.is_auth_failure() => {
                warn!(job = %kind, %scope, error = %e, "credentials rejected; job deferred");
                Ok(JobOutcome::Deferred(DeferReason::ApiUnavailable))
            }
            Err(JobError::Upstream(e)) => {
                let message = e.to_string();
                book.record_error(&mut wm, &message, now, &schedule).await?;
                warn!(
                    job = %kind,
                    %scope,
                    error_count = wm.error_count,
                    next_attempt = %wm.next_attempt_not_before.to_rfc3339(),
                    error = %message,
                    "job failed"
                );
                Ok(JobOutcome::Failed(JobFailure {
                    report,
                    error: message,
                }))
            }
            Err(JobError::Abort(e)) => {
                if e.is_invariant() {
                    error!(job = %kind, %scope, error = %e, "job aborted");
                }
                Err(e)
            }
        }
    }
}
