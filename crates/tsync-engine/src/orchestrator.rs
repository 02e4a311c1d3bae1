//! A full synchronization pass in dependency order.
//!
//! ```text
//! event_templates → events → online_activities → contact_merge_requests
//!   → orphan cleanup
//!   → registrations (every instance) → outcomes (every instance) → contacts (every instance)
//!   → enrolment_expirations → notifications
//!   → request log purge
//! ```
//!
//! The callability gate is checked before every API job. Once it is closed
//! the remaining API jobs are deferred without touching their watermarks;
//! local-only stages still run.

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info};
use tsync_schemas::{ResourceKind, Scope};

use crate::{DeferReason, EngineError, JobOutcome, SyncEngine};

const GLOBAL_STAGE: [ResourceKind; 4] = [
    ResourceKind::EventTemplates,
    ResourceKind::Events,
    ResourceKind::OnlineActivities,
    ResourceKind::ContactMergeRequests,
];

const INSTANCE_STAGE: [ResourceKind; 3] = [
    ResourceKind::Registrations,
    ResourceKind::Outcomes,
    ResourceKind::Contacts,
];

const LOCAL_STAGE: [ResourceKind; 2] = [
    ResourceKind::EnrolmentExpirations,
    ResourceKind::Notifications,
];

#[derive(Debug, Clone, PartialEq)]
pub struct JobRun {
    pub kind: ResourceKind,
    pub scope: Scope,
    pub outcome: JobOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub jobs: Vec<JobRun>,
    pub orphans_deleted: u32,
    pub request_log_purged: u64,
    /// The gate was closed for part of the pass.
    pub gated: bool,
}

impl PassReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            jobs: Vec::new(),
            orphans_deleted: 0,
            request_log_purged: 0,
            gated: false,
        }
    }

    pub fn outcome(&self, kind: ResourceKind, scope: Scope) -> Option<&JobOutcome> {
        self.jobs
            .iter()
            .find(|r| r.kind == kind && r.scope == scope)
            .map(|r| &r.outcome)
    }

    pub fn succeeded(&self) -> usize {
        self.jobs.iter().filter(|r| r.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.jobs
            .iter()
            .filter(|r| matches!(r.outcome, JobOutcome::Failed(_)))
            .count()
    }
}

impl SyncEngine {
    /// Run every stage once. Invariant violations and store failures abort
    /// the pass; everything else is reported per job.
    pub async fn run_pass(&self, forced: bool) -> Result<PassReport, EngineError> {
        let result = self.run_stages(forced).await;
        if let Err(e) = &result {
            error!(error = %e, "sync pass aborted");
        }
        result
    }

    async fn run_stages(&self, forced: bool) -> Result<PassReport, EngineError> {
        let store = self.store();
        let platform = self.context().platform();
        let mut pass = PassReport::new(self.now());

        for kind in GLOBAL_STAGE {
            self.stage(kind, Scope::Global, forced, &mut pass).await?;
        }

        for orphan in store.orphan_registrations(platform).await? {
            store.delete_registration(orphan.id).await?;
            pass.orphans_deleted += 1;
        }

        let instances: Vec<i64> = store
            .list_instances(platform)
            .await?
            .into_iter()
            .filter(|i| i.enabled)
            .map(|i| i.id)
            .collect();
        for kind in INSTANCE_STAGE {
            for id in &instances {
                self.stage(kind, Scope::Instance(*id), forced, &mut pass).await?;
            }
        }

        for kind in LOCAL_STAGE {
            self.stage(kind, Scope::Global, forced, &mut pass).await?;
        }

        let retention = Duration::days(i64::from(
            self.context().settings().request_log.retention_days,
        ));
        pass.request_log_purged = store.purge_request_log(self.now() - retention).await?;

        info!(
            jobs = pass.jobs.len(),
            succeeded = pass.succeeded(),
            failed = pass.failed(),
            orphans = pass.orphans_deleted,
            gated = pass.gated,
            "sync pass complete"
        );
        Ok(pass)
    }

    async fn stage(
        &self,
        kind: ResourceKind,
        scope: Scope,
        forced: bool,
        pass: &mut PassReport,
    ) -> Result<(), EngineError> {
        if !kind.is_local_only() && (pass.gated || !self.is_callable().await?) {
            if !pass.gated {
                info!(job = %kind, "api not callable; deferring remaining api jobs");
            }
            pass.gated = true;
            pass.jobs.push(JobRun {
                kind,
                scope,
                outcome: JobOutcome::Deferred(DeferReason::ApiUnavailable),
            });
            return Ok(());
        }
        let outcome = self.run_job(kind, scope, forced).await?;
        pass.jobs.push(JobRun {
            kind,
            scope,
            outcome,
        });
        Ok(())
    }
}
