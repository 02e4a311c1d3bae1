use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use tsync_client::Upstream;
use tsync_config::PlatformSettings;
use tsync_schemas::ApiStatus;

use crate::{
    Clock, EnrolmentService, EngineError, LockService, Notifier, SyncContext, SyncStore,
    UserDirectory, WatermarkBook,
};

/// Every injected collaborator the engine drives.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn SyncStore>,
    pub locks: Arc<dyn LockService>,
    pub enrolments: Arc<dyn EnrolmentService>,
    pub users: Arc<dyn UserDirectory>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

/// The synchronization engine: context plus collaborators.
///
/// Cheap to clone; runs are driven through [`SyncEngine::run_job`],
/// [`SyncEngine::run_pass`] and [`SyncEngine::run_triggered`].
#[derive(Clone)]
pub struct SyncEngine {
    ctx: SyncContext,
    deps: Collaborators,
}

impl SyncEngine {
    pub fn new(ctx: SyncContext, deps: Collaborators) -> Self {
        Self { ctx, deps }
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    pub fn store(&self) -> &dyn SyncStore {
        self.deps.store.as_ref()
    }

    pub(crate) fn locks(&self) -> &dyn LockService {
        self.deps.locks.as_ref()
    }

    pub(crate) fn enrolments(&self) -> &dyn EnrolmentService {
        self.deps.enrolments.as_ref()
    }

    pub(crate) fn users(&self) -> &dyn UserDirectory {
        self.deps.users.as_ref()
    }

    pub(crate) fn notifier(&self) -> &dyn Notifier {
        self.deps.notifier.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.deps.clock.now()
    }

    pub fn watermarks(&self) -> WatermarkBook<'_> {
        WatermarkBook::new(self.store())
    }

    /// Current API status of the configured platform.
    pub async fn api_status(&self) -> Result<ApiStatus, EngineError> {
        Ok(self.store().load_api_status(self.ctx.platform()).await?)
    }

    /// Gate check against the persisted API status.
    pub async fn is_callable(&self) -> Result<bool, EngineError> {
        let status = self.api_status().await?;
        Ok(tsync_client::status::is_callable(&status, self.now()))
    }

    /// Swap host and credentials. The new platform starts with a clean API
    /// status so a past credential outage does not keep the gate closed.
    pub async fn replace_platform(
        &mut self,
        platform: PlatformSettings,
        upstream: Arc<dyn Upstream>,
    ) -> Result<(), EngineError> {
        let name = platform.name.clone();
        let previous = self.ctx.replace_platform(platform, upstream);
        let mut status = self.store().load_api_status(&name).await?;
        tsync_client::status::reset(&mut status);
        self.store().save_api_status(&name, &status).await?;
        info!(previous = %previous, platform = %name, "platform replaced; api status reset");
        Ok(())
    }
}
