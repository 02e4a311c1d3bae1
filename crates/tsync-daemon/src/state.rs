//! Shared runtime state for tsync-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The engine sits behind
//! an `RwLock` so passes share it while a platform swap takes it exclusively;
//! a separate mutex keeps passes from overlapping.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tsync_client::Upstream;
use tsync_config::PlatformSettings;
use tsync_engine::{EngineError, JobOutcome, SyncEngine, SyncStore, TriggerError, TriggerEvent};

use crate::api_types::{JobSummary, PassSummary, StatusResponse, WatermarkView};

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    pub build: BuildInfo,
    pub engine: RwLock<SyncEngine>,
    /// Summary of the most recent completed pass.
    pub last_pass: RwLock<Option<PassSummary>>,
    pass_running: Mutex<()>,
}

impl AppState {
    pub fn new(engine: SyncEngine) -> Self {
        Self {
            build: BuildInfo {
                service: "tsync-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            engine: RwLock::new(engine),
            last_pass: RwLock::new(None),
            pass_running: Mutex::new(()),
        }
    }

    /// Run one pass unless another is in flight, in which case `Ok(None)`.
    pub async fn run_pass(&self, forced: bool) -> Result<Option<PassSummary>, EngineError> {
        let Ok(_running) = self.pass_running.try_lock() else {
            return Ok(None);
        };
        let engine = self.engine.read().await;
        let report = engine.run_pass(forced).await?;
        let summary = PassSummary::from_report(&report, forced, engine.now());
        drop(engine);

        info!(
            forced,
            succeeded = summary.succeeded,
            failed = summary.failed,
            gated = summary.gated,
            "sync pass finished"
        );
        *self.last_pass.write().await = Some(summary.clone());
        Ok(Some(summary))
    }

    /// Run the job an external trigger maps to. Shares the engine with
    /// passes; the job's own lock serializes it against a pass running it.
    pub async fn run_trigger(&self, event: &TriggerEvent) -> Result<JobSummary, TriggerError> {
        let (kind, scope) = event.resolve()?;
        let engine = self.engine.read().await;
        let outcome = engine.run_triggered(event).await?;
        if let JobOutcome::Failed(f) = &outcome {
            warn!(job = %kind, %scope, error = %f.error, "triggered job failed");
        }
        Ok(JobSummary::new(kind.as_str(), scope.to_string(), &outcome))
    }

    /// Swap the upstream platform once any in-flight pass has finished.
    pub async fn replace_platform(
        &self,
        platform: PlatformSettings,
        upstream: Arc<dyn Upstream>,
    ) -> Result<(), EngineError> {
        let _running = self.pass_running.lock().await;
        self.engine
            .write()
            .await
            .replace_platform(platform, upstream)
            .await
    }

    pub async fn status(&self) -> Result<StatusResponse, EngineError> {
        let engine = self.engine.read().await;
        let platform = engine.context().platform().to_string();
        let api_status = engine.api_status().await?;
        let callable = engine.is_callable().await?;
        let watermarks = engine
            .store()
            .list_watermarks(&platform)
            .await?
            .iter()
            .map(WatermarkView::from)
            .collect();
        drop(engine);

        Ok(StatusResponse {
            daemon_uptime_secs: uptime_secs(),
            platform,
            callable,
            api_status,
            watermarks,
            last_pass: self.last_pass.read().await.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn the scheduler: one unforced pass per tick. Each job decides for
/// itself whether it is due, so a short tick only costs watermark reads.
pub fn spawn_sync_loop(state: Arc<AppState>, tick: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match state.run_pass(false).await {
                Ok(Some(_)) => {}
                Ok(None) => info!("previous pass still running; tick skipped"),
                Err(e) if e.is_invariant() => {
                    error!(error = %e, "sync pass aborted on invariant violation")
                }
                Err(e) => error!(error = %e, "sync pass aborted"),
            }
        }
    })
}
