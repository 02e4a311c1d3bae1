//! Watermark store operations over [`SyncStore`].

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use tsync_schemas::{Cursor, ResourceKind, Scope, Watermark};

use crate::policy::{self, SchedulePolicy};
use crate::{EngineError, SyncStore};

pub struct WatermarkBook<'a> {
    store: &'a dyn SyncStore,
}

impl<'a> WatermarkBook<'a> {
    pub fn new(store: &'a dyn SyncStore) -> Self {
        Self { store }
    }

    /// Stored watermark, created at the origin cursor on first use.
    pub async fn get(
        &self,
        platform: &str,
        kind: ResourceKind,
        scope: Scope,
    ) -> Result<Watermark, EngineError> {
        if let Some(wm) = self.store.load_watermark(platform, kind, scope).await? {
            return Ok(wm);
        }
        let wm = Watermark::fresh(kind, scope, platform);
        self.store.save_watermark(&wm).await?;
        debug!(job = %kind, %scope, "watermark created");
        Ok(wm)
    }

    /// Move the cursor forward. Call only after every record up to `cursor`
    /// is durably stored.
    pub async fn advance(&self, wm: &mut Watermark, cursor: Cursor) -> Result<(), EngineError> {
        policy::check_advance(wm.cursor, cursor)?;
        wm.cursor = cursor;
        self.store.save_watermark(wm).await?;
        Ok(())
    }

    pub async fn record_error(
        &self,
        wm: &mut Watermark,
        message: &str,
        now: DateTime<Utc>,
        schedule: &SchedulePolicy,
    ) -> Result<(), EngineError> {
        policy::on_failure(wm, now, message, schedule);
        self.store.save_watermark(wm).await?;
        Ok(())
    }

    pub async fn record_success(
        &self,
        wm: &mut Watermark,
        now: DateTime<Utc>,
        interval: Duration,
    ) -> Result<(), EngineError> {
        policy::on_success(wm, now, interval);
        self.store.save_watermark(wm).await?;
        Ok(())
    }

    pub async fn set_window_end(
        &self,
        wm: &mut Watermark,
        end: Option<DateTime<Utc>>,
    ) -> Result<(), EngineError> {
        if wm.attempt_window_end != end {
            wm.attempt_window_end = end;
            self.store.save_watermark(wm).await?;
        }
        Ok(())
    }

    pub async fn disable(&self, wm: &mut Watermark) -> Result<(), EngineError> {
        wm.disabled = true;
        self.store.save_watermark(wm).await?;
        Ok(())
    }

    pub async fn enable(&self, wm: &mut Watermark) -> Result<(), EngineError> {
        wm.disabled = false;
        self.store.save_watermark(wm).await?;
        Ok(())
    }

    /// Back to the origin: the next run refetches everything. The window end
    /// and the disabled flag are kept.
    pub async fn reset(&self, wm: &mut Watermark) -> Result<(), EngineError> {
        let fresh = Watermark::fresh(wm.kind, wm.scope, wm.platform.clone());
        wm.cursor = fresh.cursor;
        wm.next_attempt_not_before = fresh.next_attempt_not_before;
        wm.error_count = 0;
        wm.last_error = None;
        self.store.save_watermark(wm).await?;
        Ok(())
    }
}
