//! Site-wide catalog mirrors: event templates, events, online activities.
//!
//! Events and activities also refresh the enrolment instances bound to them:
//! the end date follows the event, and a cancelled source disables the
//! instance.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;
use tsync_client::xml::Element;
use tsync_client::{CollectionQuery, FromElement};
use tsync_schemas::{Event, EventStatus, EventTemplate, OnlineActivity, ResourceKind, Watermark};

use crate::error::JobError;
use crate::fetcher::{drain, PageHandler};
use crate::{EngineError, JobReport, SyncEngine};

pub(super) async fn run(
    engine: &SyncEngine,
    kind: ResourceKind,
    wm: &mut Watermark,
    report: &mut JobReport,
) -> Result<(), JobError> {
    let ctx = engine.context();
    let query = CollectionQuery::for_kind(kind, wm.cursor, ctx.page_size()).ok_or_else(|| {
        EngineError::invariant(format!("{kind} has no collection query"))
    })?;
    let mut handler = CatalogHandler { engine, kind };
    drain(engine, &query, wm, &mut handler, report).await
}

struct CatalogHandler<'a> {
    engine: &'a SyncEngine,
    kind: ResourceKind,
}

fn decode<T: FromElement>(
    platform: &str,
    item: &Element,
    report: &mut JobReport,
) -> Option<T> {
    match T::from_element(platform, item) {
        Ok(v) => Some(v),
        Err(e) => {
            report.record_error(e.source_id, e.to_string());
            None
        }
    }
}

#[async_trait]
impl<'a> PageHandler for CatalogHandler<'a> {
    async fn handle(&mut self, item: &Element, report: &mut JobReport) -> Result<(), JobError> {
        let store = self.engine.store();
        let platform = self.engine.context().platform();
        match self.kind {
            ResourceKind::EventTemplates => {
                if let Some(t) = decode::<EventTemplate>(platform, item, report) {
                    report.count(store.upsert_event_template(&t).await?);
                }
            }
            ResourceKind::Events => {
                if let Some(e) = decode::<Event>(platform, item, report) {
                    report.count(store.upsert_event(&e).await?);
                    refresh_instances(self.engine, &e.source_guid, Some(e.finish_at), e.status)
                        .await?;
                }
            }
            ResourceKind::OnlineActivities => {
                if let Some(a) = decode::<OnlineActivity>(platform, item, report) {
                    report.count(store.upsert_online_activity(&a).await?);
                    refresh_instances(self.engine, &a.source_guid, None, a.status).await?;
                }
            }
            other => {
                return Err(EngineError::invariant(format!("{other} is not a catalog job")).into())
            }
        }
        Ok(())
    }
}

/// `end_at` is `None` when the source carries no end date; the instance keeps
/// its own.
async fn refresh_instances(
    engine: &SyncEngine,
    source_guid: &str,
    end_at: Option<Option<DateTime<Utc>>>,
    status: EventStatus,
) -> Result<(), JobError> {
    let store = engine.store();
    let platform = engine.context().platform();
    for inst in store.instances_for_source(platform, source_guid).await? {
        let end = end_at.unwrap_or(inst.end_at);
        let enabled = inst.enabled && status != EventStatus::Cancelled;
        if end != inst.end_at || enabled != inst.enabled {
            store.update_instance(inst.id, end, enabled).await?;
            if !enabled && inst.enabled {
                info!(instance = inst.id, source = source_guid, "instance disabled: source cancelled");
            }
        }
    }
    Ok(())
}
