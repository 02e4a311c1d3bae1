//! Collection fetcher: drains every page after the watermark cursor.
//!
//! Items are handed to a [`PageHandler`] in upstream order. The in-memory
//! cursor follows each handled item and the watermark is persisted once per
//! page. If a handler aborts mid-page, progress up to the last handled item
//! is saved first, so nothing committed is fetched again and nothing after
//! it is skipped.

use async_trait::async_trait;
use tracing::{debug, warn};
use tsync_client::xml::Element;
use tsync_client::{parse_timestamp, CollectionQuery};
use tsync_schemas::{Cursor, Watermark};

use crate::error::JobError;
use crate::session::ApiSession;
use crate::{JobReport, SyncEngine};

/// Per-item processing for one job.
///
/// Record-level problems go into `report` and return `Ok`; an `Err` stops
/// the drain.
#[async_trait]
pub(crate) trait PageHandler: Send {
    async fn handle(&mut self, item: &Element, report: &mut JobReport) -> Result<(), JobError>;
}

/// Composite position of a raw item, read before decoding so a record that
/// fails to decode can still be stepped over.
pub(crate) fn item_cursor(item: &Element, id_field: &str) -> Option<Cursor> {
    let modified = parse_timestamp(item.child_text("LastModifiedDateTime")?)?;
    let id = item.child_text(id_field)?.trim().parse().ok()?;
    Some(Cursor::new(modified, id))
}

pub(crate) async fn drain(
    engine: &SyncEngine,
    query: &CollectionQuery,
    wm: &mut Watermark,
    handler: &mut dyn PageHandler,
    report: &mut JobReport,
) -> Result<(), JobError> {
    let session = ApiSession::new(engine);
    let book = engine.watermarks();

    loop {
        let start = wm.cursor;
        let page = session.fetch_page(&query.resume_after(start)).await?;
        report.pages += 1;
        debug!(
            job = %wm.kind,
            scope = %wm.scope,
            items = page.items.len(),
            has_more = page.has_more,
            "page fetched"
        );

        let mut progress = start;
        for item in &page.items {
            report.records += 1;
            let cursor = match item_cursor(item, query.id_field) {
                Some(c) => c,
                None => {
                    let id = item.child_text(query.id_field).and_then(|v| v.parse().ok());
                    report.record_error(
                        id,
                        format!("{} without a usable LastModifiedDateTime/{}", query.item, query.id_field),
                    );
                    continue;
                }
            };
            if cursor <= progress {
                report.record_error(
                    Some(cursor.last_id),
                    format!("{} returned out of order; skipped", query.item),
                );
                continue;
            }
            if let Err(e) = handler.handle(item, report).await {
                if progress > wm.cursor {
                    book.advance(wm, progress).await?;
                }
                return Err(e);
            }
            progress = cursor;
        }

        if progress > wm.cursor {
            book.advance(wm, progress).await?;
        }

        if !page.has_more {
            return Ok(());
        }
        if progress == start {
            warn!(
                job = %wm.kind,
                scope = %wm.scope,
                "upstream signalled more pages but the cursor did not move; stopping"
            );
            return Ok(());
        }
    }
}
