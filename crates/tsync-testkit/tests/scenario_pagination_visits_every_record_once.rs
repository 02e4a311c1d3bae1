//! Scenario: Pagination Visits Every Record Once
//!
//! # Invariants under test
//! - With page size P < N and duplicate timestamps, the composite
//!   `(LastModifiedDateTime, id)` filter visits every record exactly once,
//!   in `(timestamp, id)` order.
//! - Each page resumes from the last record of the previous page.
//! - The watermark ends at the last record and a rerun fetches nothing.

use tsync_client::{FromElement, RegistrationParent, Upstream};
use tsync_engine::JobOutcome;
use tsync_schemas::{Cursor, Event, ResourceKind, Scope};
use tsync_testkit::fixtures::{at, event, PLATFORM};
use tsync_testkit::Harness;

/// Eight events over three timestamps, deliberately inserted out of order.
fn seed(h: &Harness) -> Vec<(i64, i64)> {
    let spec = [(5, 10), (2, 10), (8, 20), (1, 10), (7, 20), (3, 30), (4, 30), (6, 30)];
    h.upstream.set_items(
        "events/",
        spec.iter()
            .map(|(id, t)| event(*id, &format!("ev-{id}"), at(*t), "Active", None))
            .collect(),
    );
    let mut sorted: Vec<(i64, i64)> = spec.iter().map(|(id, t)| (*t, *id)).collect();
    sorted.sort();
    sorted
}

#[tokio::test]
async fn every_record_is_visited_once_in_composite_order() {
    let h = Harness::new();
    let sorted = seed(&h);

    let outcome = h
        .engine
        .run_job(ResourceKind::Events, Scope::Global, false)
        .await
        .unwrap();
    let JobOutcome::Success(report) = outcome else {
        panic!("expected success, got {outcome:?}");
    };

    // 8 records at page size 3: 3 + 3 + 2.
    assert_eq!(report.pages, 3);
    assert_eq!(report.records, 8);
    assert_eq!(report.inserted, 8);
    assert!(report.errors.is_empty());
    assert_eq!(h.store.event_count(), 8);

    // Page k+1 starts exactly after the last record of page k.
    let cursors: Vec<Cursor> = h.upstream.queries().iter().map(|q| q.cursor).collect();
    let expected: Vec<Cursor> = [None, Some(2usize), Some(5)]
        .iter()
        .map(|idx| match idx {
            None => Cursor::origin(),
            Some(i) => {
                let (t, id) = sorted[*i];
                Cursor::new(at(t), id)
            }
        })
        .collect();
    assert_eq!(cursors, expected);

    let wm = h
        .store
        .watermark(PLATFORM, ResourceKind::Events, Scope::Global)
        .unwrap();
    let (t, id) = *sorted.last().unwrap();
    assert_eq!(wm.cursor, Cursor::new(at(t), id));
}

#[tokio::test]
async fn concatenated_pages_equal_sorted_records() {
    let h = Harness::new();
    let sorted = seed(&h);

    h.engine
        .run_job(ResourceKind::Events, Scope::Global, false)
        .await
        .unwrap();

    // Replay the queries the engine issued against the same data.
    let mut visited = Vec::new();
    for q in h.upstream.queries() {
        let page = h.upstream.fetch_page(&q).await.unwrap();
        for item in page.items {
            let e = Event::from_element(PLATFORM, &item).unwrap();
            visited.push((e.source_modified, e.source_id));
        }
    }
    let expected: Vec<_> = sorted.iter().map(|(t, id)| (at(*t), *id)).collect();
    assert_eq!(visited, expected);
}

#[tokio::test]
async fn rerun_after_completion_fetches_nothing_new() {
    let h = Harness::new();
    seed(&h);

    h.engine
        .run_job(ResourceKind::Events, Scope::Global, false)
        .await
        .unwrap();
    let outcome = h
        .engine
        .run_job(ResourceKind::Events, Scope::Global, true)
        .await
        .unwrap();
    let report = outcome.report().unwrap();
    assert_eq!(report.pages, 1);
    assert_eq!(report.records, 0);
}

#[test]
fn registration_query_is_scoped_to_the_parent() {
    let q = tsync_client::CollectionQuery::registrations(
        RegistrationParent::Event(10),
        Cursor::origin(),
        3,
    );
    assert_eq!(q.path, "events/10/registrations/");
}
