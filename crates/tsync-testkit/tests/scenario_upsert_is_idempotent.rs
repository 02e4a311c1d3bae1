//! Scenario: Upsert Is Idempotent
//!
//! # Invariants under test
//! - Re-applying the same page (watermark reset, as after a crash before the
//!   advance) writes nothing and creates no duplicates.
//! - A changed snapshot updates the existing row in place.

use tsync_engine::JobOutcome;
use tsync_schemas::{ResourceKind, Scope};
use tsync_testkit::fixtures::{at, template, PLATFORM};
use tsync_testkit::Harness;

#[tokio::test]
async fn replaying_a_page_is_a_no_op_write() {
    let h = Harness::new();
    h.upstream.set_items(
        "eventtemplates/",
        (1..=5).map(|i| template(i, &format!("tpl-{i}"), at(i))).collect(),
    );

    h.engine
        .run_job(ResourceKind::EventTemplates, Scope::Global, false)
        .await
        .unwrap();
    assert_eq!(h.store.template_count(), 5);
    let writes = h.store.mirror_writes();

    // Crash before the advance: the watermark is back at the origin.
    let book = h.engine.watermarks();
    let mut wm = book
        .get(PLATFORM, ResourceKind::EventTemplates, Scope::Global)
        .await
        .unwrap();
    book.reset(&mut wm).await.unwrap();

    let outcome = h
        .engine
        .run_job(ResourceKind::EventTemplates, Scope::Global, true)
        .await
        .unwrap();
    let JobOutcome::Success(report) = outcome else {
        panic!("expected success, got {outcome:?}");
    };
    assert_eq!(report.records, 5);
    assert_eq!(report.unchanged, 5);
    assert_eq!(report.inserted + report.updated, 0);
    assert_eq!(h.store.mirror_writes(), writes, "identical snapshots must not be rewritten");
    assert_eq!(h.store.template_count(), 5);
}

#[tokio::test]
async fn changed_snapshot_updates_in_place() {
    let h = Harness::new();
    h.upstream.set_items("eventtemplates/", vec![template(1, "tpl-1", at(1))]);
    h.engine
        .run_job(ResourceKind::EventTemplates, Scope::Global, false)
        .await
        .unwrap();

    h.upstream.set_items("eventtemplates/", vec![template(1, "tpl-1", at(50))]);
    let outcome = h
        .engine
        .run_job(ResourceKind::EventTemplates, Scope::Global, true)
        .await
        .unwrap();
    let report = outcome.report().unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.inserted, 0);
    assert_eq!(h.store.template_count(), 1);
}
