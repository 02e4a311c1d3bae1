//! Scenario: Attempt Window Disables The Watermark
//!
//! # Invariants under test
//! - A per-instance watermark's attempt window ends at the instance end
//!   date; past end plus grace the watermark is disabled.
//! - A disabled watermark stays disabled for forced runs until an operator
//!   enables it again.
//! - Inside the grace extension the job still runs.

use chrono::Duration;
use tsync_engine::{DeferReason, JobOutcome};
use tsync_schemas::{ResourceKind, Scope};
use tsync_testkit::fixtures::{event_instance, PLATFORM};
use tsync_testkit::Harness;

#[tokio::test]
async fn window_plus_grace_elapsed_disables() {
    let h = Harness::new();
    let now = h.engine.now();
    h.store
        .insert_instance(event_instance(4, "ev-1", Some(now - Duration::days(8))));

    let outcome = h
        .engine
        .run_job(ResourceKind::Outcomes, Scope::Instance(4), false)
        .await
        .unwrap();
    assert_eq!(outcome, JobOutcome::Deferred(DeferReason::WindowClosed));

    let wm = h
        .store
        .watermark(PLATFORM, ResourceKind::Outcomes, Scope::Instance(4))
        .unwrap();
    assert!(wm.disabled);
    assert_eq!(wm.attempt_window_end, Some(now - Duration::days(8)));

    let forced = h
        .engine
        .run_job(ResourceKind::Outcomes, Scope::Instance(4), true)
        .await
        .unwrap();
    assert_eq!(forced, JobOutcome::Deferred(DeferReason::Disabled));

    let book = h.engine.watermarks();
    let mut wm = wm;
    book.enable(&mut wm).await.unwrap();
    let forced = h
        .engine
        .run_job(ResourceKind::Outcomes, Scope::Instance(4), true)
        .await
        .unwrap();
    assert!(forced.is_success());
}

#[tokio::test]
async fn inside_grace_still_runs() {
    let h = Harness::new();
    let now = h.engine.now();
    h.store
        .insert_instance(event_instance(4, "ev-1", Some(now - Duration::days(6))));

    let outcome = h
        .engine
        .run_job(ResourceKind::Outcomes, Scope::Instance(4), false)
        .await
        .unwrap();
    assert!(outcome.is_success());
}

#[tokio::test]
async fn missing_or_disabled_instance_is_unavailable() {
    let h = Harness::new();
    let outcome = h
        .engine
        .run_job(ResourceKind::Outcomes, Scope::Instance(77), true)
        .await
        .unwrap();
    assert_eq!(outcome, JobOutcome::Deferred(DeferReason::InstanceUnavailable));
}
