//! Scenario: Locked Job Is Deferred
//!
//! # Invariants under test
//! - A held lock defers the job as `Locked`: no watermark is created, no
//!   error counted, no upstream call made.
//! - The lease is released after every run, successful or aborted.
//! - A release failure after a clean run surfaces as `LockRelease`.

use tsync_engine::{DeferReason, EngineError, JobOutcome};
use tsync_schemas::{ResourceKind, Scope};
use tsync_testkit::fixtures::{event_instance, PLATFORM};
use tsync_testkit::Harness;

#[tokio::test]
async fn contention_defers_without_side_effects() {
    let h = Harness::new();
    let name = h.engine.context().lock_name(ResourceKind::Events, Scope::Global);
    assert_eq!(name, "tsync:acme:events");
    h.locks.hold(&name);

    let outcome = h
        .engine
        .run_job(ResourceKind::Events, Scope::Global, true)
        .await
        .unwrap();
    assert_eq!(outcome, JobOutcome::Deferred(DeferReason::Locked));
    assert!(h
        .store
        .watermark(PLATFORM, ResourceKind::Events, Scope::Global)
        .is_none());
    assert_eq!(h.upstream.call_count(), 0);

    h.locks.free(&name);
    let outcome = h
        .engine
        .run_job(ResourceKind::Events, Scope::Global, true)
        .await
        .unwrap();
    assert!(outcome.is_success());
    assert!(!h.locks.is_held(&name), "lease released after the run");
}

#[tokio::test]
async fn per_instance_locks_are_independent() {
    let h = Harness::new();
    h.store.insert_instance(event_instance(1, "ev-1", None));
    h.store.insert_instance(event_instance(2, "ev-2", None));
    h.locks.hold("tsync:acme:outcomes:1");

    let one = h
        .engine
        .run_job(ResourceKind::Outcomes, Scope::Instance(1), true)
        .await
        .unwrap();
    let two = h
        .engine
        .run_job(ResourceKind::Outcomes, Scope::Instance(2), true)
        .await
        .unwrap();
    assert_eq!(one, JobOutcome::Deferred(DeferReason::Locked));
    assert!(two.is_success());
}

#[tokio::test]
async fn aborted_run_still_releases_the_lease() {
    let h = Harness::new();
    // linked event is not mirrored: invariant violation
    h.store.insert_instance(event_instance(3, "ev-missing", None));

    let err = h
        .engine
        .run_job(ResourceKind::Registrations, Scope::Instance(3), true)
        .await
        .unwrap_err();
    assert!(err.is_invariant(), "got {err}");
    assert!(!h.locks.is_held("tsync:acme:registrations:3"));
}

#[tokio::test]
async fn release_failure_after_clean_run_is_reported() {
    let h = Harness::new();
    h.locks.fail_next_release();

    let err = h
        .engine
        .run_job(ResourceKind::Notifications, Scope::Global, true)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::LockRelease { ref name, .. } if name == "tsync:acme:notifications"));
}
