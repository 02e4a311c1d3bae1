//! Scenario: Trigger Runs Forced
//!
//! # Invariants under test
//! - A trigger maps `{resource_type, resource_id}` onto a job and scope.
//! - Triggered runs bypass timing but not the lock or the callability gate.

use chrono::Duration;
use tsync_engine::{DeferReason, JobOutcome, TriggerError, TriggerEvent};
use tsync_schemas::{ResourceKind, Scope};
use tsync_testkit::fixtures::event_instance;
use tsync_testkit::Harness;

#[tokio::test]
async fn trigger_bypasses_not_due() {
    let h = Harness::new();
    h.engine
        .run_job(ResourceKind::Events, Scope::Global, false)
        .await
        .unwrap();
    let again = h
        .engine
        .run_job(ResourceKind::Events, Scope::Global, false)
        .await
        .unwrap();
    assert!(matches!(again, JobOutcome::Deferred(DeferReason::NotDue { .. })));

    let triggered = h
        .engine
        .run_triggered(&TriggerEvent::new("Event", Some(10)))
        .await
        .unwrap();
    assert!(triggered.is_success());
}

#[tokio::test]
async fn trigger_respects_lock_and_gate() {
    let h = Harness::new();
    h.store.insert_instance(event_instance(2, "ev-1", None));
    h.locks.hold("tsync:acme:outcomes:2");
    let locked = h
        .engine
        .run_triggered(&TriggerEvent::new("outcome", Some(2)))
        .await
        .unwrap();
    assert_eq!(locked, JobOutcome::Deferred(DeferReason::Locked));

    h.upstream.fail_next(401);
    h.engine
        .run_job(ResourceKind::Events, Scope::Global, true)
        .await
        .unwrap();
    h.clock.advance(Duration::seconds(5));
    let gated = h
        .engine
        .run_triggered(&TriggerEvent::new("online-activity", None))
        .await
        .unwrap();
    assert_eq!(gated, JobOutcome::Deferred(DeferReason::ApiUnavailable));
}

#[tokio::test]
async fn bad_trigger_is_rejected() {
    let h = Harness::new();
    let err = h
        .engine
        .run_triggered(&TriggerEvent::new("registration", None))
        .await
        .unwrap_err();
    assert!(matches!(err, TriggerError::MissingInstance(ResourceKind::Registrations)));

    let err = h
        .engine
        .run_triggered(&TriggerEvent::new("webinar", None))
        .await
        .unwrap_err();
    assert!(matches!(err, TriggerError::UnknownResourceType(_)));
}
