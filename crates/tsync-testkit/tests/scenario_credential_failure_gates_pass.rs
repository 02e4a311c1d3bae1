//! Scenario: Credential Failure Gates The Pass
//!
//! # Invariants under test
//! - A 403 closes the global callability gate; the rest of that pass and
//!   every pass inside the backoff window make no upstream calls.
//! - No job watermark's `error_count` moves on a credential failure.
//! - Local-only stages still run while the gate is closed.
//! - Reaching the alert threshold queues exactly one credential-failure
//!   notification, delivered by the same pass.
//! - A success reopens the gate and clears the counters.

use chrono::Duration;
use tsync_engine::{DeferReason, JobOutcome};
use tsync_schemas::{NotificationKind, ResourceKind, Scope};
use tsync_testkit::fixtures::{at, template, PLATFORM};
use tsync_testkit::Harness;

const API_JOBS: [ResourceKind; 4] = [
    ResourceKind::EventTemplates,
    ResourceKind::Events,
    ResourceKind::OnlineActivities,
    ResourceKind::ContactMergeRequests,
];

fn assert_job_counters_untouched(h: &Harness) {
    for kind in API_JOBS {
        if let Some(wm) = h.store.watermark(PLATFORM, kind, Scope::Global) {
            assert_eq!(wm.error_count, 0, "{kind} error_count moved");
            assert!(wm.last_error.is_none());
        }
    }
}

#[tokio::test]
async fn second_pass_inside_backoff_window_skips_all_api_jobs() {
    let h = Harness::new();
    h.upstream.fail_next(403);

    let first = h.engine.run_pass(false).await.unwrap();
    assert!(first.gated);
    assert_eq!(h.upstream.call_count(), 1, "the 403 must stop the pass");
    for kind in API_JOBS {
        assert_eq!(
            first.outcome(kind, Scope::Global),
            Some(&JobOutcome::Deferred(DeferReason::ApiUnavailable)),
            "{kind}"
        );
    }
    assert!(first
        .outcome(ResourceKind::Notifications, Scope::Global)
        .is_some_and(JobOutcome::is_success));

    let status = h.store.api_status_of(PLATFORM);
    assert_eq!(status.last_status, 403);
    assert_eq!(status.error_count, 1);

    h.clock.advance(Duration::seconds(30));
    let second = h.engine.run_pass(true).await.unwrap();
    assert!(second.gated);
    assert_eq!(h.upstream.call_count(), 1, "no call while the gate is closed");
    assert_job_counters_untouched(&h);
}

#[tokio::test]
async fn threshold_queues_one_credential_alert() {
    let h = Harness::new();

    for _ in 0..4 {
        h.upstream.fail_next(403);
        h.engine.run_pass(false).await.unwrap();
        h.clock.advance(Duration::hours(1));
    }

    let alerts: Vec<_> = h
        .notifier
        .delivered()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::CredentialFailure)
        .collect();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].subject, PLATFORM);
    assert!(h.store.notifications().is_empty(), "alert delivered and dequeued");
    assert_eq!(h.store.api_status_of(PLATFORM).error_count, 4);
    assert_job_counters_untouched(&h);
}

#[tokio::test]
async fn success_after_window_reopens_the_gate() {
    let h = Harness::new();
    h.upstream.set_items("eventtemplates/", vec![template(1, "tpl-1", at(1))]);
    h.upstream.fail_next(401);
    h.engine.run_pass(false).await.unwrap();

    h.clock.advance(Duration::minutes(2));
    let pass = h.engine.run_pass(false).await.unwrap();
    assert!(!pass.gated);
    assert!(pass
        .outcome(ResourceKind::EventTemplates, Scope::Global)
        .is_some_and(JobOutcome::is_success));

    let status = h.store.api_status_of(PLATFORM);
    assert_eq!(status.error_count, 0);
    assert!(status.next_callable_at.is_none());
    assert_eq!(h.store.template_count(), 1);
}

#[tokio::test]
async fn every_exchange_is_request_logged() {
    let h = Harness::new();
    h.upstream.fail_next(403);
    h.engine.run_pass(false).await.unwrap();

    let log = h.store.request_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].method, "GET");
    assert_eq!(log[0].status, Some(403));
    assert!(log[0].uri.ends_with("eventtemplates/"));
    assert!(log[0].error.is_some());
}
