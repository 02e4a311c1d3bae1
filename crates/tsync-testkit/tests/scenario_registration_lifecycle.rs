//! Scenario: Registration Lifecycle
//!
//! # Invariants under test
//! - Registrations are pulled per instance from the linked event's
//!   collection, with the contact mirrored from the expanded link.
//! - User association: one email match binds, none creates, several flag
//!   the contact, record `AmbiguousUserMatch` and notify.
//! - Approved/Completed registrations enrol the bound user once; Pending
//!   ones do not.
//! - A later Cancelled snapshot unenrols and deletes the local row.
//! - Registrations whose instance is gone are deleted by the pass.
//! - Event upserts refresh the instance end date; a cancelled event
//!   disables the instance.

use chrono::Duration;
use tsync_engine::JobOutcome;
use tsync_schemas::{
    NotificationKind, OutcomeFields, Registration, RegistrationRecord, RegistrationStatus,
    ResourceKind, Scope,
};
use tsync_testkit::fixtures::{at, contact, event, event_instance, registration, PLATFORM};
use tsync_testkit::Harness;

const REGS: &str = "events/10/registrations/";

fn seed(h: &Harness) {
    h.upstream.set_items(
        "events/",
        vec![event(10, "ev-1", at(0), "Active", Some(at(30 * 86_400)))],
    );
    h.store.insert_instance(event_instance(7, "ev-1", None));
    h.users.add_user(42, "ada1@example.com");
    h.upstream.set_items(
        REGS,
        vec![
            registration(1, "reg-1", "Approved", at(100), contact(101, "c-1", "ada1@example.com", at(1))),
            registration(2, "reg-2", "Completed", at(100), contact(102, "c-2", "new@example.com", at(1))),
            registration(3, "reg-3", "Pending", at(200), contact(103, "c-3", "ada1@example.com", at(1))),
        ],
    );
}

fn registration_of(h: &Harness, guid: &str) -> Option<RegistrationRecord> {
    h.store
        .registrations()
        .into_iter()
        .find(|r| r.registration.source_guid == guid)
}

#[tokio::test]
async fn first_pass_mirrors_binds_and_enrols() {
    let h = Harness::new();
    seed(&h);

    let pass = h.engine.run_pass(false).await.unwrap();
    let Some(JobOutcome::Success(report)) =
        pass.outcome(ResourceKind::Registrations, Scope::Instance(7))
    else {
        panic!("registrations did not succeed: {pass:?}");
    };
    assert_eq!(report.inserted, 3);
    assert!(report.errors.is_empty(), "{:?}", report.errors);

    // instance end date follows the event
    assert_eq!(h.store.instance(7).unwrap().end_at, Some(at(30 * 86_400)));

    let r1 = registration_of(&h, "reg-1").unwrap();
    assert_eq!(r1.user_id, Some(42));
    assert_eq!(r1.registration.event_guid.as_deref(), Some("ev-1"));
    assert_eq!(h.store.contact(PLATFORM, "c-1").unwrap().user_id, Some(42));

    let created = h.users.created();
    assert_eq!(created.len(), 1, "no match for c-2: one user created");
    assert_eq!(registration_of(&h, "reg-2").unwrap().user_id, Some(created[0]));

    assert!(h.enrolments.is_enrolled(7, 42));
    assert!(h.enrolments.is_enrolled(7, created[0]));
    let enrols = h
        .enrolments
        .calls()
        .iter()
        .filter(|(verb, _, _)| *verb == "enrol")
        .count();
    assert_eq!(enrols, 2, "pending reg-3 does not enrol");
}

#[tokio::test]
async fn cancellation_unenrols_and_deletes() {
    let h = Harness::new();
    seed(&h);
    h.engine.run_pass(false).await.unwrap();

    h.upstream.add_items(
        REGS,
        [registration(1, "reg-1", "Cancelled", at(500), contact(101, "c-1", "ada1@example.com", at(1)))],
    );
    h.clock.advance(Duration::hours(2));
    let pass = h.engine.run_pass(false).await.unwrap();

    let report = pass
        .outcome(ResourceKind::Registrations, Scope::Instance(7))
        .and_then(JobOutcome::report)
        .unwrap();
    assert_eq!(report.deleted, 1);
    assert!(registration_of(&h, "reg-1").is_none());
    assert!(!h.enrolments.is_enrolled(7, 42));
    assert!(h.enrolments.calls().contains(&("unenrol", 7, 42)));
}

#[tokio::test]
async fn unchanged_rerun_does_not_enrol_again() {
    let h = Harness::new();
    seed(&h);
    h.engine.run_pass(false).await.unwrap();

    // rewind and replay the same registrations
    let book = h.engine.watermarks();
    let mut wm = book
        .get(PLATFORM, ResourceKind::Registrations, Scope::Instance(7))
        .await
        .unwrap();
    book.reset(&mut wm).await.unwrap();
    h.engine
        .run_job(ResourceKind::Registrations, Scope::Instance(7), true)
        .await
        .unwrap();

    assert_eq!(h.enrolments.calls().len(), 2);
    assert_eq!(h.store.registrations().len(), 3);
}

#[tokio::test]
async fn ambiguous_email_flags_contact_and_notifies() {
    let h = Harness::new();
    seed(&h);
    h.users.add_user(50, "dup@example.com");
    h.users.add_user(51, "dup@example.com");
    h.upstream.add_items(
        REGS,
        [registration(4, "reg-4", "Approved", at(300), contact(104, "c-4", "dup@example.com", at(1)))],
    );

    let pass = h.engine.run_pass(false).await.unwrap();
    let report = pass
        .outcome(ResourceKind::Registrations, Scope::Instance(7))
        .and_then(JobOutcome::report)
        .unwrap();
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].source_id, Some(104));
    assert!(report.errors[0].message.starts_with("AmbiguousUserMatch"));

    let c4 = h.store.contact(PLATFORM, "c-4").unwrap();
    assert!(c4.user_association_failed);
    assert_eq!(c4.user_id, None);
    assert_eq!(registration_of(&h, "reg-4").unwrap().user_id, None);
    assert!(!h.enrolments.is_enrolled(7, 50));
    assert!(!h.enrolments.is_enrolled(7, 51));

    let delivered = h.notifier.delivered();
    assert!(delivered
        .iter()
        .any(|n| n.kind == NotificationKind::DuplicateUserMatch && n.subject == "c-4"));
}

#[tokio::test]
async fn orphaned_registrations_are_removed() {
    let h = Harness::new();
    h.store.put_registration(RegistrationRecord {
        id: 900,
        instance_id: 99,
        user_id: Some(1),
        registration: Registration {
            platform: PLATFORM.to_string(),
            source_id: 900,
            source_guid: "reg-orphan".to_string(),
            contact_guid: "c-x".to_string(),
            event_guid: Some("ev-gone".to_string()),
            online_activity_guid: None,
            status: RegistrationStatus::Approved,
            upstream_outcome: OutcomeFields::default(),
            source_modified: at(0),
        },
        pending_outcome: OutcomeFields::default(),
        update_source: false,
        expired: false,
        enrolled_user_id: Some(1),
    });

    let pass = h.engine.run_pass(false).await.unwrap();
    assert_eq!(pass.orphans_deleted, 1);
    assert!(h.store.registrations().is_empty());
}

#[tokio::test]
async fn cancelled_event_disables_its_instance() {
    let h = Harness::new();
    seed(&h);
    h.engine.run_pass(false).await.unwrap();

    h.upstream.add_items("events/", [event(10, "ev-1", at(900), "Cancelled", None)]);
    h.clock.advance(Duration::hours(2));
    h.engine.run_pass(false).await.unwrap();

    assert!(!h.store.instance(7).unwrap().enabled);
}
