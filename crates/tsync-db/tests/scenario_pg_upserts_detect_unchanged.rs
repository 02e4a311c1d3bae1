//! Scenario: Postgres Upserts Detect Unchanged Snapshots
//!
//! # Invariants under test
//! - Mirrors are keyed by (platform, source_guid): first write inserts, an
//!   identical snapshot reports Unchanged, a changed one reports Updated.
//! - A contact refresh never clears its user binding.
//! - A registration refresh with no user keeps the stored binding, the
//!   pending outcome, the push flag and the enrolled user.
//! - A failed merge request that is still active holds its destination;
//!   resolving it releases the hold.
//!
//! All tests skip gracefully when `TSYNC_DATABASE_URL` is not set.

use chrono::{TimeZone, Utc};
use tsync_engine::{MergeResolution, SyncStore, UpsertOutcome};
use tsync_schemas::{
    Contact, ContactMergeRequest, Event, EventStatus, InstanceSource, OutcomeFields, Registration,
    RegistrationStatus,
};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn store() -> anyhow::Result<Option<tsync_db::PgStore>> {
    let url = match std::env::var(tsync_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: TSYNC_DATABASE_URL not set");
            return Ok(None);
        }
    };
    let pool = tsync_db::connect(&url).await?;
    tsync_db::migrate(&pool).await?;
    Ok(Some(tsync_db::PgStore::new(pool)))
}

/// Each test writes under its own platform so runs never collide.
fn platform() -> String {
    format!("test-{}", Uuid::new_v4())
}

fn event(platform: &str, code: &str) -> Event {
    Event {
        platform: platform.to_string(),
        source_id: 10,
        source_guid: "ev-1".to_string(),
        template_guid: None,
        code: code.to_string(),
        start_at: None,
        finish_at: Some(Utc.with_ymd_and_hms(2024, 10, 1, 0, 0, 0).unwrap()),
        status: EventStatus::Active,
        source_modified: Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap(),
    }
}

fn contact(platform: &str, last_name: &str) -> Contact {
    Contact {
        platform: platform.to_string(),
        source_id: 101,
        source_guid: "c-1".to_string(),
        first_name: "Ada".to_string(),
        last_name: last_name.to_string(),
        email: Some("ada@example.com".to_string()),
        code: None,
        source_modified: Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap(),
    }
}

fn registration(platform: &str, status: RegistrationStatus) -> Registration {
    Registration {
        platform: platform.to_string(),
        source_id: 1,
        source_guid: "reg-1".to_string(),
        contact_guid: "c-1".to_string(),
        event_guid: Some("ev-1".to_string()),
        online_activity_guid: None,
        status,
        upstream_outcome: OutcomeFields::default(),
        source_modified: Utc.with_ymd_and_hms(2024, 9, 2, 0, 0, 0).unwrap(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn event_upsert_reports_each_outcome() -> anyhow::Result<()> {
    let Some(store) = store().await? else { return Ok(()) };
    let p = platform();

    assert_eq!(store.upsert_event(&event(&p, "E1")).await?, UpsertOutcome::Inserted);
    assert_eq!(store.upsert_event(&event(&p, "E1")).await?, UpsertOutcome::Unchanged);
    assert_eq!(store.upsert_event(&event(&p, "E1b")).await?, UpsertOutcome::Updated);

    let stored = store.find_event(&p, "ev-1").await?.expect("event stored");
    assert_eq!(stored, event(&p, "E1b"));
    assert!(store.find_event(&platform(), "ev-1").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn contact_refresh_keeps_user_binding() -> anyhow::Result<()> {
    let Some(store) = store().await? else { return Ok(()) };
    let p = platform();

    let (first, outcome) = store.upsert_contact(&contact(&p, "Lovelace")).await?;
    assert_eq!(outcome, UpsertOutcome::Inserted);
    assert_eq!(first.user_id, None);

    store.bind_contact_user(&p, "c-1", Some(42)).await?;
    let (again, outcome) = store.upsert_contact(&contact(&p, "Lovelace")).await?;
    assert_eq!(outcome, UpsertOutcome::Unchanged);
    assert_eq!(again.user_id, Some(42));

    let (renamed, outcome) = store.upsert_contact(&contact(&p, "King")).await?;
    assert_eq!(outcome, UpsertOutcome::Updated);
    assert_eq!(renamed.user_id, Some(42));
    assert_eq!(renamed.id, first.id);
    assert_eq!(renamed.contact.last_name, "King");
    Ok(())
}

#[tokio::test]
async fn registration_refresh_keeps_local_state() -> anyhow::Result<()> {
    let Some(store) = store().await? else { return Ok(()) };
    let p = platform();
    let inst = tsync_db::insert_instance(
        store.pool(),
        &p,
        &InstanceSource::Event { guid: "ev-1".to_string() },
        None,
    )
    .await?;

    let (rec, outcome) = store
        .upsert_registration(inst.id, &registration(&p, RegistrationStatus::Approved), Some(7))
        .await?;
    assert_eq!(outcome, UpsertOutcome::Inserted);
    assert_eq!(rec.user_id, Some(7));

    let grade = OutcomeFields {
        grade: Some("A".to_string()),
        ..OutcomeFields::default()
    };
    assert_eq!(rec.enrolled_user_id, None);
    store.mark_registration_enrolled(rec.id, Some(7)).await?;
    store.queue_outcome(rec.id, &grade).await?;
    assert_eq!(store.registrations_pending_push(inst.id).await?.len(), 1);

    let (_, outcome) = store
        .upsert_registration(inst.id, &registration(&p, RegistrationStatus::Approved), None)
        .await?;
    assert_eq!(outcome, UpsertOutcome::Unchanged);

    let (rec, outcome) = store
        .upsert_registration(inst.id, &registration(&p, RegistrationStatus::Completed), None)
        .await?;
    assert_eq!(outcome, UpsertOutcome::Updated);
    assert_eq!(rec.user_id, Some(7));
    assert_eq!(rec.pending_outcome, grade);
    assert!(rec.update_source);
    assert_eq!(rec.enrolled_user_id, Some(7));

    store.mark_registration_pushed(rec.id, &grade).await?;
    let rec = store.find_registration(&p, "reg-1").await?.expect("registration stored");
    assert!(!rec.update_source);
    assert_eq!(rec.registration.upstream_outcome, grade);

    tsync_db::delete_instance(store.pool(), inst.id).await?;
    let orphans = store.orphan_registrations(&p).await?;
    assert_eq!(orphans.len(), 1);
    store.delete_registration(orphans[0].id).await?;
    assert!(store.find_registration(&p, "reg-1").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn failed_merge_holds_its_destination() -> anyhow::Result<()> {
    let Some(store) = store().await? else { return Ok(()) };
    let p = platform();
    let request = |id: i64, source: &str, minute: u32| ContactMergeRequest {
        platform: p.clone(),
        source_id: id,
        source_contact_guid: source.to_string(),
        destination_contact_guid: "c-dst".to_string(),
        source_user_id: None,
        destination_user_id: None,
        created_at: Utc.with_ymd_and_hms(2024, 9, 1, 0, minute, 0).unwrap(),
        source_modified: Utc.with_ymd_and_hms(2024, 9, 1, 0, minute, 0).unwrap(),
        active: true,
        merge_failed: false,
    };
    store.upsert_merge_request(&request(900, "c-a", 5)).await?;
    store.upsert_merge_request(&request(901, "c-b", 7)).await?;
    assert_eq!(store.failed_merge_for_destination(&p, "c-dst").await?, None);

    store
        .close_merge_request(&p, 900, MergeResolution::Failed, Some(11), Some(22))
        .await?;
    assert_eq!(store.failed_merge_for_destination(&p, "c-dst").await?, Some(900));
    assert_eq!(store.failed_merge_for_destination(&p, "c-other").await?, None);
    let pending: Vec<i64> = store
        .pending_merge_requests(&p, "c-dst")
        .await?
        .iter()
        .map(|r| r.source_id)
        .collect();
    assert_eq!(pending, vec![901]);

    // operator resolution
    store
        .close_merge_request(&p, 900, MergeResolution::Resolved, Some(11), Some(22))
        .await?;
    assert_eq!(store.failed_merge_for_destination(&p, "c-dst").await?, None);
    Ok(())
}
