//! Merge chain reconciliation over an in-memory directory.
//!
//! Invariants under test:
//! - A: no source contact, destination bound to 42 -> success, destination
//!   unchanged, request resolved.
//! - B: source user enrolled, destination user not -> destination rebinds to
//!   the source user, destination's old user suspended, source row deleted.
//! - C: both users enrolled -> failure, request `merge_failed`, still active,
//!   later requests in the chain untouched.
//! - Requests apply in ascending creation order regardless of input order.
//! - A request naming another destination fails loudly.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use tsync_merge::{reconcile_chain, MergeDirectory, MergeEffect, MergeError, MergeScenario};
use tsync_schemas::{Contact, ContactMergeRequest, ContactRecord};

#[derive(Default)]
struct Directory {
    contacts: Mutex<BTreeMap<String, ContactRecord>>,
    enrolled_users: BTreeSet<i64>,
    effects: Mutex<Vec<MergeEffect>>,
}

impl Directory {
    fn with(contacts: Vec<ContactRecord>, enrolled: &[i64]) -> Self {
        Self {
            contacts: Mutex::new(
                contacts
                    .into_iter()
                    .map(|c| (c.contact.source_guid.clone(), c))
                    .collect(),
            ),
            enrolled_users: enrolled.iter().copied().collect(),
            effects: Mutex::new(Vec::new()),
        }
    }

    fn contact(&self, guid: &str) -> Option<ContactRecord> {
        self.contacts.lock().unwrap().get(guid).cloned()
    }

    fn effects(&self) -> Vec<MergeEffect> {
        self.effects.lock().unwrap().clone()
    }
}

#[async_trait]
impl MergeDirectory for Directory {
    async fn find_contact(&self, guid: &str) -> anyhow::Result<Option<ContactRecord>> {
        Ok(self.contact(guid))
    }

    async fn has_enrolments(&self, user_id: i64) -> anyhow::Result<bool> {
        Ok(self.enrolled_users.contains(&user_id))
    }

    async fn apply(&self, effect: &MergeEffect) -> anyhow::Result<()> {
        let mut contacts = self.contacts.lock().unwrap();
        match effect {
            MergeEffect::BindUser {
                contact_guid,
                user_id,
            } => {
                if let Some(c) = contacts.get_mut(contact_guid) {
                    c.user_id = Some(*user_id);
                }
            }
            MergeEffect::DeleteContact { contact_guid } => {
                contacts.remove(contact_guid);
            }
            _ => {}
        }
        self.effects.lock().unwrap().push(effect.clone());
        Ok(())
    }
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap()
}

fn record(id: i64, guid: &str, user_id: Option<i64>) -> ContactRecord {
    ContactRecord {
        id,
        contact: Contact {
            platform: "acme".to_string(),
            source_id: id,
            source_guid: guid.to_string(),
            first_name: "F".to_string(),
            last_name: "L".to_string(),
            email: None,
            code: None,
            source_modified: t0(),
        },
        user_id,
        user_association_failed: false,
    }
}

fn request(id: i64, source: &str, dest: &str, created_offset_min: i64) -> ContactMergeRequest {
    ContactMergeRequest {
        platform: "acme".to_string(),
        source_id: id,
        source_contact_guid: source.to_string(),
        destination_contact_guid: dest.to_string(),
        source_user_id: None,
        destination_user_id: None,
        created_at: t0() + Duration::minutes(created_offset_min),
        source_modified: t0(),
        active: true,
        merge_failed: false,
    }
}

#[tokio::test]
async fn scenario_a_missing_source_contact_resolves() {
    let dest = record(1, "dst", Some(42));
    let dir = Directory::with(vec![dest.clone()], &[]);

    let out = reconcile_chain(&dir, dest.clone(), vec![request(10, "src", "dst", 0)])
        .await
        .unwrap();

    assert!(out.success);
    assert_eq!(out.contact, dest);
    assert_eq!(out.applied, vec![(10, MergeScenario::NoSourceUser)]);
    assert_eq!(
        dir.effects(),
        vec![MergeEffect::ResolveRequest {
            request_id: 10,
            source_user_id: None,
            destination_user_id: Some(42),
        }]
    );
}

#[tokio::test]
async fn scenario_b_source_history_wins() {
    let dest = record(1, "dst", Some(200));
    let src = record(2, "src", Some(100));
    let dir = Directory::with(vec![dest.clone(), src], &[100]);

    let out = reconcile_chain(&dir, dest, vec![request(11, "src", "dst", 0)])
        .await
        .unwrap();

    assert!(out.success);
    assert_eq!(out.contact.user_id, Some(100));
    assert_eq!(dir.contact("dst").unwrap().user_id, Some(100));
    assert!(dir.contact("src").is_none(), "source row must be deleted");
    assert!(dir
        .effects()
        .contains(&MergeEffect::SuspendUser { user_id: 200 }));
    assert_eq!(
        out.applied,
        vec![(
            11,
            MergeScenario::PreferSourceHistory {
                source_user: 100,
                destination_user: 200
            }
        )]
    );
}

#[tokio::test]
async fn scenario_c_both_enrolled_stops_the_chain() {
    let dest = record(1, "dst", Some(200));
    let src = record(2, "src", Some(100));
    let later = record(3, "src2", None);
    let dir = Directory::with(vec![dest.clone(), src, later], &[100, 200]);

    let out = reconcile_chain(
        &dir,
        dest.clone(),
        vec![request(13, "src2", "dst", 5), request(12, "src", "dst", 0)],
    )
    .await
    .unwrap();

    assert!(!out.success);
    assert_eq!(out.contact, dest);
    let failed = out.failed_request.unwrap();
    assert_eq!(failed.source_id, 12);
    assert!(failed.merge_failed);
    assert!(failed.active, "active stays set on failure");
    assert_eq!(failed.source_user_id, Some(100));
    assert_eq!(failed.destination_user_id, Some(200));

    assert_eq!(
        dir.effects(),
        vec![MergeEffect::FailRequest {
            request_id: 12,
            source_user_id: Some(100),
            destination_user_id: Some(200),
        }]
    );
    assert!(dir.contact("src2").is_some(), "request 13 must not run");
}

#[tokio::test]
async fn chain_applies_in_creation_order() {
    // first adopt src's user, then src2 (no user) is folded in
    let dest = record(1, "dst", None);
    let src = record(2, "src", Some(100));
    let src2 = record(3, "src2", None);
    let dir = Directory::with(vec![dest.clone(), src, src2], &[]);

    let out = reconcile_chain(
        &dir,
        dest,
        vec![request(21, "src2", "dst", 10), request(20, "src", "dst", 0)],
    )
    .await
    .unwrap();

    assert!(out.success);
    assert_eq!(
        out.applied,
        vec![
            (20, MergeScenario::AdoptSourceUser { source_user: 100 }),
            (21, MergeScenario::NoSourceUser)
        ]
    );
    assert_eq!(out.contact.user_id, Some(100));
    assert!(dir.contact("src").is_none());
    assert!(dir.contact("src2").is_none());
}

#[tokio::test]
async fn foreign_destination_is_a_contract_violation() {
    let dest = record(1, "dst", Some(1));
    let dir = Directory::with(vec![dest.clone()], &[]);

    let err = reconcile_chain(&dir, dest, vec![request(30, "src", "other", 0)])
        .await
        .unwrap_err();
    assert!(matches!(err, MergeError::Contract(_)));
    assert!(dir.effects().is_empty());
}
