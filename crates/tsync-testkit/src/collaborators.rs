use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tsync_engine::{Clock, EnrolmentService, Notifier, UserDirectory};
use tsync_schemas::{Contact, Notification};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *lock(&self.now) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<Notification>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn delivered(&self) -> Vec<Notification> {
        lock(&self.delivered).clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("mail relay refused the message");
        }
        lock(&self.delivered).push(notification.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Enrolments
// ---------------------------------------------------------------------------

/// Enrolment calls as `(verb, instance, user)`, plus the resulting set.
#[derive(Default)]
pub struct FakeEnrolments {
    calls: Mutex<Vec<(&'static str, i64, i64)>>,
    enrolled: Mutex<BTreeSet<(i64, i64)>>,
    fail: AtomicBool,
}

impl FakeEnrolments {
    /// While set, every call is recorded and then refused.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    fn attempt(&self, verb: &'static str, instance_id: i64, user_id: i64) -> Result<()> {
        lock(&self.calls).push((verb, instance_id, user_id));
        if self.fail.load(Ordering::SeqCst) {
            bail!("enrolment plugin unavailable");
        }
        Ok(())
    }

    pub fn calls(&self) -> Vec<(&'static str, i64, i64)> {
        lock(&self.calls).clone()
    }

    pub fn is_enrolled(&self, instance_id: i64, user_id: i64) -> bool {
        lock(&self.enrolled).contains(&(instance_id, user_id))
    }
}

#[async_trait]
impl EnrolmentService for FakeEnrolments {
    async fn enrol(&self, instance_id: i64, user_id: i64) -> Result<()> {
        self.attempt("enrol", instance_id, user_id)?;
        lock(&self.enrolled).insert((instance_id, user_id));
        Ok(())
    }

    async fn unenrol(&self, instance_id: i64, user_id: i64) -> Result<()> {
        self.attempt("unenrol", instance_id, user_id)?;
        lock(&self.enrolled).remove(&(instance_id, user_id));
        Ok(())
    }

    async fn expire(&self, instance_id: i64, user_id: i64) -> Result<()> {
        self.attempt("expire", instance_id, user_id)
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Users {
    by_email: HashMap<String, Vec<i64>>,
    with_enrolments: BTreeSet<i64>,
    suspended: BTreeSet<i64>,
    created: Vec<i64>,
    next_id: i64,
}

#[derive(Default)]
pub struct FakeUsers {
    inner: Mutex<Users>,
}

impl FakeUsers {
    pub fn add_user(&self, id: i64, email: &str) {
        let mut u = lock(&self.inner);
        u.by_email.entry(email.to_lowercase()).or_default().push(id);
        u.next_id = u.next_id.max(id);
    }

    pub fn set_enrolled(&self, id: i64) {
        lock(&self.inner).with_enrolments.insert(id);
    }

    pub fn is_suspended(&self, id: i64) -> bool {
        lock(&self.inner).suspended.contains(&id)
    }

    pub fn created(&self) -> Vec<i64> {
        lock(&self.inner).created.clone()
    }
}

#[async_trait]
impl UserDirectory for FakeUsers {
    async fn find_users_by_email(&self, email: &str) -> Result<Vec<i64>> {
        Ok(lock(&self.inner)
            .by_email
            .get(&email.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }

    async fn create_user(&self, contact: &Contact) -> Result<i64> {
        let mut u = lock(&self.inner);
        u.next_id += 1;
        let id = u.next_id;
        if let Some(email) = &contact.email {
            u.by_email.entry(email.to_lowercase()).or_default().push(id);
        }
        u.created.push(id);
        Ok(id)
    }

    async fn suspend_user(&self, user_id: i64) -> Result<()> {
        lock(&self.inner).suspended.insert(user_id);
        Ok(())
    }

    async fn has_enrolments(&self, user_id: i64) -> Result<bool> {
        Ok(lock(&self.inner).with_enrolments.contains(&user_id))
    }
}
