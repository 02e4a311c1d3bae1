//! tsync-testkit
//!
//! In-memory doubles for every engine collaborator and a [`Harness`] that
//! wires them into a [`SyncEngine`]. The scenario suite under `tests/` runs
//! entirely in process: no database, no network.

mod collaborators;
pub mod fixtures;
mod locks;
mod store;
mod upstream;

use std::sync::Arc;
use tsync_config::SyncSettings;
use tsync_engine::{Collaborators, SyncContext, SyncEngine};

pub use collaborators::{FakeEnrolments, FakeUsers, ManualClock, RecordingNotifier};
pub use locks::MemoryLocks;
pub use store::MemoryStore;
pub use upstream::FakeUpstream;

/// Settings for the fixture platform, with a small page size so paging is
/// exercised.
pub fn test_settings() -> SyncSettings {
    let mut s = SyncSettings::for_platform(fixtures::PLATFORM, fixtures::HOST);
    s.fetch.page_size = 3;
    s
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub locks: Arc<MemoryLocks>,
    pub upstream: Arc<FakeUpstream>,
    pub enrolments: Arc<FakeEnrolments>,
    pub users: Arc<FakeUsers>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
    pub engine: SyncEngine,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: SyncSettings) -> Self {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(MemoryLocks::new());
        let upstream = Arc::new(FakeUpstream::new());
        let enrolments = Arc::new(FakeEnrolments::default());
        let users = Arc::new(FakeUsers::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::new(fixtures::at(86_400)));

        let engine = SyncEngine::new(
            SyncContext::new(settings, upstream.clone()),
            Collaborators {
                store: store.clone(),
                locks: locks.clone(),
                enrolments: enrolments.clone(),
                users: users.clone(),
                notifier: notifier.clone(),
                clock: clock.clone(),
            },
        );

        Self {
            store,
            locks,
            upstream,
            enrolments,
            users,
            notifier,
            clock,
            engine,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
