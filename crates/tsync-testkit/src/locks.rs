use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tsync_engine::{LockLease, LockService};
use uuid::Uuid;

/// Named leases in memory. Acquire never waits: a held name returns `None`
/// straight away.
#[derive(Default)]
pub struct MemoryLocks {
    held: Mutex<HashMap<String, String>>,
    fail_release: AtomicBool,
}

impl MemoryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Simulate another process holding `name`.
    pub fn hold(&self, name: &str) {
        self.held()
            .insert(name.to_string(), "elsewhere".to_string());
    }

    pub fn free(&self, name: &str) {
        self.held().remove(name);
    }

    pub fn is_held(&self, name: &str) -> bool {
        self.held().contains_key(name)
    }

    /// Make the next release fail (after freeing the lease).
    pub fn fail_next_release(&self) {
        self.fail_release.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl LockService for MemoryLocks {
    async fn acquire(&self, name: &str, _timeout: Duration) -> Result<Option<LockLease>> {
        let mut held = self.held();
        if held.contains_key(name) {
            return Ok(None);
        }
        let token = Uuid::new_v4().to_string();
        held.insert(name.to_string(), token.clone());
        Ok(Some(LockLease {
            name: name.to_string(),
            token,
        }))
    }

    async fn release(&self, lease: LockLease) -> Result<()> {
        let mut held = self.held();
        match held.get(&lease.name) {
            Some(token) if *token == lease.token => {
                held.remove(&lease.name);
            }
            _ => bail!("lease '{}' is not held by this token", lease.name),
        }
        if self.fail_release.swap(false, Ordering::SeqCst) {
            bail!("lock service unreachable");
        }
        Ok(())
    }
}
