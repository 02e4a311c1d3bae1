//! Named leases in `sync_locks`.
//!
//! A lease is a row with a random token and an expiry. Acquire inserts the
//! row, or takes it over once the previous holder's lease has expired, so a
//! crashed worker never blocks a job for longer than the lease TTL. Release
//! deletes the row only if the token still matches.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;
use tsync_engine::{LockLease, LockService};
use uuid::Uuid;

const POLL: Duration = Duration::from_millis(250);

#[derive(Clone)]
pub struct PgLocks {
    pool: PgPool,
    lease_ttl: Duration,
}

impl PgLocks {
    pub fn new(pool: PgPool, lease_ttl: Duration) -> Self {
        Self { pool, lease_ttl }
    }

    async fn try_acquire(&self, name: &str) -> Result<Option<LockLease>> {
        let token = Uuid::new_v4();
        let won: Option<Uuid> = sqlx::query_scalar(
            r#"
            insert into sync_locks (name, token, expires_at_utc)
            values ($1, $2, now() + make_interval(secs => $3))
            on conflict (name) do update set
              token = excluded.token,
              expires_at_utc = excluded.expires_at_utc
            where sync_locks.expires_at_utc < now()
            returning token
            "#,
        )
        .bind(name)
        .bind(token)
        .bind(self.lease_ttl.as_secs_f64())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("lock acquire failed for {name}"))?;

        Ok(won.map(|t| LockLease {
            name: name.to_string(),
            token: t.to_string(),
        }))
    }
}

#[async_trait]
impl LockService for PgLocks {
    async fn acquire(&self, name: &str, timeout: Duration) -> Result<Option<LockLease>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(lease) = self.try_acquire(name).await? {
                debug!(lock = name, "lease acquired");
                return Ok(Some(lease));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            sleep(POLL.min(deadline - now)).await;
        }
    }

    async fn release(&self, lease: LockLease) -> Result<()> {
        let token = Uuid::parse_str(&lease.token)
            .with_context(|| format!("lease token for {} is not a uuid", lease.name))?;
        let res = sqlx::query("delete from sync_locks where name = $1 and token = $2")
            .bind(&lease.name)
            .bind(token)
            .execute(&self.pool)
            .await
            .with_context(|| format!("lock release failed for {}", lease.name))?;
        if res.rows_affected() == 0 {
            return Err(anyhow!(
                "lock {} was no longer held by this lease (expired and taken over?)",
                lease.name
            ));
        }
        debug!(lock = %lease.name, "lease released");
        Ok(())
    }
}
