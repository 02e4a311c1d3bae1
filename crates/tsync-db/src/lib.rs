//! tsync-db
//!
//! Postgres persistence for the sync engine: embedded migrations, the
//! [`PgStore`] implementation of `SyncStore`, the lease-table lock service
//! and Postgres-backed user/enrolment adapters for deployments without a host
//! application.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tsync_engine::UpsertOutcome;
use tsync_schemas::{EnrolmentInstance, InstanceSource};

mod accounts;
mod catalog;
mod contacts;
mod locks;
mod ops;
mod registrations;
mod store;
mod watermarks;

pub use accounts::{PgEnrolments, PgUsers};
pub use locks::PgLocks;
pub use store::PgStore;

pub const ENV_DB_URL: &str = "TSYNC_DATABASE_URL";

/// Connect to Postgres using TSYNC_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("{ENV_DB_URL} is not set"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("postgres connection failed")
}

/// Applies the migrations embedded from `./migrations`.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("applying tsync migrations failed")
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_watermarks_table: bool,
}

/// One round trip that proves connectivity and reports whether the
/// migrations have created the watermark table.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let has_watermarks_table: bool =
        sqlx::query_scalar("select to_regclass('public.sync_watermarks') is not null")
            .fetch_one(pool)
            .await
            .context("db status query failed")?;

    Ok(DbStatus {
        ok: true,
        has_watermarks_table,
    })
}

/// Register a local enrolment instance bound to an upstream event or online
/// activity. Normally done by the host application.
pub async fn insert_instance(
    pool: &PgPool,
    platform: &str,
    source: &InstanceSource,
    end_at: Option<DateTime<Utc>>,
) -> Result<EnrolmentInstance> {
    let (id,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        insert into enrolment_instances (platform, source_type, source_guid, end_at, enabled)
        values ($1, $2, $3, $4, true)
        returning id
        "#,
    )
    .bind(platform)
    .bind(source.type_str())
    .bind(source.guid())
    .bind(end_at)
    .fetch_one(pool)
    .await
    .context("insert_instance failed")?;

    Ok(EnrolmentInstance {
        id,
        platform: platform.to_string(),
        source: source.clone(),
        end_at,
        enabled: true,
    })
}

pub async fn delete_instance(pool: &PgPool, id: i64) -> Result<()> {
    sqlx::query("delete from enrolment_instances where id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("delete_instance failed")?;
    Ok(())
}

/// Upserts guarded by `where (...) is distinct from (...)` return no row when
/// nothing changed; `xmax = 0` tells a fresh insert from an update.
pub(crate) fn upsert_outcome(inserted: Option<bool>) -> UpsertOutcome {
    match inserted {
        None => UpsertOutcome::Unchanged,
        Some(true) => UpsertOutcome::Inserted,
        Some(false) => UpsertOutcome::Updated,
    }
}

/// Counters are stored as `integer`.
pub(crate) fn to_db_count(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

pub(crate) fn from_db_count(n: i32) -> u32 {
    u32::try_from(n).unwrap_or(0)
}
