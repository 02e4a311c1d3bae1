//! Postgres-backed `UserDirectory` and `EnrolmentService`.
//!
//! Hosts with their own account model inject their own adapters; these keep
//! a standalone deployment self-contained.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;
use tsync_engine::{EnrolmentService, UserDirectory};
use tsync_schemas::Contact;

#[derive(Clone)]
pub struct PgUsers {
    pool: PgPool,
}

impl PgUsers {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUsers {
    async fn find_users_by_email(&self, email: &str) -> Result<Vec<i64>> {
        sqlx::query_scalar(
            "select id from local_users where lower(email) = lower($1) and not suspended order by id",
        )
        .bind(email)
        .fetch_all(&self.pool)
        .await
        .context("find_users_by_email failed")
    }

    async fn create_user(&self, contact: &Contact) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            insert into local_users (email, first_name, last_name)
            values ($1, $2, $3)
            returning id
            "#,
        )
        .bind(&contact.email)
        .bind(&contact.first_name)
        .bind(&contact.last_name)
        .fetch_one(&self.pool)
        .await
        .context("create_user failed")?;
        info!(user_id = id, contact = %contact.source_guid, "local user created");
        Ok(id)
    }

    async fn suspend_user(&self, user_id: i64) -> Result<()> {
        sqlx::query("update local_users set suspended = true where id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("suspend_user failed")?;
        Ok(())
    }

    async fn has_enrolments(&self, user_id: i64) -> Result<bool> {
        sqlx::query_scalar("select exists (select 1 from enrolments where user_id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("has_enrolments failed")
    }
}

#[derive(Clone)]
pub struct PgEnrolments {
    pool: PgPool,
}

impl PgEnrolments {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn set_status(&self, instance_id: i64, user_id: i64, status: &str) -> Result<()> {
        sqlx::query(
            r#"
            insert into enrolments (instance_id, user_id, status, updated_at_utc)
            values ($1, $2, $3, now())
            on conflict (instance_id, user_id) do update set
              status = excluded.status,
              updated_at_utc = now()
            "#,
        )
        .bind(instance_id)
        .bind(user_id)
        .bind(status)
        .execute(&self.pool)
        .await
        .with_context(|| format!("enrolment {status} failed for user {user_id}"))?;
        Ok(())
    }
}

#[async_trait]
impl EnrolmentService for PgEnrolments {
    async fn enrol(&self, instance_id: i64, user_id: i64) -> Result<()> {
        self.set_status(instance_id, user_id, "active").await
    }

    async fn unenrol(&self, instance_id: i64, user_id: i64) -> Result<()> {
        sqlx::query("delete from enrolments where instance_id = $1 and user_id = $2")
            .bind(instance_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .context("unenrol failed")?;
        Ok(())
    }

    async fn expire(&self, instance_id: i64, user_id: i64) -> Result<()> {
        self.set_status(instance_id, user_id, "expired").await
    }
}
