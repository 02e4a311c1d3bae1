use anyhow::{anyhow, Context, Result};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tsync_engine::UpsertOutcome;
use tsync_schemas::{OutcomeFields, Registration, RegistrationRecord, RegistrationStatus};

use crate::upsert_outcome;

const COLUMNS: &str = r#"
    r.id, r.instance_id, r.platform, r.source_guid, r.source_id, r.contact_guid, r.event_guid,
    r.online_activity_guid, r.status, r.upstream_outcome, r.source_modified, r.user_id,
    r.pending_outcome, r.update_source, r.expired, r.enrolled_user_id
"#;

fn from_row(row: &PgRow) -> Result<RegistrationRecord> {
    let Json(upstream_outcome): Json<OutcomeFields> = row.try_get("upstream_outcome")?;
    let Json(pending_outcome): Json<OutcomeFields> = row.try_get("pending_outcome")?;
    Ok(RegistrationRecord {
        id: row.try_get("id")?,
        instance_id: row.try_get("instance_id")?,
        user_id: row.try_get("user_id")?,
        registration: Registration {
            platform: row.try_get("platform")?,
            source_id: row.try_get("source_id")?,
            source_guid: row.try_get("source_guid")?,
            contact_guid: row.try_get("contact_guid")?,
            event_guid: row.try_get("event_guid")?,
            online_activity_guid: row.try_get("online_activity_guid")?,
            status: RegistrationStatus::parse(&row.try_get::<String, _>("status")?),
            upstream_outcome,
            source_modified: row.try_get("source_modified")?,
        },
        pending_outcome,
        update_source: row.try_get("update_source")?,
        expired: row.try_get("expired")?,
        enrolled_user_id: row.try_get("enrolled_user_id")?,
    })
}

/// A `None` user keeps the stored binding; pending outcome, push flag,
/// expiry and the enrolled user are never touched here.
pub(crate) async fn upsert_registration(
    pool: &PgPool,
    instance_id: i64,
    reg: &Registration,
    user_id: Option<i64>,
) -> Result<(RegistrationRecord, UpsertOutcome)> {
    let inserted: Option<bool> = sqlx::query_scalar(
        r#"
        insert into registrations (
          instance_id, platform, source_guid, source_id, contact_guid, event_guid,
          online_activity_guid, status, upstream_outcome, source_modified, user_id
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11
        )
        on conflict (platform, source_guid) do update set
          instance_id = excluded.instance_id,
          source_id = excluded.source_id,
          contact_guid = excluded.contact_guid,
          event_guid = excluded.event_guid,
          online_activity_guid = excluded.online_activity_guid,
          status = excluded.status,
          upstream_outcome = excluded.upstream_outcome,
          source_modified = excluded.source_modified,
          user_id = coalesce(excluded.user_id, registrations.user_id)
        where (registrations.instance_id, registrations.source_id, registrations.contact_guid,
               registrations.event_guid, registrations.online_activity_guid,
               registrations.status, registrations.upstream_outcome,
               registrations.source_modified, registrations.user_id)
          is distinct from
              (excluded.instance_id, excluded.source_id, excluded.contact_guid,
               excluded.event_guid, excluded.online_activity_guid, excluded.status,
               excluded.upstream_outcome, excluded.source_modified,
               coalesce(excluded.user_id, registrations.user_id))
        returning (xmax = 0)
        "#,
    )
    .bind(instance_id)
    .bind(&reg.platform)
    .bind(&reg.source_guid)
    .bind(reg.source_id)
    .bind(&reg.contact_guid)
    .bind(&reg.event_guid)
    .bind(&reg.online_activity_guid)
    .bind(reg.status.as_str())
    .bind(Json(&reg.upstream_outcome))
    .bind(reg.source_modified)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("upsert_registration failed for {}", reg.source_guid))?;

    let record = find_registration(pool, &reg.platform, &reg.source_guid)
        .await?
        .ok_or_else(|| anyhow!("registration {} vanished after upsert", reg.source_guid))?;
    Ok((record, upsert_outcome(inserted)))
}

pub(crate) async fn find_registration(
    pool: &PgPool,
    platform: &str,
    guid: &str,
) -> Result<Option<RegistrationRecord>> {
    let row = sqlx::query(&format!(
        "select {COLUMNS} from registrations r where r.platform = $1 and r.source_guid = $2"
    ))
    .bind(platform)
    .bind(guid)
    .fetch_optional(pool)
    .await
    .context("find_registration failed")?;
    row.as_ref().map(from_row).transpose()
}

pub(crate) async fn delete_registration(pool: &PgPool, id: i64) -> Result<()> {
    sqlx::query("delete from registrations where id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("delete_registration failed")?;
    Ok(())
}

pub(crate) async fn orphan_registrations(pool: &PgPool, platform: &str) -> Result<Vec<RegistrationRecord>> {
    let rows = sqlx::query(&format!(
        r#"
        select {COLUMNS}
        from registrations r
        where r.platform = $1
          and not exists (select 1 from enrolment_instances i where i.id = r.instance_id)
        order by r.id
        "#
    ))
    .bind(platform)
    .fetch_all(pool)
    .await
    .context("orphan_registrations failed")?;
    rows.iter().map(from_row).collect()
}

pub(crate) async fn registrations_for_instance(
    pool: &PgPool,
    instance_id: i64,
) -> Result<Vec<RegistrationRecord>> {
    let rows = sqlx::query(&format!(
        "select {COLUMNS} from registrations r where r.instance_id = $1 order by r.id"
    ))
    .bind(instance_id)
    .fetch_all(pool)
    .await
    .context("registrations_for_instance failed")?;
    rows.iter().map(from_row).collect()
}

pub(crate) async fn registrations_pending_push(
    pool: &PgPool,
    instance_id: i64,
) -> Result<Vec<RegistrationRecord>> {
    let rows = sqlx::query(&format!(
        "select {COLUMNS} from registrations r \
         where r.instance_id = $1 and r.update_source order by r.id"
    ))
    .bind(instance_id)
    .fetch_all(pool)
    .await
    .context("registrations_pending_push failed")?;
    rows.iter().map(from_row).collect()
}

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, PgArguments>;

async fn update_one(pool: &PgPool, id: i64, what: &str, q: PgQuery<'_>) -> Result<()> {
    let res = q.execute(pool).await.with_context(|| format!("{what} failed"))?;
    if res.rows_affected() == 0 {
        return Err(anyhow!("registration {id} not found"));
    }
    Ok(())
}

pub(crate) async fn queue_outcome(pool: &PgPool, id: i64, outcome: &OutcomeFields) -> Result<()> {
    let q = sqlx::query(
        "update registrations set pending_outcome = $2, update_source = true where id = $1",
    )
    .bind(id)
    .bind(Json(outcome));
    update_one(pool, id, "queue_outcome", q).await
}

pub(crate) async fn mark_registration_pushed(
    pool: &PgPool,
    id: i64,
    upstream: &OutcomeFields,
) -> Result<()> {
    let q = sqlx::query(
        "update registrations set upstream_outcome = $2, update_source = false where id = $1",
    )
    .bind(id)
    .bind(Json(upstream));
    update_one(pool, id, "mark_registration_pushed", q).await
}

pub(crate) async fn mark_registration_expired(pool: &PgPool, id: i64) -> Result<()> {
    let q = sqlx::query("update registrations set expired = true where id = $1").bind(id);
    update_one(pool, id, "mark_registration_expired", q).await
}

pub(crate) async fn mark_registration_enrolled(
    pool: &PgPool,
    id: i64,
    user_id: Option<i64>,
) -> Result<()> {
    let q = sqlx::query("update registrations set enrolled_user_id = $2 where id = $1")
        .bind(id)
        .bind(user_id);
    update_one(pool, id, "mark_registration_enrolled", q).await
}
