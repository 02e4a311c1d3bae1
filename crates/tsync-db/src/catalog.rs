//! Event templates, events, online activities and the enrolment instances
//! bound to them.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tsync_engine::UpsertOutcome;
use tsync_schemas::{
    EnrolmentInstance, Event, EventStatus, EventTemplate, InstanceSource, OnlineActivity,
};

use crate::upsert_outcome;

pub(crate) async fn upsert_event_template(pool: &PgPool, t: &EventTemplate) -> Result<UpsertOutcome> {
    let inserted: Option<bool> = sqlx::query_scalar(
        r#"
        insert into event_templates (platform, source_guid, source_id, code, name, status, source_modified)
        values ($1, $2, $3, $4, $5, $6, $7)
        on conflict (platform, source_guid) do update set
          source_id = excluded.source_id,
          code = excluded.code,
          name = excluded.name,
          status = excluded.status,
          source_modified = excluded.source_modified
        where (event_templates.source_id, event_templates.code, event_templates.name,
               event_templates.status, event_templates.source_modified)
          is distinct from
              (excluded.source_id, excluded.code, excluded.name,
               excluded.status, excluded.source_modified)
        returning (xmax = 0)
        "#,
    )
    .bind(&t.platform)
    .bind(&t.source_guid)
    .bind(t.source_id)
    .bind(&t.code)
    .bind(&t.name)
    .bind(t.status.as_str())
    .bind(t.source_modified)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("upsert_event_template failed for {}", t.source_guid))?;
    Ok(upsert_outcome(inserted))
}

pub(crate) async fn upsert_event(pool: &PgPool, e: &Event) -> Result<UpsertOutcome> {
    let inserted: Option<bool> = sqlx::query_scalar(
        r#"
        insert into events (
          platform, source_guid, source_id, template_guid, code, start_at, finish_at, status,
          source_modified
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9
        )
        on conflict (platform, source_guid) do update set
          source_id = excluded.source_id,
          template_guid = excluded.template_guid,
          code = excluded.code,
          start_at = excluded.start_at,
          finish_at = excluded.finish_at,
          status = excluded.status,
          source_modified = excluded.source_modified
        where (events.source_id, events.template_guid, events.code, events.start_at,
               events.finish_at, events.status, events.source_modified)
          is distinct from
              (excluded.source_id, excluded.template_guid, excluded.code, excluded.start_at,
               excluded.finish_at, excluded.status, excluded.source_modified)
        returning (xmax = 0)
        "#,
    )
    .bind(&e.platform)
    .bind(&e.source_guid)
    .bind(e.source_id)
    .bind(&e.template_guid)
    .bind(&e.code)
    .bind(e.start_at)
    .bind(e.finish_at)
    .bind(e.status.as_str())
    .bind(e.source_modified)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("upsert_event failed for {}", e.source_guid))?;
    Ok(upsert_outcome(inserted))
}

pub(crate) async fn upsert_online_activity(
    pool: &PgPool,
    a: &OnlineActivity,
) -> Result<UpsertOutcome> {
    let inserted: Option<bool> = sqlx::query_scalar(
        r#"
        insert into online_activities (
          platform, source_guid, source_id, template_guid, code, name, status, source_modified
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8
        )
        on conflict (platform, source_guid) do update set
          source_id = excluded.source_id,
          template_guid = excluded.template_guid,
          code = excluded.code,
          name = excluded.name,
          status = excluded.status,
          source_modified = excluded.source_modified
        where (online_activities.source_id, online_activities.template_guid,
               online_activities.code, online_activities.name, online_activities.status,
               online_activities.source_modified)
          is distinct from
              (excluded.source_id, excluded.template_guid, excluded.code, excluded.name,
               excluded.status, excluded.source_modified)
        returning (xmax = 0)
        "#,
    )
    .bind(&a.platform)
    .bind(&a.source_guid)
    .bind(a.source_id)
    .bind(&a.template_guid)
    .bind(&a.code)
    .bind(&a.name)
    .bind(a.status.as_str())
    .bind(a.source_modified)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("upsert_online_activity failed for {}", a.source_guid))?;
    Ok(upsert_outcome(inserted))
}

pub(crate) async fn find_event(pool: &PgPool, platform: &str, guid: &str) -> Result<Option<Event>> {
    let row = sqlx::query(
        r#"
        select platform, source_guid, source_id, template_guid, code, start_at, finish_at,
               status, source_modified
        from events
        where platform = $1 and source_guid = $2
        "#,
    )
    .bind(platform)
    .bind(guid)
    .fetch_optional(pool)
    .await
    .context("find_event failed")?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(Event {
        platform: row.try_get("platform")?,
        source_id: row.try_get("source_id")?,
        source_guid: row.try_get("source_guid")?,
        template_guid: row.try_get("template_guid")?,
        code: row.try_get("code")?,
        start_at: row.try_get("start_at")?,
        finish_at: row.try_get("finish_at")?,
        status: EventStatus::parse(&row.try_get::<String, _>("status")?),
        source_modified: row.try_get("source_modified")?,
    }))
}

pub(crate) async fn find_online_activity(
    pool: &PgPool,
    platform: &str,
    guid: &str,
) -> Result<Option<OnlineActivity>> {
    let row = sqlx::query(
        r#"
        select platform, source_guid, source_id, template_guid, code, name, status, source_modified
        from online_activities
        where platform = $1 and source_guid = $2
        "#,
    )
    .bind(platform)
    .bind(guid)
    .fetch_optional(pool)
    .await
    .context("find_online_activity failed")?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some(OnlineActivity {
        platform: row.try_get("platform")?,
        source_id: row.try_get("source_id")?,
        source_guid: row.try_get("source_guid")?,
        template_guid: row.try_get("template_guid")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        status: EventStatus::parse(&row.try_get::<String, _>("status")?),
        source_modified: row.try_get("source_modified")?,
    }))
}

// ---------------------------------------------------------------------------
// Enrolment instances
// ---------------------------------------------------------------------------

const INSTANCE_COLUMNS: &str = "id, platform, source_type, source_guid, end_at, enabled";

fn instance_from_row(row: &PgRow) -> Result<EnrolmentInstance> {
    let source_type: String = row.try_get("source_type")?;
    let guid: String = row.try_get("source_guid")?;
    let source = match source_type.as_str() {
        "event" => InstanceSource::Event { guid },
        "online_activity" => InstanceSource::OnlineActivity { guid },
        other => return Err(anyhow!("unknown instance source type: {other}")),
    };
    Ok(EnrolmentInstance {
        id: row.try_get("id")?,
        platform: row.try_get("platform")?,
        source,
        end_at: row.try_get("end_at")?,
        enabled: row.try_get("enabled")?,
    })
}

pub(crate) async fn list_instances(pool: &PgPool, platform: &str) -> Result<Vec<EnrolmentInstance>> {
    let rows = sqlx::query(&format!(
        "select {INSTANCE_COLUMNS} from enrolment_instances where platform = $1 order by id"
    ))
    .bind(platform)
    .fetch_all(pool)
    .await
    .context("list_instances failed")?;
    rows.iter().map(instance_from_row).collect()
}

pub(crate) async fn find_instance(pool: &PgPool, id: i64) -> Result<Option<EnrolmentInstance>> {
    let row = sqlx::query(&format!(
        "select {INSTANCE_COLUMNS} from enrolment_instances where id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("find_instance failed")?;
    row.as_ref().map(instance_from_row).transpose()
}

pub(crate) async fn instances_for_source(
    pool: &PgPool,
    platform: &str,
    source_guid: &str,
) -> Result<Vec<EnrolmentInstance>> {
    let rows = sqlx::query(&format!(
        "select {INSTANCE_COLUMNS} from enrolment_instances \
         where platform = $1 and source_guid = $2 order by id"
    ))
    .bind(platform)
    .bind(source_guid)
    .fetch_all(pool)
    .await
    .context("instances_for_source failed")?;
    rows.iter().map(instance_from_row).collect()
}

pub(crate) async fn update_instance(
    pool: &PgPool,
    id: i64,
    end_at: Option<DateTime<Utc>>,
    enabled: bool,
) -> Result<()> {
    let res = sqlx::query("update enrolment_instances set end_at = $2, enabled = $3 where id = $1")
        .bind(id)
        .bind(end_at)
        .bind(enabled)
        .execute(pool)
        .await
        .context("update_instance failed")?;
    if res.rows_affected() == 0 {
        return Err(anyhow!("enrolment instance {id} not found"));
    }
    Ok(())
}
