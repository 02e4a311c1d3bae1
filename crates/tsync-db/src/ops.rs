//! API status, request log and the notification queue.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tsync_schemas::{ApiStatus, Notification, NotificationKind, RequestLogEntry};

use crate::{from_db_count, to_db_count};

pub(crate) async fn load_api_status(pool: &PgPool, platform: &str) -> Result<ApiStatus> {
    let row = sqlx::query(
        r#"
        select last_status, error_count, last_error, last_error_at, next_callable_at,
               credential_alert_sent
        from api_status
        where platform = $1
        "#,
    )
    .bind(platform)
    .fetch_optional(pool)
    .await
    .context("load_api_status failed")?;

    let Some(row) = row else {
        return Ok(ApiStatus::default());
    };
    Ok(ApiStatus {
        last_status: u16::try_from(row.try_get::<i32, _>("last_status")?).unwrap_or(0),
        error_count: from_db_count(row.try_get("error_count")?),
        last_error: row.try_get("last_error")?,
        last_error_at: row.try_get("last_error_at")?,
        next_callable_at: row.try_get("next_callable_at")?,
        credential_alert_sent: row.try_get("credential_alert_sent")?,
    })
}

pub(crate) async fn save_api_status(
    pool: &PgPool,
    platform: &str,
    status: &ApiStatus,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into api_status (
          platform, last_status, error_count, last_error, last_error_at, next_callable_at,
          credential_alert_sent
        ) values (
          $1, $2, $3, $4, $5, $6, $7
        )
        on conflict (platform) do update set
          last_status = excluded.last_status,
          error_count = excluded.error_count,
          last_error = excluded.last_error,
          last_error_at = excluded.last_error_at,
          next_callable_at = excluded.next_callable_at,
          credential_alert_sent = excluded.credential_alert_sent
        "#,
    )
    .bind(platform)
    .bind(i32::from(status.last_status))
    .bind(to_db_count(status.error_count))
    .bind(&status.last_error)
    .bind(status.last_error_at)
    .bind(status.next_callable_at)
    .bind(status.credential_alert_sent)
    .execute(pool)
    .await
    .context("save_api_status failed")?;
    Ok(())
}

pub(crate) async fn append_request_log(pool: &PgPool, entry: &RequestLogEntry) -> Result<()> {
    sqlx::query(
        r#"
        insert into request_log (at_utc, platform, method, uri, status, error)
        values ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(entry.at)
    .bind(&entry.platform)
    .bind(&entry.method)
    .bind(&entry.uri)
    .bind(entry.status.map(i32::from))
    .bind(&entry.error)
    .execute(pool)
    .await
    .context("append_request_log failed")?;
    Ok(())
}

pub(crate) async fn purge_request_log(pool: &PgPool, before: DateTime<Utc>) -> Result<u64> {
    let res = sqlx::query("delete from request_log where at_utc < $1")
        .bind(before)
        .execute(pool)
        .await
        .context("purge_request_log failed")?;
    Ok(res.rows_affected())
}

pub(crate) async fn enqueue_notification(pool: &PgPool, n: &Notification) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        insert into notifications (kind, subject, message, created_at_utc)
        values ($1, $2, $3, $4)
        returning id
        "#,
    )
    .bind(n.kind.as_str())
    .bind(&n.subject)
    .bind(&n.message)
    .bind(n.created_at)
    .fetch_one(pool)
    .await
    .context("enqueue_notification failed")?;
    Ok(id)
}

pub(crate) async fn pending_notifications(pool: &PgPool, limit: u32) -> Result<Vec<Notification>> {
    let rows = sqlx::query(
        r#"
        select id, kind, subject, message, created_at_utc
        from notifications
        order by id asc
        limit $1
        "#,
    )
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await
    .context("pending_notifications failed")?;

    rows.iter()
        .map(|row| {
            let kind: String = row.try_get("kind")?;
            Ok(Notification {
                id: Some(row.try_get("id")?),
                kind: NotificationKind::parse(&kind)
                    .ok_or_else(|| anyhow!("unknown notification kind: {kind}"))?,
                subject: row.try_get("subject")?,
                message: row.try_get("message")?,
                created_at: row.try_get("created_at_utc")?,
            })
        })
        .collect()
}

pub(crate) async fn delete_notification(pool: &PgPool, id: i64) -> Result<()> {
    sqlx::query("delete from notifications where id = $1")
        .bind(id)
        .execute(pool)
        .await
        .context("delete_notification failed")?;
    Ok(())
}
