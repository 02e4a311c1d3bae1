use anyhow::{anyhow, Context, Result};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tsync_schemas::{Cursor, ResourceKind, Scope, Watermark};

use crate::{from_db_count, to_db_count};

const COLUMNS: &str = r#"
    platform, kind, scope, last_modified, last_id, next_attempt_not_before,
    attempt_window_end, error_count, last_error, disabled
"#;

fn from_row(row: &PgRow) -> Result<Watermark> {
    let kind: String = row.try_get("kind")?;
    Ok(Watermark {
        kind: ResourceKind::parse(&kind).ok_or_else(|| anyhow!("unknown watermark kind: {kind}"))?,
        scope: Scope::from_i64(row.try_get("scope")?),
        platform: row.try_get("platform")?,
        cursor: Cursor::new(row.try_get("last_modified")?, row.try_get("last_id")?),
        next_attempt_not_before: row.try_get("next_attempt_not_before")?,
        attempt_window_end: row.try_get("attempt_window_end")?,
        error_count: from_db_count(row.try_get("error_count")?),
        last_error: row.try_get("last_error")?,
        disabled: row.try_get("disabled")?,
    })
}

pub(crate) async fn load(
    pool: &PgPool,
    platform: &str,
    kind: ResourceKind,
    scope: Scope,
) -> Result<Option<Watermark>> {
    let row = sqlx::query(&format!(
        "select {COLUMNS} from sync_watermarks where platform = $1 and kind = $2 and scope = $3"
    ))
    .bind(platform)
    .bind(kind.as_str())
    .bind(scope.as_i64())
    .fetch_optional(pool)
    .await
    .context("load_watermark failed")?;

    row.as_ref().map(from_row).transpose()
}

pub(crate) async fn save(pool: &PgPool, wm: &Watermark) -> Result<()> {
    sqlx::query(
        r#"
        insert into sync_watermarks (
          platform, kind, scope, last_modified, last_id, next_attempt_not_before,
          attempt_window_end, error_count, last_error, disabled, updated_at_utc
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now()
        )
        on conflict (platform, kind, scope) do update set
          last_modified = excluded.last_modified,
          last_id = excluded.last_id,
          next_attempt_not_before = excluded.next_attempt_not_before,
          attempt_window_end = excluded.attempt_window_end,
          error_count = excluded.error_count,
          last_error = excluded.last_error,
          disabled = excluded.disabled,
          updated_at_utc = now()
        "#,
    )
    .bind(&wm.platform)
    .bind(wm.kind.as_str())
    .bind(wm.scope.as_i64())
    .bind(wm.cursor.last_modified)
    .bind(wm.cursor.last_id)
    .bind(wm.next_attempt_not_before)
    .bind(wm.attempt_window_end)
    .bind(to_db_count(wm.error_count))
    .bind(&wm.last_error)
    .bind(wm.disabled)
    .execute(pool)
    .await
    .with_context(|| format!("save_watermark failed for {} {}", wm.kind, wm.scope))?;
    Ok(())
}

pub(crate) async fn list(pool: &PgPool, platform: &str) -> Result<Vec<Watermark>> {
    let rows = sqlx::query(&format!(
        "select {COLUMNS} from sync_watermarks where platform = $1 order by kind, scope"
    ))
    .bind(platform)
    .fetch_all(pool)
    .await
    .context("list_watermarks failed")?;

    rows.iter().map(from_row).collect()
}
