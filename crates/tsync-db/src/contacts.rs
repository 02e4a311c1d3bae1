//! Contacts and contact merge requests.

use anyhow::{anyhow, Context, Result};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tsync_engine::{MergeResolution, UpsertOutcome};
use tsync_schemas::{Contact, ContactMergeRequest, ContactRecord};

use crate::upsert_outcome;

const CONTACT_COLUMNS: &str = r#"
    c.id, c.platform, c.source_guid, c.source_id, c.first_name, c.last_name, c.email, c.code,
    c.source_modified, c.user_id, c.user_association_failed
"#;

fn contact_from_row(row: &PgRow) -> Result<ContactRecord> {
    Ok(ContactRecord {
        id: row.try_get("id")?,
        contact: Contact {
            platform: row.try_get("platform")?,
            source_id: row.try_get("source_id")?,
            source_guid: row.try_get("source_guid")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            code: row.try_get("code")?,
            source_modified: row.try_get("source_modified")?,
        },
        user_id: row.try_get("user_id")?,
        user_association_failed: row.try_get("user_association_failed")?,
    })
}

/// The user binding and association flag of an existing row are never
/// touched by a snapshot refresh.
pub(crate) async fn upsert_contact(
    pool: &PgPool,
    c: &Contact,
) -> Result<(ContactRecord, UpsertOutcome)> {
    let inserted: Option<bool> = sqlx::query_scalar(
        r#"
        insert into contacts (
          platform, source_guid, source_id, first_name, last_name, email, code, source_modified
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8
        )
        on conflict (platform, source_guid) do update set
          source_id = excluded.source_id,
          first_name = excluded.first_name,
          last_name = excluded.last_name,
          email = excluded.email,
          code = excluded.code,
          source_modified = excluded.source_modified
        where (contacts.source_id, contacts.first_name, contacts.last_name, contacts.email,
               contacts.code, contacts.source_modified)
          is distinct from
              (excluded.source_id, excluded.first_name, excluded.last_name, excluded.email,
               excluded.code, excluded.source_modified)
        returning (xmax = 0)
        "#,
    )
    .bind(&c.platform)
    .bind(&c.source_guid)
    .bind(c.source_id)
    .bind(&c.first_name)
    .bind(&c.last_name)
    .bind(&c.email)
    .bind(&c.code)
    .bind(c.source_modified)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("upsert_contact failed for {}", c.source_guid))?;

    let record = find_contact(pool, &c.platform, &c.source_guid)
        .await?
        .ok_or_else(|| anyhow!("contact {} vanished after upsert", c.source_guid))?;
    Ok((record, upsert_outcome(inserted)))
}

pub(crate) async fn find_contact(
    pool: &PgPool,
    platform: &str,
    guid: &str,
) -> Result<Option<ContactRecord>> {
    let row = sqlx::query(&format!(
        "select {CONTACT_COLUMNS} from contacts c where c.platform = $1 and c.source_guid = $2"
    ))
    .bind(platform)
    .bind(guid)
    .fetch_optional(pool)
    .await
    .context("find_contact failed")?;
    row.as_ref().map(contact_from_row).transpose()
}

pub(crate) async fn contacts_for_instance(pool: &PgPool, instance_id: i64) -> Result<Vec<ContactRecord>> {
    let rows = sqlx::query(&format!(
        r#"
        select {CONTACT_COLUMNS}
        from contacts c
        where exists (
            select 1 from registrations r
            where r.instance_id = $1
              and r.platform = c.platform
              and r.contact_guid = c.source_guid
        )
        order by c.platform, c.source_guid
        "#
    ))
    .bind(instance_id)
    .fetch_all(pool)
    .await
    .context("contacts_for_instance failed")?;
    rows.iter().map(contact_from_row).collect()
}

pub(crate) async fn bind_contact_user(
    pool: &PgPool,
    platform: &str,
    guid: &str,
    user_id: Option<i64>,
) -> Result<()> {
    let res = sqlx::query("update contacts set user_id = $3 where platform = $1 and source_guid = $2")
        .bind(platform)
        .bind(guid)
        .bind(user_id)
        .execute(pool)
        .await
        .context("bind_contact_user failed")?;
    if res.rows_affected() == 0 {
        return Err(anyhow!("contact {guid} not found"));
    }
    Ok(())
}

pub(crate) async fn set_contact_association_failed(
    pool: &PgPool,
    platform: &str,
    guid: &str,
    failed: bool,
) -> Result<()> {
    let res = sqlx::query(
        "update contacts set user_association_failed = $3 where platform = $1 and source_guid = $2",
    )
    .bind(platform)
    .bind(guid)
    .bind(failed)
    .execute(pool)
    .await
    .context("set_contact_association_failed failed")?;
    if res.rows_affected() == 0 {
        return Err(anyhow!("contact {guid} not found"));
    }
    Ok(())
}

pub(crate) async fn delete_contact(pool: &PgPool, platform: &str, guid: &str) -> Result<()> {
    sqlx::query("delete from contacts where platform = $1 and source_guid = $2")
        .bind(platform)
        .bind(guid)
        .execute(pool)
        .await
        .context("delete_contact failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Merge requests
// ---------------------------------------------------------------------------

const MERGE_COLUMNS: &str = r#"
    platform, source_id, source_contact_guid, destination_contact_guid, source_user_id,
    destination_user_id, created_at, source_modified, active, merge_failed
"#;

fn merge_from_row(row: &PgRow) -> Result<ContactMergeRequest> {
    Ok(ContactMergeRequest {
        platform: row.try_get("platform")?,
        source_id: row.try_get("source_id")?,
        source_contact_guid: row.try_get("source_contact_guid")?,
        destination_contact_guid: row.try_get("destination_contact_guid")?,
        source_user_id: row.try_get("source_user_id")?,
        destination_user_id: row.try_get("destination_user_id")?,
        created_at: row.try_get("created_at")?,
        source_modified: row.try_get("source_modified")?,
        active: row.try_get("active")?,
        merge_failed: row.try_get("merge_failed")?,
    })
}

/// Refreshes the upstream fields only; `active`, `merge_failed` and the
/// recorded user ids belong to the reconciler.
pub(crate) async fn upsert_merge_request(
    pool: &PgPool,
    r: &ContactMergeRequest,
) -> Result<UpsertOutcome> {
    let inserted: Option<bool> = sqlx::query_scalar(
        r#"
        insert into contact_merge_requests (
          platform, source_id, source_contact_guid, destination_contact_guid, source_user_id,
          destination_user_id, created_at, source_modified, active, merge_failed
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10
        )
        on conflict (platform, source_id) do update set
          source_contact_guid = excluded.source_contact_guid,
          destination_contact_guid = excluded.destination_contact_guid,
          created_at = excluded.created_at,
          source_modified = excluded.source_modified
        where (contact_merge_requests.source_contact_guid,
               contact_merge_requests.destination_contact_guid,
               contact_merge_requests.created_at, contact_merge_requests.source_modified)
          is distinct from
              (excluded.source_contact_guid, excluded.destination_contact_guid,
               excluded.created_at, excluded.source_modified)
        returning (xmax = 0)
        "#,
    )
    .bind(&r.platform)
    .bind(r.source_id)
    .bind(&r.source_contact_guid)
    .bind(&r.destination_contact_guid)
    .bind(r.source_user_id)
    .bind(r.destination_user_id)
    .bind(r.created_at)
    .bind(r.source_modified)
    .bind(r.active)
    .bind(r.merge_failed)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("upsert_merge_request failed for request {}", r.source_id))?;
    Ok(upsert_outcome(inserted))
}

pub(crate) async fn pending_merge_requests(
    pool: &PgPool,
    platform: &str,
    destination_guid: &str,
) -> Result<Vec<ContactMergeRequest>> {
    let rows = sqlx::query(&format!(
        r#"
        select {MERGE_COLUMNS}
        from contact_merge_requests
        where platform = $1
          and destination_contact_guid = $2
          and active
          and not merge_failed
        order by created_at, source_id
        "#
    ))
    .bind(platform)
    .bind(destination_guid)
    .fetch_all(pool)
    .await
    .context("pending_merge_requests failed")?;
    rows.iter().map(merge_from_row).collect()
}

pub(crate) async fn close_merge_request(
    pool: &PgPool,
    platform: &str,
    request_id: i64,
    resolution: MergeResolution,
    source_user_id: Option<i64>,
    destination_user_id: Option<i64>,
) -> Result<()> {
    let sql = match resolution {
        MergeResolution::Resolved => {
            r#"
            update contact_merge_requests
            set active = false, source_user_id = $3, destination_user_id = $4
            where platform = $1 and source_id = $2
            "#
        }
        MergeResolution::Failed => {
            r#"
            update contact_merge_requests
            set merge_failed = true, source_user_id = $3, destination_user_id = $4
            where platform = $1 and source_id = $2
            "#
        }
    };
    let res = sqlx::query(sql)
        .bind(platform)
        .bind(request_id)
        .bind(source_user_id)
        .bind(destination_user_id)
        .execute(pool)
        .await
        .context("close_merge_request failed")?;
    if res.rows_affected() == 0 {
        return Err(anyhow!("merge request {request_id} not found"));
    }
    Ok(())
}

pub(crate) async fn failed_merge_requests(
    pool: &PgPool,
    platform: &str,
) -> Result<Vec<ContactMergeRequest>> {
    let rows = sqlx::query(&format!(
        r#"
        select {MERGE_COLUMNS}
        from contact_merge_requests
        where platform = $1 and merge_failed
        order by created_at, source_id
        "#
    ))
    .bind(platform)
    .fetch_all(pool)
    .await
    .context("failed_merge_requests failed")?;
    rows.iter().map(merge_from_row).collect()
}

pub(crate) async fn failed_merge_for_destination(
    pool: &PgPool,
    platform: &str,
    destination_guid: &str,
) -> Result<Option<i64>> {
    sqlx::query_scalar(
        r#"
        select source_id
        from contact_merge_requests
        where platform = $1 and destination_contact_guid = $2 and active and merge_failed
        order by created_at, source_id
        limit 1
        "#,
    )
    .bind(platform)
    .bind(destination_guid)
    .fetch_optional(pool)
    .await
    .context("failed_merge_for_destination failed")
}
