use anyhow::{anyhow, Result};
use tsync_db::PgStore;
use tsync_engine::{MergeResolution, SyncStore};

/// Failed merge requests stay active and are never retried; each needs an
/// operator to fix the accounts by hand.
pub async fn failures(platform: &str) -> Result<()> {
    let store = PgStore::new(tsync_db::connect_from_env().await?);
    let failed = store.failed_merge_requests(platform).await?;

    println!("platform={platform} failed_merge_requests={}", failed.len());
    for r in &failed {
        println!(
            "request={} source_contact={} destination_contact={} source_user={} destination_user={} created_at={} active={}",
            r.source_id,
            r.source_contact_guid,
            r.destination_contact_guid,
            opt_id(r.source_user_id),
            opt_id(r.destination_user_id),
            r.created_at.to_rfc3339(),
            r.active
        );
    }
    Ok(())
}

/// Marks a failed request resolved. Only failed, still-active requests
/// qualify; anything else is left alone.
pub async fn resolve(platform: &str, request_id: i64) -> Result<()> {
    let store = PgStore::new(tsync_db::connect_from_env().await?);
    let failed = store.failed_merge_requests(platform).await?;
    let request = failed
        .into_iter()
        .find(|r| r.source_id == request_id && r.active)
        .ok_or_else(|| anyhow!("no failed active merge request {request_id} on {platform}"))?;

    store
        .close_merge_request(
            platform,
            request.source_id,
            MergeResolution::Resolved,
            request.source_user_id,
            request.destination_user_id,
        )
        .await?;
    println!(
        "resolved=true request={} destination_contact={}",
        request.source_id, request.destination_contact_guid
    );
    Ok(())
}

fn opt_id(v: Option<i64>) -> String {
    v.map(|id| id.to_string()).unwrap_or_else(|| "null".to_string())
}
