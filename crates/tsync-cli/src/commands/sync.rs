use anyhow::{bail, Context, Result};
use tracing::warn;
use tsync_config::{report_unused_keys, ConfigConsumer, UnusedKeyPolicy};
use tsync_daemon::api_types::PassSummary;
use tsync_daemon::wiring;

/// One pass against the configured platform. Exits non-zero when the pass
/// aborts or any job fails; deferred jobs are not failures.
pub async fn run(config_paths: Vec<String>, force: bool) -> Result<()> {
    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = tsync_config::load_layered_yaml(&path_refs)?;
    let unused = report_unused_keys(ConfigConsumer::Cli, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !unused.is_clean() {
        warn!(keys = ?unused.unused_leaf_pointers, "config carries keys the CLI never reads");
    }
    let settings = loaded.settings()?;

    let pool = tsync_db::connect_from_env().await?;
    let engine = wiring::build_engine(pool, settings, &loaded)?;

    let report = engine
        .run_pass(force)
        .await
        .context("sync pass aborted")?;
    let summary = PassSummary::from_report(&report, force, engine.now());

    println!("config_hash={}", loaded.config_hash);
    println!("platform={}", engine.context().platform());
    for job in &summary.jobs {
        println!(
            "job={} scope={} outcome=\"{}\" records={} inserted={} updated={} deleted={} record_errors={}",
            job.kind,
            job.scope,
            job.outcome,
            job.records,
            job.inserted,
            job.updated,
            job.deleted,
            job.record_errors.len()
        );
        for e in &job.record_errors {
            println!("  record_error=\"{e}\"");
        }
    }
    println!(
        "succeeded={} failed={} gated={} orphans_deleted={} request_log_purged={}",
        summary.succeeded,
        summary.failed,
        summary.gated,
        summary.orphans_deleted,
        summary.request_log_purged
    );

    if summary.failed > 0 {
        bail!("SYNC_FAILED: {} job(s) failed", summary.failed);
    }
    Ok(())
}
