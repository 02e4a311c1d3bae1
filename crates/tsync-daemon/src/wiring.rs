//! Production wiring: configuration, Postgres and the HTTP client assembled
//! into a [`SyncEngine`]. Shared by the daemon and the CLI.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::warn;
use tsync_client::{ApiClient, Upstream};
use tsync_config::{LoadedConfig, PlatformSettings, SyncSettings};
use tsync_db::{PgEnrolments, PgLocks, PgStore, PgUsers};
use tsync_engine::{Collaborators, Notifier, SyncContext, SyncEngine, SystemClock};
use tsync_schemas::Notification;

/// Env var holding comma-separated config paths in merge order.
pub const ENV_CONFIG_PATHS: &str = "TSYNC_CONFIG";

/// Delivers operator notifications to the log at WARN.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, n: &Notification) -> Result<()> {
        warn!(
            kind = n.kind.as_str(),
            subject = %n.subject,
            created_at = %n.created_at.to_rfc3339(),
            "{}",
            n.message
        );
        Ok(())
    }
}

/// Config paths from the arguments, falling back to `TSYNC_CONFIG`.
pub fn config_paths(args: Vec<String>) -> Result<Vec<String>> {
    if !args.is_empty() {
        return Ok(args);
    }
    let raw = std::env::var(ENV_CONFIG_PATHS).with_context(|| {
        format!("no config paths given and env var {ENV_CONFIG_PATHS} is not set")
    })?;
    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect())
}

/// HTTP client for `platform`, credentials resolved from the environment.
pub fn api_client(
    platform: &PlatformSettings,
    loaded: &LoadedConfig,
    timeout: Duration,
) -> Result<Arc<dyn Upstream>> {
    let creds = tsync_config::resolve_credentials(&loaded.config_json)?;
    let client = ApiClient::new(&platform.host, creds.username, creds.password, timeout)
        .with_context(|| format!("api client init failed for {}", platform.host))?;
    Ok(Arc::new(client))
}

pub fn build_engine(pool: PgPool, settings: SyncSettings, loaded: &LoadedConfig) -> Result<SyncEngine> {
    let timeout = Duration::from_secs(settings.api.request_timeout_secs);
    let upstream = api_client(&settings.platform, loaded, timeout)?;
    let lease_ttl = settings.locks.lease_ttl();

    Ok(SyncEngine::new(
        SyncContext::new(settings, upstream),
        Collaborators {
            store: Arc::new(PgStore::new(pool.clone())),
            locks: Arc::new(PgLocks::new(pool.clone(), lease_ttl)),
            enrolments: Arc::new(PgEnrolments::new(pool.clone())),
            users: Arc::new(PgUsers::new(pool)),
            notifier: Arc::new(LogNotifier),
            clock: Arc::new(SystemClock),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_paths_win_over_env() {
        let paths = config_paths(vec!["base.yaml".into(), "site.yaml".into()]).unwrap();
        assert_eq!(paths, vec!["base.yaml", "site.yaml"]);
    }
}
