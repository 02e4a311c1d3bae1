//! tsync-daemon entry point.
//!
//! Loads the layered config, connects and migrates Postgres, wires the
//! engine, starts the scheduler loop and serves the status/control surface.
//! Handlers live in `routes.rs`; shared state in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};
use tsync_config::{report_unused_keys, ConfigConsumer, UnusedKeyPolicy};
use tsync_daemon::{routes, state, wiring};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let paths = wiring::config_paths(std::env::args().skip(1).collect())?;
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = tsync_config::load_layered_yaml(&path_refs)?;
    let unused = report_unused_keys(
        ConfigConsumer::Daemon,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )?;
    if !unused.is_clean() {
        warn!(keys = ?unused.unused_leaf_pointers, "config carries keys the daemon never reads");
    }
    let settings = loaded.settings()?;
    info!(config_hash = %loaded.config_hash, platform = %settings.platform.name, "config loaded");

    let pool = tsync_db::connect_from_env().await?;
    tsync_db::migrate(&pool).await?;

    let tick = Duration::from_secs(settings.daemon.tick_secs);
    let addr = bind_addr(settings.daemon.addr.as_deref())?;

    let engine = wiring::build_engine(pool, settings, &loaded)?;
    let shared = Arc::new(state::AppState::new(engine));

    let scheduler = state::spawn_sync_loop(Arc::clone(&shared), tick);
    spawn_reload_on_hangup(Arc::clone(&shared), paths);

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    info!("tsync-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    scheduler.abort();
    info!("tsync-daemon stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// `TSYNC_DAEMON_ADDR` wins over `daemon.addr`; default 127.0.0.1:8898.
fn bind_addr(configured: Option<&str>) -> anyhow::Result<SocketAddr> {
    let raw = std::env::var("TSYNC_DAEMON_ADDR")
        .ok()
        .or_else(|| configured.map(str::to_string));
    match raw {
        Some(s) => s
            .parse()
            .with_context(|| format!("invalid daemon bind address '{s}'")),
        None => Ok(SocketAddr::from(([127, 0, 0, 1], 8898))),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler unavailable; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

/// SIGHUP re-reads the config and swaps the platform when its name or host
/// changed. Other settings take effect on restart.
#[cfg(unix)]
fn spawn_reload_on_hangup(shared: Arc<state::AppState>, paths: Vec<String>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangups = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "SIGHUP handler unavailable; reload disabled");
                return;
            }
        };
        while hangups.recv().await.is_some() {
            if let Err(e) = reload_platform(&shared, &paths).await {
                warn!(error = %e, "config reload failed; keeping current platform");
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(_shared: Arc<state::AppState>, _paths: Vec<String>) {}

#[cfg(unix)]
async fn reload_platform(shared: &state::AppState, paths: &[String]) -> anyhow::Result<()> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = tsync_config::load_layered_yaml(&path_refs)?;
    let settings = loaded.settings()?;

    let current = shared.engine.read().await.context().settings().platform.clone();
    if current == settings.platform {
        info!(config_hash = %loaded.config_hash, "config reloaded; platform unchanged");
        return Ok(());
    }

    let timeout = Duration::from_secs(settings.api.request_timeout_secs);
    let upstream = wiring::api_client(&settings.platform, &loaded, timeout)?;
    shared
        .replace_platform(settings.platform, upstream)
        .await
        .context("platform replacement failed")?;
    Ok(())
}

/// Browser access is limited to local dashboards.
fn cors_localhost_only() -> CorsLayer {
    let origins: Vec<HeaderValue> = ["localhost", "127.0.0.1"]
        .into_iter()
        .flat_map(|host| [format!("http://{host}"), format!("http://{host}:3000")])
        .filter_map(|origin| HeaderValue::from_str(&origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
