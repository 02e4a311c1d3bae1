//! HTTP surface of the daemon: health, status, forced passes and triggers.
//!
//! Scenario tests drive the bare router from [`build_router`]; the binary adds
//! tracing and CORS on top.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, warn};
use tsync_engine::{TriggerError, TriggerEvent};

use crate::{
    api_types::{ErrorResponse, HealthResponse, TriggerRequest},
    state::AppState,
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Routes over `state`, without middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/sync", post(sync_now))
        .route("/v1/trigger", post(trigger))
        .with_state(state)
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> Response {
    match st.status().await {
        Ok(snap) => (StatusCode::OK, Json(snap)).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/sync
// ---------------------------------------------------------------------------

/// Run a forced pass now. Timing is bypassed; locks, disabled watermarks and
/// the callability gate still apply.
pub(crate) async fn sync_now(State(st): State<Arc<AppState>>) -> Response {
    info!("sync requested");
    match st.run_pass(true).await {
        Ok(Some(summary)) => (StatusCode::OK, Json(summary)).into_response(),
        Ok(None) => error_response(
            StatusCode::CONFLICT,
            "PASS_IN_PROGRESS: a pass is already running",
        ),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/trigger
// ---------------------------------------------------------------------------

pub(crate) async fn trigger(
    State(st): State<Arc<AppState>>,
    Json(req): Json<TriggerRequest>,
) -> Response {
    let event = TriggerEvent::new(req.resource_type, req.resource_id);
    match st.run_trigger(&event).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e @ (TriggerError::UnknownResourceType(_) | TriggerError::MissingInstance(_))) => {
            warn!(error = %e, "trigger rejected");
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
