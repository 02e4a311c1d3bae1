//! In-process scenario tests for tsync-daemon HTTP endpoints.
//!
//! The router is driven via `tower::ServiceExt::oneshot` over an engine wired
//! to the in-memory testkit collaborators; no socket, database or network.
//!
//! # Invariants under test
//! - `/v1/sync` runs a forced pass and records it as the last pass.
//! - `/v1/status` reflects the callability gate and the stored watermarks.
//! - `/v1/trigger` maps onto one job; malformed triggers are a 400.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt; // oneshot
use tsync_daemon::{routes, state};
use tsync_testkit::fixtures::{at, event};
use tsync_testkit::Harness;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_router(h: &Harness) -> axum::Router {
    let st = Arc::new(state::AppState::new(h.engine.clone()));
    routes::build_router(st)
}

async fn call(router: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = router.clone().oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    let json = serde_json::from_slice(&body).expect("body is not valid JSON");
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post(uri: &str, json: Option<Value>) -> Request<Body> {
    let b = Request::builder().method("POST").uri(uri);
    match json {
        Some(v) => b
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => b.body(Body::empty()).unwrap(),
    }
}

fn job<'a>(jobs: &'a Value, kind: &str, scope: &str) -> &'a Value {
    jobs.as_array()
        .unwrap()
        .iter()
        .find(|j| j["kind"] == kind && j["scope"] == scope)
        .unwrap_or_else(|| panic!("no job {kind} {scope} in {jobs}"))
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_200_ok_true() {
    let h = Harness::new();
    let (status, json) = call(&make_router(&h), get("/v1/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(json["service"], "tsync-daemon");
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fresh_status_is_callable_with_no_history() {
    let h = Harness::new();
    let (status, json) = call(&make_router(&h), get("/v1/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["platform"], "acme");
    assert_eq!(json["callable"], true);
    assert!(json["last_pass"].is_null());
    assert_eq!(json["watermarks"].as_array().unwrap().len(), 0);
}

// ---------------------------------------------------------------------------
// POST /v1/sync
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sync_runs_forced_pass_and_status_reports_it() {
    let h = Harness::new();
    h.upstream
        .set_items("events/", vec![event(10, "ev-1", at(5), "Active", None)]);
    let router = make_router(&h);

    let (status, pass) = call(&router, post("/v1/sync", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pass["forced"], true);
    assert_eq!(pass["gated"], false);
    let events = job(&pass["jobs"], "events", "global");
    assert_eq!(events["outcome"], "success");
    assert_eq!(events["inserted"], 1);

    let (_, snap) = call(&router, get("/v1/status")).await;
    assert_eq!(snap["last_pass"]["started_at"], pass["started_at"]);
    let wm = snap["watermarks"]
        .as_array()
        .unwrap()
        .iter()
        .find(|w| w["kind"] == "events")
        .expect("events watermark stored");
    assert_eq!(wm["cursor_id"], 10);
    assert_eq!(wm["disabled"], false);

    // Forced again: the fresh watermark does not make the job wait.
    let (_, again) = call(&router, post("/v1/sync", None)).await;
    assert_eq!(job(&again["jobs"], "events", "global")["outcome"], "success");
}

#[tokio::test]
async fn credential_failure_closes_gate_in_status() {
    let h = Harness::new();
    h.upstream.fail_next(401);
    let router = make_router(&h);

    let (status, pass) = call(&router, post("/v1/sync", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pass["gated"], true);

    let (_, snap) = call(&router, get("/v1/status")).await;
    assert_eq!(snap["callable"], false);
    assert_eq!(snap["api_status"]["last_status"], 401);
    assert_eq!(snap["api_status"]["error_count"], 1);
}

// ---------------------------------------------------------------------------
// POST /v1/trigger
// ---------------------------------------------------------------------------

#[tokio::test]
async fn trigger_runs_one_job() {
    let h = Harness::new();
    h.upstream
        .set_items("events/", vec![event(10, "ev-1", at(5), "Active", None)]);
    let router = make_router(&h);

    let body = serde_json::json!({ "resource_type": "Event" });
    let (status, json) = call(&router, post("/v1/trigger", Some(body))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["kind"], "events");
    assert_eq!(json["scope"], "global");
    assert_eq!(json["outcome"], "success");
    assert_eq!(json["records"], 1);
}

#[tokio::test]
async fn malformed_triggers_are_bad_requests() {
    let h = Harness::new();
    let router = make_router(&h);

    let unknown = serde_json::json!({ "resource_type": "webinar" });
    let (status, json) = call(&router, post("/v1/trigger", Some(unknown))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("webinar"));

    let no_instance = serde_json::json!({ "resource_type": "registration" });
    let (status, _) = call(&router, post("/v1/trigger", Some(no_instance))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.upstream.call_count(), 0);
}
