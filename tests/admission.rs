//! End-to-end tests for the admission pipeline over the example API.
//!
//! These drive the real router with `tower::ServiceExt::oneshot` against an
//! in-memory SQLite store, covering:
//! 1. The fixed 403 bodies for missing and invalid/exhausted tokens
//! 2. The X-RateLimit-Remaining header contract (-1 / remaining / 0)
//! 3. Call-count accounting across the full check → handler → record path
//! 4. The open probe endpoints (/healthz, /metrics)

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

use tackle::config::Config;
use tackle::gate::AuthGate;
use tackle::metrics::Metrics;
use tackle::store::SqliteStore;
use tackle::{api, AppState};

async fn test_app() -> (Router, Arc<AppState>) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = SqliteStore::new(pool);
    store.migrate().await.unwrap();

    let state = Arc::new(AppState {
        gate: AuthGate::new(store, None),
        metrics: Metrics::new(),
        config: Config {
            port: 0,
            database_url: "sqlite::memory:".into(),
            bootstrap_admin_token: None,
            bootstrap_admin_desc: String::new(),
        },
    });

    (api::app_router(state.clone()), state)
}

async fn get(app: &Router, path: &str, token: Option<&str>) -> axum::response::Response {
    let mut builder = Request::builder().uri(path);
    if let Some(token) = token {
        builder = builder.header("AUTH_TOKEN", token);
    }
    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn remaining_header(response: &axum::response::Response) -> Option<String> {
    response
        .headers()
        .get("x-ratelimit-remaining")
        .map(|v| v.to_str().unwrap().to_string())
}

#[tokio::test]
async fn test_missing_token_is_403_with_fixed_body() {
    let (app, _) = test_app().await;

    let response = get(&app, "/health/status", None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(remaining_header(&response).as_deref(), Some("0"));

    let body = json_body(response).await;
    assert_eq!(body["error_detail"], "No authorisation token provided!");
}

#[tokio::test]
async fn test_empty_token_is_treated_as_missing() {
    let (app, _) = test_app().await;

    let response = get(&app, "/health/status", Some("")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = json_body(response).await;
    assert_eq!(body["error_detail"], "No authorisation token provided!");
}

#[tokio::test]
async fn test_unknown_token_is_403_with_fixed_body() {
    let (app, _) = test_app().await;

    let response = get(&app, "/health/status", Some("nope")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(remaining_header(&response).as_deref(), Some("0"));

    let body = json_body(response).await;
    assert_eq!(
        body["error_detail"],
        "Invalid authorisation token provided or API rate limit exceeded!"
    );
}

#[tokio::test]
async fn test_fallback_auth_header_accepted() {
    let (app, state) = test_app().await;
    state
        .gate
        .store()
        .upsert_token("T1", None, None, false)
        .await
        .unwrap();

    let request = Request::builder()
        .uri("/health/status")
        .header("X-Auth-Token", "T1")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unlimited_token_reports_minus_one_remaining() {
    let (app, state) = test_app().await;
    state
        .gate
        .store()
        .upsert_token("T1", Some("unlimited"), None, false)
        .await
        .unwrap();

    let response = get(&app, "/dashboard/details", Some("T1")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(remaining_header(&response).as_deref(), Some("-1"));

    let body = json_body(response).await;
    assert_eq!(body["api_version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["service_name"], "tackle service");
}

#[tokio::test]
async fn test_limited_token_counts_down_then_rejects() {
    let (app, state) = test_app().await;
    state
        .gate
        .store()
        .upsert_token("T1", Some("two calls"), Some(2), false)
        .await
        .unwrap();

    // First call: admitted, count becomes 1, one call left.
    let response = get(&app, "/health/status", Some("T1")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(remaining_header(&response).as_deref(), Some("1"));

    // Second call: admitted, count reaches the limit, none left.
    let response = get(&app, "/health/status", Some("T1")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(remaining_header(&response).as_deref(), Some("0"));

    // Third call: exhausted.
    let response = get(&app, "/health/status", Some("T1")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json_body(response).await;
    assert_eq!(
        body["error_detail"],
        "Invalid authorisation token provided or API rate limit exceeded!"
    );

    let details = state.gate.store().get_token("T1").await.unwrap().unwrap();
    assert_eq!(details.call_count, 2);
}

#[tokio::test]
async fn test_usage_is_recorded_per_endpoint() {
    let (app, state) = test_app().await;
    state
        .gate
        .store()
        .upsert_token("T1", None, None, false)
        .await
        .unwrap();

    get(&app, "/health/status", Some("T1")).await;
    get(&app, "/health/status", Some("T1")).await;
    get(&app, "/dashboard/details", Some("T1")).await;

    let details = state.gate.store().get_token("T1").await.unwrap().unwrap();
    assert_eq!(details.call_count, 3);
    assert_eq!(details.call_count_breakdown.get("/health/status"), Some(&2));
    assert_eq!(
        details.call_count_breakdown.get("/dashboard/details"),
        Some(&1)
    );
}

#[tokio::test]
async fn test_cache_matches_store_after_admitted_call() {
    let (app, state) = test_app().await;
    state
        .gate
        .store()
        .upsert_token("T1", None, Some(5), false)
        .await
        .unwrap();

    get(&app, "/health/status", Some("T1")).await;

    let details = state.gate.store().get_token("T1").await.unwrap().unwrap();
    assert_eq!(
        state.gate.cached_counts("T1"),
        Some((details.call_count, details.call_count_limit))
    );
}

#[tokio::test]
async fn test_probe_endpoints_skip_the_gate() {
    let (app, _) = test_app().await;

    let response = get(&app, "/healthz", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&app, "/metrics", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_denials_show_up_in_metrics() {
    let (app, state) = test_app().await;

    get(&app, "/health/status", None).await;
    get(&app, "/health/status", Some("bogus")).await;

    let text = state.metrics.encode();
    assert!(text.contains("tackle_denied_call_count"));
}
