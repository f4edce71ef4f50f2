use std::sync::Arc;

use axum::extract::State;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod dashboard;
pub mod health;

/// Build the application router. The example endpoints sit behind the
/// admission pipeline; `/healthz` and `/metrics` stay open for probes and
/// scrapers.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/dashboard/details", get(dashboard::get_details))
        .route("/health/status", get(health::get_status))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::admission,
        ))
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(metrics_endpoint))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> String {
    state.metrics.encode()
}
