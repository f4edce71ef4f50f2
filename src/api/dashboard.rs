//! EXAMPLE — dashboard endpoint showing what a gated handler looks like.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::AppState;

/// GET /dashboard/details — service identity for operator dashboards.
pub async fn get_details(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "api_version": env!("CARGO_PKG_VERSION"),
        "service_name": "tackle service",
        "exec_id": state.metrics.exec_id(),
    }))
}
