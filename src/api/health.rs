//! EXAMPLE — health endpoint behind the gate.

use axum::Json;
use serde_json::{json, Value};

/// GET /health/status — reports 200 if the service is up.
///
/// Runs post-auth, so reaching this point already proves the token store is
/// up and answering. Deeper checks can be added here as needed.
pub async fn get_status() -> Json<Value> {
    tracing::info!("health: OK");
    Json(json!({}))
}
