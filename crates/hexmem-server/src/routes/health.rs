//! Unauthenticated liveness probe.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let db = match state.storage.ping() {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!("health check database probe failed: {}", e);
            "error"
        }
    };

    Json(json!({
        "status": if db == "ok" { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "db": db,
        "embedder": state.storage.embedder_name(),
    }))
}
