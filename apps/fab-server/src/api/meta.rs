use axum::Json;
use serde_json::{json, Value};

/// Liveness probe; also what the surfaces poll to show "connected".
pub async fn healthz() -> Json<Value> {
    Json(json!({
        "ok": true,
        "service": "fab-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
