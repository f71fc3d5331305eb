// src/handlers/mod.rs

use axum::{Json, response::IntoResponse};
use serde_json::json;

pub mod attempt;
pub mod quiz;
pub mod stats;
pub mod user;

/// Liveness probe.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
