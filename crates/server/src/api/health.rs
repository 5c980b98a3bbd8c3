//! Liveness and configuration endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub toolchain: String,
    pub generator_ready: bool,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        toolchain: state.toolchain.clone(),
        generator_ready: state.generator_ready,
    })
}

/// Redacted runtime configuration (no secrets).
pub async fn config(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(state.config_summary.clone())
}
