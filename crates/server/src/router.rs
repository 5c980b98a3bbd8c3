//! HTTP router construction.

use std::sync::Arc;

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::state::AppState;

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/api/config", get(api::config))
        .route("/api/rules", post(api::create_rule).get(api::list_rules))
        .route("/api/rules/{id}", get(api::get_rule).delete(api::delete_rule))
        .route("/api/rules/{id}/deactivate", patch(api::deactivate_rule))
        .route("/api/scheduler/tick", post(api::run_tick))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
