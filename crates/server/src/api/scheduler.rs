//! Manual scheduler control.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use herald_rules::TickReport;

use crate::state::AppState;

/// Run one tick now and return its report.
///
/// Waits for a tick already in progress to finish first.
pub async fn run_tick(State(state): State<Arc<AppState>>) -> Json<TickReport> {
    Json(state.scheduler.run_tick().await)
}
