//! Rule lifecycle endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use herald_rules::{CreateRule, RuleView};

use super::{parse_id, ApiError};
use crate::state::AppState;

/// Query parameters for `GET /api/rules`.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub owner: Option<String>,
    /// Only active rules. Implied when no owner is given.
    #[serde(default)]
    pub active: bool,
}

pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateRule>,
) -> Result<(StatusCode, Json<RuleView>), ApiError> {
    let record = state.service.create_rule(input).await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

pub async fn list_rules(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<RuleView>>, ApiError> {
    let records = match params.owner.as_deref() {
        Some(owner) if params.active => state.service.active_rules_for_owner(owner).await?,
        Some(owner) => state.service.rules_for_owner(owner).await?,
        None => state.service.active_rules().await?,
    };
    Ok(Json(records.into_iter().map(RuleView::from).collect()))
}

pub async fn get_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RuleView>, ApiError> {
    let record = state.service.get_rule(parse_id(&id)?).await?;
    Ok(Json(record.into()))
}

pub async fn deactivate_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.service.deactivate_rule(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_rule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.service.delete_rule(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
