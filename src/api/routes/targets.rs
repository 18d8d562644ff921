//! Target status endpoints

use axum::{
    Json,
    extract::{Path, State},
};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{PublicTarget, TargetView, TargetsResponse},
};

/// GET /api/v1/targets
///
/// Every target of the last cycle, in registry order
pub async fn list_targets(State(state): State<ApiState>) -> Json<TargetsResponse> {
    let cache = state.store.get();
    let targets: Vec<TargetView> = cache.targets.iter().map(TargetView::from).collect();

    Json(TargetsResponse {
        count: targets.len(),
        targets,
        last_update: cache.last_update,
    })
}

/// GET /api/v1/targets/:id
pub async fn get_target(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TargetView>> {
    let cache = state.store.get();

    cache
        .get(&id)
        .map(|status| Json(TargetView::from(status)))
        .ok_or_else(|| ApiError::NotFound(format!("target '{id}' not found")))
}

/// GET /api/v1/public/targets
///
/// Targets marked public, under their display names
pub async fn list_public_targets(State(state): State<ApiState>) -> Json<Vec<PublicTarget>> {
    let cache = state.store.get();

    Json(
        cache
            .targets
            .iter()
            .filter(|status| status.public)
            .map(PublicTarget::from)
            .collect(),
    )
}
