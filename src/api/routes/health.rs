//! Health check endpoint

use axum::{Json, extract::State};
use chrono::Utc;

use crate::api::{state::ApiState, types::HealthResponse};

/// GET /api/v1/health
///
/// Liveness plus the age of the data being served
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let now = Utc::now();
    let cache = state.store.get();

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: now.to_rfc3339(),
        uptime: (now - state.started_at).num_seconds(),
        last_update: cache.last_update,
        targets: cache.targets.len(),
    })
}
