//! Alert state endpoint

use axum::{Json, extract::State};

use crate::api::{error::ApiResult, state::ApiState, types::AlertsResponse};

/// GET /api/v1/alerts
///
/// The deduplication records, keyed `<targetId>_<severity>`
pub async fn alert_state(State(state): State<ApiState>) -> ApiResult<Json<AlertsResponse>> {
    let alerts = state.scheduler.alert_state().await?;

    Ok(Json(AlertsResponse {
        count: alerts.len(),
        alerts,
    }))
}
