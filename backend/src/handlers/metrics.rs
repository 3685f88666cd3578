use axum::{extract::State, Json};

use crate::error::AppResult;
use crate::services::metrics::MetricsResponse;
use crate::services::MetricsService;
use crate::AppState;

/// Date accuracy of stored predictions for the current model
pub async fn get_metrics(State(state): State<AppState>) -> AppResult<Json<MetricsResponse>> {
    let service = MetricsService::new(state.db, state.models);
    let response = service.get_metrics().await?;
    Ok(Json(response))
}
