//! Health check handlers

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classifier::ModelInfo;
use crate::services::StockpileService;
use crate::AppState;

#[derive(Serialize)]
pub struct ModelStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<ModelInfo>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub database: String,
    pub model: ModelStatus,
    pub timestamp: DateTime<Utc>,
}

/// Health check endpoint handler. Degraded when the database is down or
/// no model is loaded.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    // Check database connectivity
    let database_ok = match StockpileService::new(state.db.clone()).ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            false
        }
    };
    let info = state.models.info().await;

    let status = if database_ok && info.is_some() {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        service: "coal-fire-risk".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: if database_ok { "connected" } else { "disconnected" }.to_string(),
        model: ModelStatus {
            status: if info.is_some() { "loaded" } else { "not_loaded" }.to_string(),
            info,
        },
        timestamp: Utc::now(),
    })
}
