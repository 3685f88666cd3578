//! HTTP handlers for model lifecycle and training

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use shared::validation::{validate_model_name, validate_model_version};

use crate::classifier::ModelInfo;
use crate::error::{AppError, AppResult};
use crate::services::training::{TrainRequest, TrainResponse};
use crate::services::TrainingService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoadModelRequest {
    pub model_name: String,
    pub model_version: String,
}

#[derive(Debug, Serialize)]
pub struct ModelStatusResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_info: Option<ModelInfo>,
}

/// Load a model from the model directory and serve it
pub async fn load_model(
    State(state): State<AppState>,
    Json(input): Json<LoadModelRequest>,
) -> AppResult<Json<ModelStatusResponse>> {
    validate_model_name(&input.model_name).map_err(|e| AppError::invalid("model_name", e))?;
    validate_model_version(&input.model_version)
        .map_err(|e| AppError::invalid("model_version", e))?;

    let loaded = state
        .models
        .load(&input.model_name, &input.model_version)
        .await?;
    Ok(Json(ModelStatusResponse {
        success: true,
        message: format!("Model {} v{} loaded", input.model_name, input.model_version),
        model_info: Some(loaded.info.clone()),
    }))
}

/// Stop serving the current model
pub async fn unload_model(State(state): State<AppState>) -> Json<ModelStatusResponse> {
    let message = match state.models.unload().await {
        Some(previous) => format!("Model {} unloaded", previous.info.model_name),
        None => "No model was loaded".to_string(),
    };
    Json(ModelStatusResponse {
        success: true,
        message,
        model_info: None,
    })
}

/// Information about the served model
pub async fn get_model_info(State(state): State<AppState>) -> AppResult<Json<ModelInfo>> {
    let info = state
        .models
        .info()
        .await
        .ok_or_else(|| AppError::NotFound("Loaded model".to_string()))?;
    Ok(Json(info))
}

/// Train a model from the configured data directory
pub async fn train_model(
    State(state): State<AppState>,
    Json(input): Json<TrainRequest>,
) -> AppResult<Json<TrainResponse>> {
    let service = TrainingService::new(
        state.config.clone(),
        state.models.clone(),
        state.training_lock.clone(),
    );
    let run = service.train_from_dir(None, input).await?;
    Ok(Json(run.response))
}
