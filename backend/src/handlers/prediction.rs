//! HTTP handlers for prediction endpoints

use axum::{
    extract::{Multipart, State},
    Json,
};

use crate::error::AppResult;
use crate::handlers::upload::read_sources;
use crate::services::prediction::{
    BatchPredictRequest, BatchPredictionResponse, CsvPredictionResponse, DirectPredictRequest,
    PredictRequest, PredictionResult,
};
use crate::services::validation::ValidationReport;
use crate::services::{PredictionService, ValidationService};
use crate::AppState;

fn prediction_service(state: &AppState) -> PredictionService {
    PredictionService::new(state.db.clone(), state.config.clone(), state.models.clone())
}

/// Score one stockpile from the database
pub async fn predict(
    State(state): State<AppState>,
    Json(input): Json<PredictRequest>,
) -> AppResult<Json<PredictionResult>> {
    let result = prediction_service(&state).predict(input).await?;
    Ok(Json(result))
}

/// Score several stockpiles
pub async fn predict_batch(
    State(state): State<AppState>,
    Json(input): Json<BatchPredictRequest>,
) -> AppResult<Json<BatchPredictionResponse>> {
    let response = prediction_service(&state).predict_batch(input).await?;
    Ok(Json(response))
}

/// Score caller-supplied features
pub async fn predict_direct(
    State(state): State<AppState>,
    Json(input): Json<DirectPredictRequest>,
) -> AppResult<Json<PredictionResult>> {
    let result = prediction_service(&state).predict_direct(input).await?;
    Ok(Json(result))
}

/// Score every temperature act in uploaded exports
pub async fn predict_csv(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<CsvPredictionResponse>> {
    let upload = read_sources(multipart).await?;
    let response = prediction_service(&state)
        .predict_csv(upload.sources, upload.horizon_days)
        .await?;
    Ok(Json(response))
}

/// Evaluate the loaded model against uploaded labeled exports
pub async fn validate_csv(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Json<ValidationReport>> {
    let upload = read_sources(multipart).await?;
    let service = ValidationService::new(
        prediction_service(&state),
        state.config.model.decision_threshold,
    );
    let report = service.validate(upload.sources).await?;
    Ok(Json(report))
}
