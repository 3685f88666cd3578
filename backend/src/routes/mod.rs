//! Route definitions for the Coal Fire Risk service

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes. CSV uploads accept bodies up to `max_upload_bytes`.
pub fn api_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Predictions
        .nest("/predict", prediction_routes(max_upload_bytes))
        .route(
            "/validate/csv",
            post(handlers::validate_csv).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        // Training and model lifecycle
        .route("/train", post(handlers::train_model))
        .nest("/model", model_routes())
        // Date accuracy of stored predictions
        .route("/metrics", get(handlers::get_metrics))
}

/// Prediction routes
fn prediction_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::predict))
        .route("/batch", post(handlers::predict_batch))
        .route("/direct", post(handlers::predict_direct))
        .route(
            "/csv",
            post(handlers::predict_csv).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
}

/// Model management routes
fn model_routes() -> Router<AppState> {
    Router::new()
        .route("/load", post(handlers::load_model))
        .route("/unload", post(handlers::unload_model))
        .route("/info", get(handlers::get_model_info))
}
