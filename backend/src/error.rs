//! Error handling for the Coal Fire Risk service
//!
//! Provides consistent error responses in English and Russian

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::pipeline::{PipelineError, SourceKind};
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Pipeline errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    // Model lifecycle errors
    #[error("No model loaded")]
    ModelNotLoaded,

    #[error("Model not found: {name} v{version}")]
    ModelNotFound { name: String, version: String },

    #[error("Training failed: {0}")]
    Training(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: String,
        message: String,
        message_ru: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Upload errors keep the status reported by the multipart reader
    #[error("Upload error: {0}")]
    Upload(#[from] MultipartError),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// Validation failure on a single field with an English message
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        AppError::Validation {
            field: field.into(),
            message_ru: format!("Некорректное значение: {}", message),
            message,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|f| f.to_string())
            .unwrap_or_default();
        AppError::invalid(field, errors.to_string())
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_ru: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Input table that caused a pipeline failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceKind>,
}

impl ErrorDetail {
    fn new(code: &str, message_en: impl Into<String>, message_ru: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message_en: message_en.into(),
            message_ru: message_ru.into(),
            field: None,
            source: None,
        }
    }
}

fn source_name_ru(source: SourceKind) -> &'static str {
    match source {
        SourceKind::Fires => "возгорания",
        SourceKind::Supplies => "поставки",
        SourceKind::Temperature => "температура",
        SourceKind::Weather => "погода",
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::Pipeline(err) => {
                let source = err.source_kind();
                let message_ru = match (err, source) {
                    (PipelineError::EmptySource { .. }, Some(s)) => format!(
                        "Таблица «{}» пуста после фильтрации дат",
                        source_name_ru(s)
                    ),
                    (PipelineError::MissingColumn { column, .. }, Some(s)) => format!(
                        "В таблице «{}» нет столбца «{}»",
                        source_name_ru(s),
                        column
                    ),
                    (_, Some(s)) => format!("Не удалось прочитать таблицу «{}»", source_name_ru(s)),
                    (_, None) => "Ошибка формирования таблицы признаков".to_string(),
                };
                let mut detail = ErrorDetail::new(
                    "PIPELINE_ERROR",
                    format!("{} (stage: {})", err, err.stage()),
                    message_ru,
                );
                detail.source = source;
                if let PipelineError::MissingColumn { column, .. } = err {
                    detail.field = Some(column.to_string());
                }
                (StatusCode::UNPROCESSABLE_ENTITY, detail)
            }
            AppError::ModelNotLoaded => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorDetail::new(
                    "MODEL_NOT_LOADED",
                    "No model is loaded and the default model could not be loaded",
                    "Модель не загружена",
                ),
            ),
            AppError::ModelNotFound { name, version } => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new(
                    "MODEL_NOT_FOUND",
                    format!("Model {} v{} not found", name, version),
                    format!("Модель {} v{} не найдена", name, version),
                ),
            ),
            AppError::Training(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new(
                    "TRAINING_ERROR",
                    format!("Training failed: {}", msg),
                    format!("Ошибка обучения модели: {}", msg),
                ),
            ),
            AppError::Validation {
                field,
                message,
                message_ru,
            } => {
                let mut detail = ErrorDetail::new("VALIDATION_ERROR", message.clone(), message_ru.clone());
                detail.field = Some(field.clone());
                (StatusCode::BAD_REQUEST, detail)
            }
            AppError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new(
                    "VALIDATION_ERROR",
                    msg.clone(),
                    format!("Некорректные данные: {}", msg),
                ),
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new(
                    "NOT_FOUND",
                    format!("{} not found", resource),
                    format!("{} не найден", resource),
                ),
            ),
            AppError::Upload(err) => {
                let status = err.status();
                let detail = if status == StatusCode::PAYLOAD_TOO_LARGE {
                    ErrorDetail::new(
                        "PAYLOAD_TOO_LARGE",
                        "Upload exceeds the configured size limit",
                        "Размер загружаемых файлов превышает допустимый",
                    )
                } else {
                    ErrorDetail::new(
                        "UPLOAD_ERROR",
                        format!("Invalid multipart body: {}", err.body_text()),
                        "Некорректный формат загрузки",
                    )
                };
                (status, detail)
            }
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "DATABASE_ERROR",
                    "A database error occurred",
                    "Ошибка базы данных",
                ),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "INTERNAL_ERROR",
                    msg.clone(),
                    "Внутренняя ошибка сервера",
                ),
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "INTERNAL_ERROR",
                    "An internal server error occurred",
                    "Внутренняя ошибка сервера",
                ),
            ),
        };

        // Log the error for debugging
        tracing::error!("Error: {:?}", self);

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
