//! Prediction service: scores stockpiles from the database, from directly
//! supplied features and from uploaded CSV exports

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::models::{
    estimate_fire_date, FeatureVector, RiskLevel, DEFAULT_AIR_TEMP, DEFAULT_HUMIDITY, DEFAULT_PRECIP,
};
use shared::pipeline::{
    assemble_dataset, point_in_time_features, AssemblyOptions, AssemblyReport, PointInTimeInput,
    SourceTables,
};
use shared::validation::{validate_features, validate_horizon, validate_probability};
use sqlx::PgPool;
use tracing::{info, warn};
use validator::Validate;

use crate::classifier::{LoadedModel, ModelInfo, ModelManager};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::stockpile::StockpileService;

/// Request to score one stockpile from the database
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PredictRequest {
    pub stockpile_id: i32,
    #[validate(range(min = 1, max = 30))]
    pub horizon_days: Option<u32>,
    /// Day to predict for; today when absent
    pub target_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BatchPredictRequest {
    #[validate(length(min = 1, max = 1000))]
    pub stockpile_ids: Vec<i32>,
    #[validate(range(min = 1, max = 30))]
    pub horizon_days: Option<u32>,
    /// Probability at or above which a stockpile is listed as high risk
    pub threshold: Option<f64>,
    pub target_date: Option<NaiveDate>,
}

/// Features supplied by the caller. Weather and delta default when absent.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DirectPredictRequest {
    #[validate(range(min = 0.0, max = 200.0))]
    pub max_temperature: f64,
    #[validate(range(min = 0.0))]
    pub age_days: f64,
    pub temp_air: Option<f64>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub humidity: Option<f64>,
    #[validate(range(min = 0.0))]
    pub precip: Option<f64>,
    pub temp_delta_3d: Option<f64>,
    #[validate(range(min = 1, max = 30))]
    pub horizon_days: Option<u32>,
    pub target_date: Option<NaiveDate>,
}

impl DirectPredictRequest {
    pub fn features(&self) -> FeatureVector {
        FeatureVector {
            max_temperature: self.max_temperature,
            age_days: self.age_days,
            temp_air: self.temp_air.unwrap_or(DEFAULT_AIR_TEMP),
            humidity: self.humidity.unwrap_or(DEFAULT_HUMIDITY),
            precip: self.precip.unwrap_or(DEFAULT_PRECIP),
            temp_delta_3d: self.temp_delta_3d.unwrap_or(0.0),
        }
    }
}

/// One scored sample
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    /// Database id, for stockpiles read from the database
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stockpile_id: Option<i32>,
    /// `"{yard}_{stack}"` key, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_id: Option<String>,
    pub record_date: NaiveDate,
    pub model_name: String,
    pub model_version: String,
    pub prob_event: f64,
    pub predicted: u8,
    pub risk_level: RiskLevel,
    pub horizon_days: u32,
    pub predicted_date: Option<NaiveDate>,
    pub interval_low: Option<NaiveDate>,
    pub interval_high: Option<NaiveDate>,
    pub confidence: f64,
    pub features: FeatureVector,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchError {
    pub stockpile_id: i32,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HighRiskStockpile {
    pub stockpile_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_id: Option<String>,
    pub probability: f64,
    pub risk_level: RiskLevel,
    pub predicted_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchPredictionResponse {
    pub date: NaiveDate,
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub threshold: f64,
    pub high_risk_count: usize,
    pub high_risk_stockpiles: Vec<HighRiskStockpile>,
    pub predictions: Vec<PredictionResult>,
    pub errors: Vec<BatchError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PredictionStatistics {
    pub total_predictions: usize,
    pub high_risk: usize,
    pub medium_risk: usize,
    pub low_risk: usize,
    pub predicted_fires: usize,
    pub avg_probability: f64,
}

impl PredictionStatistics {
    pub fn from_results(results: &[PredictionResult]) -> Self {
        let mut stats = Self {
            total_predictions: results.len(),
            ..Default::default()
        };
        for r in results {
            if r.risk_level.is_elevated() {
                stats.high_risk += 1;
            } else if r.risk_level == RiskLevel::Medium {
                stats.medium_risk += 1;
            } else {
                stats.low_risk += 1;
            }
            stats.predicted_fires += usize::from(r.predicted);
        }
        if !results.is_empty() {
            stats.avg_probability =
                results.iter().map(|r| r.prob_event).sum::<f64>() / results.len() as f64;
        }
        stats
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CsvPredictionResponse {
    pub success: bool,
    pub prediction_date: NaiveDate,
    pub predictions: Vec<PredictionResult>,
    pub statistics: PredictionStatistics,
    pub assembly: AssemblyReport,
    pub model_info: ModelInfo,
}

/// Prediction service
#[derive(Clone)]
pub struct PredictionService {
    db: PgPool,
    config: Arc<Config>,
    models: Arc<ModelManager>,
}

impl PredictionService {
    /// Create a new PredictionService instance
    pub fn new(db: PgPool, config: Arc<Config>, models: Arc<ModelManager>) -> Self {
        Self { db, config, models }
    }

    /// The current model, loading the configured default once if nothing
    /// is loaded yet
    pub async fn model(&self) -> AppResult<Arc<LoadedModel>> {
        if let Some(model) = self.models.current().await {
            return Ok(model);
        }
        let cfg = &self.config.model;
        match self.models.load(&cfg.default_name, &cfg.default_version).await {
            Ok(model) => Ok(model),
            Err(e) => {
                warn!(
                    model = %cfg.default_name,
                    version = %cfg.default_version,
                    error = %e,
                    "Default model unavailable"
                );
                Err(AppError::ModelNotLoaded)
            }
        }
    }

    fn horizon(&self, requested: Option<u32>) -> AppResult<u32> {
        let days = requested.unwrap_or(self.config.prediction.default_horizon_days);
        validate_horizon(days).map_err(|e| AppError::invalid("horizon_days", e))?;
        Ok(days)
    }

    /// Turn a probability into the full prediction record
    pub fn build_result(
        &self,
        model: &LoadedModel,
        features: FeatureVector,
        probability: f64,
        record_date: NaiveDate,
        horizon_days: u32,
    ) -> PredictionResult {
        let predicted = probability >= self.config.model.decision_threshold;
        let estimate = estimate_fire_date(record_date, probability, predicted, horizon_days);
        PredictionResult {
            stockpile_id: None,
            stack_id: None,
            record_date,
            model_name: model.info.model_name.clone(),
            model_version: model.info.model_version.clone(),
            prob_event: probability,
            predicted: u8::from(predicted),
            risk_level: RiskLevel::from_probability(probability, &self.config.risk.thresholds()),
            horizon_days,
            predicted_date: estimate.map(|e| e.predicted_date),
            interval_low: estimate.map(|e| e.interval_low),
            interval_high: estimate.map(|e| e.interval_high),
            confidence: probability,
            features,
        }
    }

    fn score(
        &self,
        model: &LoadedModel,
        features: FeatureVector,
        record_date: NaiveDate,
        horizon_days: u32,
    ) -> PredictionResult {
        let probability = model.classifier.predict_proba(&features);
        self.build_result(model, features, probability, record_date, horizon_days)
    }

    async fn predict_stockpile(
        &self,
        model: &LoadedModel,
        repo: &StockpileService,
        stockpile_id: i32,
        target_date: NaiveDate,
        horizon_days: u32,
    ) -> AppResult<PredictionResult> {
        let snapshot = repo.get_snapshot(stockpile_id, target_date).await?;
        let weather = match repo.get_weather_for_day(target_date).await {
            Ok(weather) => weather,
            Err(e) => {
                warn!(error = %e, date = %target_date, "Weather lookup failed, using defaults");
                Vec::new()
            }
        };

        let features = point_in_time_features(&PointInTimeInput {
            target_date,
            last_temperature: snapshot.stockpile.last_temp,
            formed_on: snapshot.formed_on(),
            history: &snapshot.temperatures,
            weather: &weather,
        });

        let mut result = self.score(model, features, target_date, horizon_days);
        result.stockpile_id = Some(stockpile_id);
        result.stack_id = snapshot.stack_id().map(|id| id.as_str().to_string());
        Ok(result)
    }

    /// Score one stockpile as of the target date
    pub async fn predict(&self, request: PredictRequest) -> AppResult<PredictionResult> {
        request.validate()?;
        let horizon_days = self.horizon(request.horizon_days)?;
        let target_date = request.target_date.unwrap_or_else(|| Utc::now().date_naive());
        let model = self.model().await?;
        let repo = StockpileService::new(self.db.clone());

        let result = self
            .predict_stockpile(&model, &repo, request.stockpile_id, target_date, horizon_days)
            .await?;

        info!(
            stockpile_id = request.stockpile_id,
            probability = result.prob_event,
            risk = %result.risk_level,
            "Prediction completed"
        );
        Ok(result)
    }

    /// Score several stockpiles; failures are reported per stockpile
    pub async fn predict_batch(&self, request: BatchPredictRequest) -> AppResult<BatchPredictionResponse> {
        request.validate()?;
        let horizon_days = self.horizon(request.horizon_days)?;
        let target_date = request.target_date.unwrap_or_else(|| Utc::now().date_naive());
        let threshold = request
            .threshold
            .unwrap_or(self.config.prediction.high_risk_threshold);
        validate_probability(threshold).map_err(|e| AppError::invalid("threshold", e))?;
        let model = self.model().await?;
        let repo = StockpileService::new(self.db.clone());

        let mut predictions = Vec::new();
        let mut errors = Vec::new();
        for &stockpile_id in &request.stockpile_ids {
            match self
                .predict_stockpile(&model, &repo, stockpile_id, target_date, horizon_days)
                .await
            {
                Ok(result) => predictions.push(result),
                Err(AppError::NotFound(_)) => errors.push(BatchError {
                    stockpile_id,
                    error: "Stockpile not found".to_string(),
                }),
                Err(e) => {
                    warn!(stockpile_id, error = %e, "Batch prediction failed for stockpile");
                    errors.push(BatchError {
                        stockpile_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        let high_risk_stockpiles: Vec<HighRiskStockpile> = predictions
            .iter()
            .filter(|p| p.prob_event >= threshold)
            .filter_map(|p| {
                Some(HighRiskStockpile {
                    stockpile_id: p.stockpile_id?,
                    stack_id: p.stack_id.clone(),
                    probability: p.prob_event,
                    risk_level: p.risk_level,
                    predicted_date: p.predicted_date,
                })
            })
            .collect();

        info!(
            total = request.stockpile_ids.len(),
            success = predictions.len(),
            failed = errors.len(),
            high_risk = high_risk_stockpiles.len(),
            "Batch prediction completed"
        );

        Ok(BatchPredictionResponse {
            date: target_date,
            total: request.stockpile_ids.len(),
            success: predictions.len(),
            failed: errors.len(),
            threshold,
            high_risk_count: high_risk_stockpiles.len(),
            high_risk_stockpiles,
            predictions,
            errors,
        })
    }

    /// Score caller-supplied feature values
    pub async fn predict_direct(&self, request: DirectPredictRequest) -> AppResult<PredictionResult> {
        request.validate()?;
        let horizon_days = self.horizon(request.horizon_days)?;
        let features = request.features();
        validate_features(&features).map_err(|(field, msg)| AppError::invalid(field, msg))?;

        let model = self.model().await?;
        let record_date = request.target_date.unwrap_or_else(|| Utc::now().date_naive());
        Ok(self.score(&model, features, record_date, horizon_days))
    }

    /// Assemble uploaded exports without labels and score every row
    pub async fn predict_csv(
        &self,
        sources: SourceTables,
        horizon_days: Option<u32>,
    ) -> AppResult<CsvPredictionResponse> {
        let horizon_days = self.horizon(horizon_days)?;
        let model = self.model().await?;

        let (table, report) = tokio::task::spawn_blocking(move || {
            assemble_dataset(&sources, AssemblyOptions::inference())
        })
        .await
        .map_err(|e| AppError::Internal(format!("Feature assembly task failed: {}", e)))??;

        let probabilities = model.classifier.predict_batch(&table.vectors());
        let predictions: Vec<PredictionResult> = table
            .rows()
            .iter()
            .zip(probabilities)
            .map(|(row, probability)| {
                let mut result =
                    self.build_result(&model, row.features(), probability, row.date, horizon_days);
                result.stack_id = Some(row.stack_id.as_str().to_string());
                result
            })
            .collect();

        let statistics = PredictionStatistics::from_results(&predictions);
        info!(
            rows = statistics.total_predictions,
            high_risk = statistics.high_risk,
            "CSV prediction completed"
        );

        Ok(CsvPredictionResponse {
            success: true,
            prediction_date: Utc::now().date_naive(),
            predictions,
            statistics,
            assembly: report,
            model_info: model.info.clone(),
        })
    }
}
