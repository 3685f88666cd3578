//! Scores the current model against labeled exports

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use shared::pipeline::{assemble_dataset, AssemblyOptions, AssemblyReport, SourceTables};
use tracing::info;

use crate::classifier::{ClassificationMetrics, ModelInfo};
use crate::error::{AppError, AppResult};
use crate::services::PredictionService;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProbabilitySummary {
    pub positive: usize,
    pub negative: usize,
    pub avg_probability: f64,
    pub min_probability: f64,
    pub max_probability: f64,
}

impl ProbabilitySummary {
    pub fn new(probabilities: &[f64], threshold: f64) -> Self {
        if probabilities.is_empty() {
            return Self::default();
        }
        let positive = probabilities.iter().filter(|&&p| p >= threshold).count();
        Self {
            positive,
            negative: probabilities.len() - positive,
            avg_probability: probabilities.iter().sum::<f64>() / probabilities.len() as f64,
            min_probability: probabilities.iter().copied().fold(f64::INFINITY, f64::min),
            max_probability: probabilities.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub success: bool,
    pub validation_date: NaiveDate,
    pub total_samples: usize,
    pub actual_positive: usize,
    pub threshold: f64,
    pub metrics: ClassificationMetrics,
    pub predictions: ProbabilitySummary,
    pub assembly: AssemblyReport,
    pub model_info: ModelInfo,
}

/// Model validation service
#[derive(Clone)]
pub struct ValidationService {
    predictions: PredictionService,
    threshold: f64,
}

impl ValidationService {
    /// Create a new ValidationService instance
    pub fn new(predictions: PredictionService, threshold: f64) -> Self {
        Self {
            predictions,
            threshold,
        }
    }

    /// Assemble labeled rows from the exports and compare the model's
    /// decisions with the labels
    pub async fn validate(&self, sources: SourceTables) -> AppResult<ValidationReport> {
        let model = self.predictions.model().await?;

        let (table, report) = tokio::task::spawn_blocking(move || {
            assemble_dataset(&sources, AssemblyOptions::training())
        })
        .await
        .map_err(|e| AppError::Internal(format!("Feature assembly task failed: {}", e)))??;

        let labels = match table.targets() {
            Some(labels) if !labels.is_empty() => labels,
            _ => {
                return Err(AppError::ValidationError(
                    "Uploaded data produced no labeled rows".to_string(),
                ))
            }
        };

        let probabilities = model.classifier.predict_batch(&table.vectors());
        let metrics =
            ClassificationMetrics::from_probabilities(&labels, &probabilities, self.threshold);

        info!(
            samples = labels.len(),
            accuracy = metrics.accuracy,
            f1 = metrics.f1_score,
            "Model validation completed"
        );

        Ok(ValidationReport {
            success: true,
            validation_date: Utc::now().date_naive(),
            total_samples: labels.len(),
            actual_positive: labels.iter().filter(|&&y| y == 1).count(),
            threshold: self.threshold,
            metrics,
            predictions: ProbabilitySummary::new(&probabilities, self.threshold),
            assembly: report,
            model_info: model.info.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probability_summary() {
        let summary = ProbabilitySummary::new(&[0.1, 0.5, 0.9, 0.3], 0.5);
        assert_eq!(summary.positive, 2);
        assert_eq!(summary.negative, 2);
        assert_eq!(summary.min_probability, 0.1);
        assert_eq!(summary.max_probability, 0.9);
        assert!((summary.avg_probability - 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_probability_summary_empty() {
        assert_eq!(ProbabilitySummary::new(&[], 0.5), ProbabilitySummary::default());
    }
}
