//! Date accuracy of stored predictions

use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;

use crate::classifier::{DateAccuracyMetrics, ModelManager};
use crate::error::AppResult;
use crate::services::stockpile::StockpileService;

#[derive(Debug, Clone, Serialize)]
pub struct MetricsResponse {
    pub model_name: String,
    pub model_version: String,
    #[serde(flatten)]
    pub metrics: DateAccuracyMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MetricsResponse {
    /// Zeroed metrics reported while no model is loaded
    pub fn no_model() -> Self {
        Self {
            model_name: "none".to_string(),
            model_version: "none".to_string(),
            metrics: DateAccuracyMetrics::default(),
            error: Some("No model loaded".to_string()),
        }
    }
}

#[derive(Clone)]
pub struct MetricsService {
    db: PgPool,
    models: Arc<ModelManager>,
}

impl MetricsService {
    pub fn new(db: PgPool, models: Arc<ModelManager>) -> Self {
        Self { db, models }
    }

    /// Compare predicted and actual fire dates for the current model
    pub async fn get_metrics(&self) -> AppResult<MetricsResponse> {
        let Some(info) = self.models.info().await else {
            return Ok(MetricsResponse::no_model());
        };

        let outcomes = StockpileService::new(self.db.clone())
            .predictions_with_actual_fires(Some(&info.model_name), Some(&info.model_version))
            .await?;
        let errors: Vec<Option<f64>> = outcomes.iter().map(|o| o.error_days()).collect();

        Ok(MetricsResponse {
            model_name: info.model_name,
            model_version: info.model_version,
            metrics: DateAccuracyMetrics::from_errors(&errors),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_model_response_is_zeroed() {
        let response = MetricsResponse::no_model();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["model_name"], "none");
        assert_eq!(json["mae_days"], 0.0);
        assert_eq!(json["accuracy_within_2d"], 0.0);
        assert_eq!(json["total_predictions"], 0);
    }
}
