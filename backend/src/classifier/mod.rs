//! Fire-risk classifiers and model lifecycle

pub mod evaluation;
pub mod gbt;
pub mod manager;

use shared::models::FeatureVector;

pub use evaluation::{ClassificationMetrics, DateAccuracyMetrics};
pub use gbt::{BoostingParams, GradientBoostedTrees};
pub use manager::{LoadedModel, ModelInfo, ModelManager, ModelMetadata};

/// Anything that turns the six-value feature vector into a fire probability
pub trait RiskClassifier: Send + Sync {
    /// Probability of a fire, in `[0, 1]`
    fn predict_proba(&self, features: &FeatureVector) -> f64;

    fn predict_batch(&self, features: &[FeatureVector]) -> Vec<f64> {
        features.iter().map(|f| self.predict_proba(f)).collect()
    }

    /// Relative importance per feature name
    fn feature_importance(&self) -> Vec<(String, f64)>;
}
