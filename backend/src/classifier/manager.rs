//! Model files on disk and the currently served model

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{BoostingParams, ClassificationMetrics, GradientBoostedTrees, RiskClassifier};
use crate::error::{AppError, AppResult};

/// Sidecar written next to a model file by the trainer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_name: String,
    pub model_version: String,
    pub saved_at: DateTime<Utc>,
    pub hyperparams: BoostingParams,
    pub train_metrics: Option<ClassificationMetrics>,
    pub test_metrics: Option<ClassificationMetrics>,
    pub feature_importance: Vec<(String, f64)>,
    pub train_samples: usize,
    pub test_samples: usize,
    pub positive_samples: usize,
}

/// What is known about a loaded model
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub model_version: String,
    pub model_path: String,
    pub file_size: u64,
    pub loaded_at: DateTime<Utc>,
    pub n_trees: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ModelMetadata>,
}

pub struct LoadedModel {
    pub info: ModelInfo,
    pub classifier: Arc<dyn RiskClassifier>,
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel").field("info", &self.info).finish()
    }
}

/// Holds the served model. Readers take a cheap `Arc` clone and release
/// the lock before scoring.
#[derive(Debug)]
pub struct ModelManager {
    dir: PathBuf,
    current: RwLock<Option<Arc<LoadedModel>>>,
}

impl ModelManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: RwLock::new(None),
        }
    }

    /// `{dir}/{name}_v{version}.json`
    pub fn model_path(&self, name: &str, version: &str) -> PathBuf {
        self.dir.join(format!("{}_v{}.json", name, version))
    }

    /// `{dir}/{name}_v{version}_info.json`
    pub fn metadata_path(&self, name: &str, version: &str) -> PathBuf {
        self.dir.join(format!("{}_v{}_info.json", name, version))
    }

    fn candidates(&self, name: &str, version: &str) -> [PathBuf; 2] {
        [
            self.model_path(name, version),
            self.dir.join(format!("{}.json", name)),
        ]
    }

    /// Load a model from disk and make it current
    pub async fn load(&self, name: &str, version: &str) -> AppResult<Arc<LoadedModel>> {
        let mut found = None;
        for path in self.candidates(name, version) {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                found = Some(path);
                break;
            }
        }
        let path = found.ok_or_else(|| AppError::ModelNotFound {
            name: name.to_string(),
            version: version.to_string(),
        })?;

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read {}: {}", path.display(), e)))?;
        let model = GradientBoostedTrees::from_json(&bytes)
            .map_err(|e| AppError::Internal(format!("Invalid model file {}: {}", path.display(), e)))?;

        let metadata = match tokio::fs::read(self.metadata_path(name, version)).await {
            Ok(raw) => match serde_json::from_slice::<ModelMetadata>(&raw) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring unreadable model metadata");
                    None
                }
            },
            Err(_) => None,
        };

        let loaded = Arc::new(LoadedModel {
            info: ModelInfo {
                model_name: name.to_string(),
                model_version: version.to_string(),
                model_path: path.display().to_string(),
                file_size: bytes.len() as u64,
                loaded_at: Utc::now(),
                n_trees: model.n_trees(),
                metadata,
            },
            classifier: Arc::new(model),
        });

        *self.current.write().await = Some(loaded.clone());
        tracing::info!(
            model = name,
            version,
            path = %path.display(),
            "Model loaded"
        );
        Ok(loaded)
    }

    /// Write a model and its sidecar. Returns the model path and size.
    pub async fn save(
        &self,
        model: &GradientBoostedTrees,
        metadata: &ModelMetadata,
    ) -> AppResult<(PathBuf, u64)> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create model dir: {}", e)))?;

        let path = self.model_path(&metadata.model_name, &metadata.model_version);
        let bytes = model
            .to_json()
            .map_err(|e| AppError::Internal(format!("Failed to serialize model: {}", e)))?;
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write {}: {}", path.display(), e)))?;

        let meta_bytes = serde_json::to_vec_pretty(metadata)
            .map_err(|e| AppError::Internal(format!("Failed to serialize metadata: {}", e)))?;
        let meta_path = self.metadata_path(&metadata.model_name, &metadata.model_version);
        tokio::fs::write(&meta_path, meta_bytes)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write {}: {}", meta_path.display(), e)))?;

        tracing::info!(path = %path.display(), size = bytes.len(), "Model saved");
        Ok((path, bytes.len() as u64))
    }

    /// Drop the current model, returning it
    pub async fn unload(&self) -> Option<Arc<LoadedModel>> {
        let previous = self.current.write().await.take();
        if let Some(model) = &previous {
            tracing::info!(model = %model.info.model_name, "Model unloaded");
        }
        previous
    }

    pub async fn current(&self) -> Option<Arc<LoadedModel>> {
        self.current.read().await.clone()
    }

    pub async fn info(&self) -> Option<ModelInfo> {
        self.current().await.map(|m| m.info.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{FeatureVector, FEATURE_COUNT};

    fn tiny_model() -> GradientBoostedTrees {
        let x: Vec<[f64; FEATURE_COUNT]> = (0..20)
            .map(|i| [(if i < 10 { 30.0 } else { 180.0 }) + i as f64, 1.0, 20.0, 60.0, 0.0, 0.0])
            .collect();
        let y: Vec<u8> = (0..20).map(|i| u8::from(i >= 10)).collect();
        let params = BoostingParams {
            n_estimators: 5,
            max_depth: 2,
            ..Default::default()
        };
        GradientBoostedTrees::fit(&x, &y, &params).unwrap()
    }

    fn metadata(name: &str, version: &str) -> ModelMetadata {
        ModelMetadata {
            model_name: name.to_string(),
            model_version: version.to_string(),
            saved_at: Utc::now(),
            hyperparams: BoostingParams::default(),
            train_metrics: None,
            test_metrics: None,
            feature_importance: vec![],
            train_samples: 16,
            test_samples: 4,
            positive_samples: 10,
        }
    }

    #[tokio::test]
    async fn test_save_load_unload() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(dir.path());
        let model = tiny_model();

        let (path, size) = manager.save(&model, &metadata("fire", "2.0")).await.unwrap();
        assert!(path.ends_with("fire_v2.0.json"));
        assert!(size > 0);
        assert!(manager.metadata_path("fire", "2.0").exists());

        let loaded = manager.load("fire", "2.0").await.unwrap();
        assert_eq!(loaded.info.model_version, "2.0");
        assert_eq!(loaded.info.metadata.as_ref().map(|m| m.train_samples), Some(16));

        let hot = FeatureVector::from_array([190.0, 1.0, 20.0, 60.0, 0.0, 0.0]);
        assert_eq!(loaded.classifier.predict_proba(&hot), model.predict_proba(&hot));

        assert!(manager.current().await.is_some());
        assert!(manager.unload().await.is_some());
        assert!(manager.info().await.is_none());
    }

    #[tokio::test]
    async fn test_load_falls_back_to_bare_name() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(dir.path());
        std::fs::write(dir.path().join("legacy.json"), tiny_model().to_json().unwrap()).unwrap();

        let loaded = manager.load("legacy", "1.0.0").await.unwrap();
        assert!(loaded.info.model_path.ends_with("legacy.json"));
        assert!(loaded.info.metadata.is_none());
    }

    #[tokio::test]
    async fn test_missing_model_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(dir.path());
        let err = manager.load("absent", "1.0").await.unwrap_err();
        assert!(matches!(err, AppError::ModelNotFound { .. }));
        assert!(manager.current().await.is_none());
    }
}
