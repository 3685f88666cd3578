//! Offline training: assemble a labeled dataset from exports on disk, fit
//! the boosted trees, evaluate on a stratified hold-out and publish the
//! model.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use shared::models::FEATURE_COUNT;
use shared::pipeline::{
    assemble_dataset, AssemblyOptions, AssemblyReport, FeatureTable, PipelineError, RawTable,
    SourceKind, SourceTables, WeatherInput,
};
use shared::validation::{validate_model_name, validate_model_version};
use tokio::sync::Mutex;
use tracing::{info, warn};
use validator::{Validate, ValidationError};

use crate::classifier::{
    BoostingParams, ClassificationMetrics, GradientBoostedTrees, ModelManager, ModelMetadata,
    RiskClassifier,
};
use crate::config::Config;
use crate::error::{AppError, AppResult};

pub const FIRES_FILE: &str = "fires.csv";
pub const SUPPLIES_FILE: &str = "supplies.csv";
pub const TEMPERATURE_FILE: &str = "temperature.csv";
/// Weather exports come split by period: `weather_data_2019.csv`, ...
pub const WEATHER_PREFIX: &str = "weather_data_";

fn check_model_name(name: &str) -> Result<(), ValidationError> {
    validate_model_name(name).map_err(|msg| {
        let mut err = ValidationError::new("model_name");
        err.message = Some(msg.into());
        err
    })
}

fn check_model_version(version: &str) -> Result<(), ValidationError> {
    validate_model_version(version).map_err(|msg| {
        let mut err = ValidationError::new("model_version");
        err.message = Some(msg.into());
        err
    })
}

/// Hyperparameter overrides; anything absent comes from configuration
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct TrainingOverrides {
    #[validate(range(min = 1, max = 5000))]
    pub n_estimators: Option<u32>,
    #[validate(range(min = 1, max = 16))]
    pub max_depth: Option<u32>,
    #[validate(range(min = 0.001, max = 1.0))]
    pub learning_rate: Option<f64>,
    #[validate(range(min = 0.0))]
    pub lambda: Option<f64>,
    #[validate(range(min = 0.0))]
    pub min_child_weight: Option<f64>,
    #[validate(range(min = 0.0))]
    pub gamma: Option<f64>,
    #[validate(range(min = 0.0))]
    pub scale_pos_weight: Option<f64>,
    #[validate(range(min = 0.0, max = 0.9))]
    pub test_fraction: Option<f64>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TrainRequest {
    #[validate(custom = "check_model_name")]
    pub model_name: String,
    #[validate(custom = "check_model_version")]
    pub model_version: String,
    #[serde(default)]
    #[validate]
    pub config: TrainingOverrides,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingMeta {
    pub total_samples: usize,
    pub train_samples: usize,
    pub test_samples: usize,
    pub positive_samples: usize,
    pub seed: u64,
    pub test_fraction: f64,
    pub training_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainResponse {
    pub success: bool,
    pub model_name: String,
    pub model_version: String,
    pub model_path: String,
    pub file_size: u64,
    pub hyperparams: BoostingParams,
    pub train_metrics: ClassificationMetrics,
    pub test_metrics: Option<ClassificationMetrics>,
    pub feature_importance: Vec<(String, f64)>,
    pub meta: TrainingMeta,
    pub assembly: AssemblyReport,
}

/// A finished run, with the dataset it was fitted on
#[derive(Debug)]
pub struct TrainingRun {
    pub response: TrainResponse,
    pub features: FeatureTable,
}

/// Read the four exports from a data directory. Weather is optional; all
/// `weather_data_*.csv` files are stacked in name order.
pub fn load_sources(dir: &Path) -> AppResult<SourceTables> {
    let fires = RawTable::from_path(SourceKind::Fires, &dir.join(FIRES_FILE))?;
    let supplies = RawTable::from_path(SourceKind::Supplies, &dir.join(SUPPLIES_FILE))?;
    let temperature = RawTable::from_path(SourceKind::Temperature, &dir.join(TEMPERATURE_FILE))?;

    let mut weather_files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| AppError::Internal(format!("Failed to list {}: {}", dir.display(), e)))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(WEATHER_PREFIX) && n.ends_with(".csv"))
                .unwrap_or(false)
        })
        .collect();
    weather_files.sort();

    let weather = if weather_files.is_empty() {
        warn!(dir = %dir.display(), "No weather exports found, using defaults");
        WeatherInput::Unavailable
    } else {
        let tables = weather_files
            .iter()
            .map(|path| RawTable::from_path(SourceKind::Weather, path))
            .collect::<Result<Vec<_>, PipelineError>>()?;
        WeatherInput::Table(RawTable::concat(tables))
    };

    Ok(SourceTables {
        fires,
        supplies,
        temperature,
        weather,
    })
}

/// Split sample indices into train and test, keeping the class ratio.
/// Each class contributes `round(n * test_fraction)` test samples, but
/// always keeps at least one training sample.
pub fn stratified_split(labels: &[u8], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for class in [0u8, 1u8] {
        let mut idx: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &y)| y == class)
            .map(|(i, _)| i)
            .collect();
        idx.shuffle(&mut rng);
        let n_test = ((idx.len() as f64 * test_fraction).round() as usize)
            .min(idx.len().saturating_sub(1));
        test.extend_from_slice(&idx[..n_test]);
        train.extend_from_slice(&idx[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

struct FitOutcome {
    model: GradientBoostedTrees,
    train_metrics: ClassificationMetrics,
    test_metrics: Option<ClassificationMetrics>,
    train_samples: usize,
    test_samples: usize,
}

fn fit_and_evaluate(
    table: &FeatureTable,
    mut params: BoostingParams,
    test_fraction: f64,
    seed: u64,
    threshold: f64,
) -> AppResult<FitOutcome> {
    let labels = table
        .targets()
        .ok_or_else(|| AppError::Training("Dataset has no target column".to_string()))?;
    let x: Vec<[f64; FEATURE_COUNT]> = table.vectors().iter().map(|v| v.to_array()).collect();

    let (train_idx, test_idx) = stratified_split(&labels, test_fraction, seed);
    let pick = |idx: &[usize]| -> (Vec<[f64; FEATURE_COUNT]>, Vec<u8>) {
        (idx.iter().map(|&i| x[i]).collect(), idx.iter().map(|&i| labels[i]).collect())
    };
    let (x_train, y_train) = pick(&train_idx);
    let (x_test, y_test) = pick(&test_idx);

    if params.scale_pos_weight.is_none() {
        let positives = y_train.iter().filter(|&&y| y == 1).count();
        let negatives = y_train.len() - positives;
        if positives > 0 {
            params.scale_pos_weight = Some(negatives as f64 / positives as f64);
        }
    }

    let model = GradientBoostedTrees::fit(&x_train, &y_train, &params)
        .map_err(|e| AppError::Training(e.to_string()))?;

    let score = |xs: &[[f64; FEATURE_COUNT]], ys: &[u8]| {
        let probs: Vec<f64> = xs
            .iter()
            .map(|row| model.predict_proba(&shared::models::FeatureVector::from_array(*row)))
            .collect();
        ClassificationMetrics::from_probabilities(ys, &probs, threshold)
    };
    let train_metrics = score(&x_train, &y_train);
    let test_metrics = (!x_test.is_empty()).then(|| score(&x_test, &y_test));

    Ok(FitOutcome {
        train_metrics,
        test_metrics,
        train_samples: x_train.len(),
        test_samples: x_test.len(),
        model,
    })
}

/// Training service. One run at a time; a second request waits for the
/// first to finish.
#[derive(Clone)]
pub struct TrainingService {
    config: Arc<Config>,
    models: Arc<ModelManager>,
    lock: Arc<Mutex<()>>,
}

impl TrainingService {
    /// Create a new TrainingService instance
    pub fn new(config: Arc<Config>, models: Arc<ModelManager>, lock: Arc<Mutex<()>>) -> Self {
        Self {
            config,
            models,
            lock,
        }
    }

    /// Train from the configured data directory
    pub async fn train_from_dir(&self, dir: Option<&Path>, request: TrainRequest) -> AppResult<TrainingRun> {
        let dir = dir.unwrap_or(&self.config.training.data_dir).to_path_buf();
        let sources = tokio::task::spawn_blocking(move || load_sources(&dir))
            .await
            .map_err(|e| AppError::Internal(format!("Loading training data failed: {}", e)))??;
        self.train(sources, request).await
    }

    /// Assemble, fit, evaluate, save and load a model
    pub async fn train(&self, sources: SourceTables, request: TrainRequest) -> AppResult<TrainingRun> {
        request.validate()?;
        let _guard = self.lock.lock().await;
        let started = Instant::now();

        let overrides = &request.config;
        let defaults = &self.config.training;
        let params = BoostingParams {
            n_estimators: overrides
                .n_estimators
                .map(|n| n as usize)
                .unwrap_or(defaults.params.n_estimators),
            max_depth: overrides
                .max_depth
                .map(|d| d as usize)
                .unwrap_or(defaults.params.max_depth),
            learning_rate: overrides.learning_rate.unwrap_or(defaults.params.learning_rate),
            lambda: overrides.lambda.unwrap_or(defaults.params.lambda),
            min_child_weight: overrides
                .min_child_weight
                .unwrap_or(defaults.params.min_child_weight),
            gamma: overrides.gamma.unwrap_or(defaults.params.gamma),
            scale_pos_weight: overrides.scale_pos_weight.or(defaults.params.scale_pos_weight),
        };
        let test_fraction = overrides.test_fraction.unwrap_or(defaults.test_fraction);
        let seed = overrides.seed.unwrap_or(defaults.seed);
        let threshold = self.config.model.decision_threshold;

        info!(
            model = %request.model_name,
            version = %request.model_version,
            n_estimators = params.n_estimators,
            max_depth = params.max_depth,
            "Training started"
        );

        let (table, report, outcome) = tokio::task::spawn_blocking(move || -> AppResult<_> {
            let (table, report) = assemble_dataset(&sources, AssemblyOptions::training())?;
            if table.is_empty() {
                return Err(AppError::Training("Assembled dataset has no rows".to_string()));
            }
            let outcome = fit_and_evaluate(&table, params, test_fraction, seed, threshold)?;
            Ok((table, report, outcome))
        })
        .await
        .map_err(|e| AppError::Internal(format!("Training task failed: {}", e)))??;

        let feature_importance = outcome.model.feature_importance();
        let metadata = ModelMetadata {
            model_name: request.model_name.clone(),
            model_version: request.model_version.clone(),
            saved_at: Utc::now(),
            hyperparams: outcome.model.params().clone(),
            train_metrics: Some(outcome.train_metrics),
            test_metrics: outcome.test_metrics,
            feature_importance: feature_importance.clone(),
            train_samples: outcome.train_samples,
            test_samples: outcome.test_samples,
            positive_samples: table.positives(),
        };

        let (path, file_size) = self.models.save(&outcome.model, &metadata).await?;
        self.models
            .load(&request.model_name, &request.model_version)
            .await?;

        let training_seconds = started.elapsed().as_secs_f64();
        info!(
            model = %request.model_name,
            version = %request.model_version,
            rows = table.len(),
            positives = table.positives(),
            f1 = outcome.test_metrics.map(|m| m.f1_score).unwrap_or(outcome.train_metrics.f1_score),
            seconds = training_seconds,
            "Training completed"
        );

        Ok(TrainingRun {
            response: TrainResponse {
                success: true,
                model_name: request.model_name,
                model_version: request.model_version,
                model_path: path.display().to_string(),
                file_size,
                hyperparams: metadata.hyperparams,
                train_metrics: outcome.train_metrics,
                test_metrics: outcome.test_metrics,
                feature_importance,
                meta: TrainingMeta {
                    total_samples: table.len(),
                    train_samples: outcome.train_samples,
                    test_samples: outcome.test_samples,
                    positive_samples: table.positives(),
                    seed,
                    test_fraction,
                    training_seconds,
                },
                assembly: report,
            },
            features: table,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_stratified_split_keeps_ratio() {
        let labels: Vec<u8> = (0..100).map(|i| u8::from(i % 5 == 0)).collect();
        let (train, test) = stratified_split(&labels, 0.2, 42);
        assert_eq!(train.len() + test.len(), 100);
        assert_eq!(test.len(), 20);
        let test_pos = test.iter().filter(|&&i| labels[i] == 1).count();
        assert_eq!(test_pos, 4);
    }

    #[test]
    fn test_stratified_split_is_seeded() {
        let labels: Vec<u8> = (0..50).map(|i| u8::from(i % 3 == 0)).collect();
        assert_eq!(stratified_split(&labels, 0.2, 7), stratified_split(&labels, 0.2, 7));
    }

    #[test]
    fn test_single_sample_class_stays_in_train() {
        let labels = [0, 0, 0, 0, 1];
        let (train, test) = stratified_split(&labels, 0.5, 1);
        assert!(train.contains(&4));
        assert!(!test.contains(&4));
    }

    #[test]
    fn test_train_request_rejects_bad_name() {
        let request: TrainRequest =
            serde_json::from_str(r#"{"model_name": "../etc", "model_version": "1.0"}"#).unwrap();
        assert!(request.validate().is_err());

        let ok: TrainRequest =
            serde_json::from_str(r#"{"model_name": "coal_fire_model", "model_version": "1.0.0"}"#).unwrap();
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_load_sources_without_weather() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FIRES_FILE), "yard,stack,fire_date\n6,4,2020-08-05\n").unwrap();
        std::fs::write(
            dir.path().join(SUPPLIES_FILE),
            "yard,stack,arrival_date\n6,4,2020-07-01\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join(TEMPERATURE_FILE),
            "yard,stack,date,max_temperature\n6,4,2020-08-04,80\n",
        )
        .unwrap();

        let sources = load_sources(dir.path()).unwrap();
        assert_eq!(sources.weather, WeatherInput::Unavailable);
        assert_eq!(sources.fires.len(), 1);
    }

    #[test]
    fn test_load_sources_stacks_weather_files() {
        let dir = tempfile::tempdir().unwrap();
        for (name, body) in [
            (FIRES_FILE, "yard,stack,fire_date\n6,4,2020-08-05\n"),
            (SUPPLIES_FILE, "yard,stack,arrival_date\n6,4,2020-07-01\n"),
            (TEMPERATURE_FILE, "yard,stack,date,max_temperature\n6,4,2020-08-04,80\n"),
            ("weather_data_2019.csv", "date,t\n2019-12-31 12:00,1.0\n"),
            ("weather_data_2020.csv", "date,t\n2020-08-04 12:00,25.0\n"),
        ] {
            std::fs::write(dir.path().join(name), body).unwrap();
        }

        let sources = load_sources(dir.path()).unwrap();
        match sources.weather {
            WeatherInput::Table(table) => assert_eq!(table.len(), 2),
            WeatherInput::Unavailable => panic!("weather should be loaded"),
        }
    }

    proptest! {
        #[test]
        fn prop_split_partitions_indices(labels in proptest::collection::vec(0u8..2, 1..200), seed in any::<u64>()) {
            let (train, test) = stratified_split(&labels, 0.2, seed);
            let mut all: Vec<usize> = train.iter().chain(test.iter()).copied().collect();
            all.sort_unstable();
            prop_assert_eq!(all, (0..labels.len()).collect::<Vec<_>>());
        }
    }
}
