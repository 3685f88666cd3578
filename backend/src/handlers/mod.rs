//! HTTP request handlers

pub mod health;
pub mod metrics;
pub mod model;
pub mod prediction;
pub mod upload;

pub use health::health_check;
pub use metrics::get_metrics;
pub use model::{get_model_info, load_model, train_model, unload_model};
pub use prediction::{predict, predict_batch, predict_csv, predict_direct, validate_csv};
