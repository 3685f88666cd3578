//! Business logic services for the Coal Fire Risk service

pub mod metrics;
pub mod prediction;
pub mod stockpile;
pub mod training;
pub mod validation;

pub use metrics::MetricsService;
pub use prediction::PredictionService;
pub use stockpile::StockpileService;
pub use training::TrainingService;
pub use validation::ValidationService;
