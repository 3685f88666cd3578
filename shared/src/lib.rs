//! Shared types, models and the feature pipeline for the Coal Fire Risk
//! platform
//!
//! This crate holds everything that does not need a runtime: source records,
//! the dataset assembler that turns raw exports into feature tables, and
//! risk classification helpers used by the backend.

pub mod models;
pub mod pipeline;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
