//! Feature-engineering pipeline
//!
//! Turns the four raw sources (fires, supplies, temperature acts, weather
//! observations) into one feature row per stockpile per temperature act:
//!
//! 1. [`normalize`] reads raw tables, resolves header variants and parses
//!    dates coercively (bad rows are dropped, not fatal)
//! 2. [`identity`] derives the `"{yard}_{stack}"` join key
//! 3. [`temporal`] computes stockpile age, daily weather and the 3-step
//!    temperature delta
//! 4. [`labeling`] marks acts within ±2 days of a fire of the same stockpile
//! 5. [`assemble`] runs the steps in order and applies the fill policy
//!
//! Everything here is synchronous and free of shared state.

pub mod assemble;
pub mod identity;
pub mod labeling;
pub mod normalize;
pub mod raw;
pub mod table;
pub mod temporal;

use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub use assemble::{
    assemble_dataset, assemble_records, fill_forward_backward, AssemblyMode, AssemblyOptions,
    AssemblyReport, SourceTables, WeatherInput,
};
pub use identity::resolve_identity;
pub use labeling::{label_records, FireIndex, FIRE_WINDOW_DAYS};
pub use normalize::{
    normalize_fires, normalize_supplies, normalize_temperature, normalize_weather, parse_date,
    parse_datetime, Normalized,
};
pub use raw::RawTable;
pub use table::FeatureTable;
pub use temporal::{
    aggregate_daily_weather, point_in_time_features, DeltaMode, PointInTimeInput, StockStart,
    TemperaturePoint,
};

/// Which of the four inputs a record or failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Fires,
    Supplies,
    Temperature,
    Weather,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Fires => "fires",
            SourceKind::Supplies => "supplies",
            SourceKind::Temperature => "temperature",
            SourceKind::Weather => "weather",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage, reported with failures so operators can tell a bad
/// export from a bad transformation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Read,
    Normalize,
    Assemble,
    Emit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Read => "read",
            Stage::Normalize => "normalize",
            Stage::Assemble => "assemble",
            Stage::Emit => "emit",
        };
        f.write_str(name)
    }
}

/// Fatal pipeline failures. Single malformed rows never surface here; they
/// are dropped and counted in [`AssemblyReport`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{source_kind} table is empty after date filtering")]
    EmptySource { source_kind: SourceKind },

    #[error("{source_kind} table has no '{column}' column")]
    MissingColumn {
        source_kind: SourceKind,
        column: &'static str,
    },

    #[error("failed to read {source_kind} table: {source}")]
    Csv {
        source_kind: SourceKind,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write feature table: {0}")]
    Emit(#[source] csv::Error),

    #[error("failed to read feature table: {0}")]
    Load(#[source] csv::Error),

    #[error("failed to flush feature table: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// The input that caused the failure, when there is one
    pub fn source_kind(&self) -> Option<SourceKind> {
        match self {
            PipelineError::EmptySource { source_kind }
            | PipelineError::MissingColumn { source_kind, .. }
            | PipelineError::Csv { source_kind, .. } => Some(*source_kind),
            PipelineError::Emit(_) | PipelineError::Load(_) | PipelineError::Io(_) => None,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Csv { .. } | PipelineError::Load(_) => Stage::Read,
            PipelineError::MissingColumn { .. } => Stage::Normalize,
            PipelineError::EmptySource { .. } => Stage::Assemble,
            PipelineError::Emit(_) | PipelineError::Io(_) => Stage::Emit,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names_source_and_stage() {
        let err = PipelineError::EmptySource {
            source_kind: SourceKind::Supplies,
        };
        assert_eq!(err.to_string(), "supplies table is empty after date filtering");
        assert_eq!(err.source_kind(), Some(SourceKind::Supplies));
        assert_eq!(err.stage(), Stage::Assemble);

        let err = PipelineError::MissingColumn {
            source_kind: SourceKind::Temperature,
            column: "max_temperature",
        };
        assert_eq!(err.stage(), Stage::Normalize);
        assert!(err.to_string().contains("temperature"));
    }
}
