//! Feature rows handed to the classifier

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::StockpileId;

/// Air temperature used when weather data carries no value
pub const DEFAULT_AIR_TEMP: f64 = 20.0;
/// Relative humidity used when weather data carries no value
pub const DEFAULT_HUMIDITY: f64 = 60.0;
/// Precipitation used when weather data carries no value
pub const DEFAULT_PRECIP: f64 = 0.0;

/// Number of model inputs
pub const FEATURE_COUNT: usize = 6;

/// Model input names, in vector order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "max_temperature",
    "age_days",
    "temp_air",
    "humidity",
    "precip",
    "temp_delta_3d",
];

/// The six model inputs in fixed order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector {
    pub max_temperature: f64,
    pub age_days: f64,
    pub temp_air: f64,
    pub humidity: f64,
    pub precip: f64,
    pub temp_delta_3d: f64,
}

impl FeatureVector {
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.max_temperature,
            self.age_days,
            self.temp_air,
            self.humidity,
            self.precip,
            self.temp_delta_3d,
        ]
    }

    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
        let [max_temperature, age_days, temp_air, humidity, precip, temp_delta_3d] = values;
        Self {
            max_temperature,
            age_days,
            temp_air,
            humidity,
            precip,
            temp_delta_3d,
        }
    }

    /// True when every value is a finite number
    pub fn is_complete(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

/// One assembled sample: a temperature act with its derived features
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureRow {
    pub stack_id: StockpileId,
    pub yard: String,
    pub stack: String,
    pub date: NaiveDate,
    pub max_temperature: f64,
    pub age_days: f64,
    pub temp_air: f64,
    pub humidity: f64,
    pub precip: f64,
    pub temp_delta_3d: f64,
    /// Fire label, present only for training tables
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target: Option<u8>,
}

impl FeatureRow {
    pub fn features(&self) -> FeatureVector {
        FeatureVector {
            max_temperature: self.max_temperature,
            age_days: self.age_days,
            temp_air: self.temp_air,
            humidity: self.humidity,
            precip: self.precip,
            temp_delta_3d: self.temp_delta_3d,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_vector_array_order_matches_names() {
        let v = FeatureVector {
            max_temperature: 1.0,
            age_days: 2.0,
            temp_air: 3.0,
            humidity: 4.0,
            precip: 5.0,
            temp_delta_3d: 6.0,
        };
        assert_eq!(v.to_array(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(FeatureVector::from_array(v.to_array()), v);
        assert_eq!(FEATURE_NAMES[5], "temp_delta_3d");
    }

    #[test]
    fn test_feature_vector_completeness() {
        let mut v = FeatureVector::from_array([0.0; FEATURE_COUNT]);
        assert!(v.is_complete());
        v.humidity = f64::NAN;
        assert!(!v.is_complete());
    }
}
