//! Validation utilities for feature values and prediction requests
//!
//! Ranges follow what the temperature acts and the weather station can
//! physically report.

use crate::models::FeatureVector;

// ============================================================================
// Feature Ranges
// ============================================================================

/// Highest stockpile temperature a thermometric act can record, °C
pub const MAX_STOCKPILE_TEMPERATURE: f64 = 200.0;
/// Air temperature bounds, °C
pub const AIR_TEMP_RANGE: (f64, f64) = (-50.0, 50.0);
/// Prediction horizon bounds, days
pub const HORIZON_RANGE: (u32, u32) = (1, 30);

/// Validate stockpile temperature (0-200 °C)
pub fn validate_max_temperature(value: f64) -> Result<(), &'static str> {
    if !value.is_finite() {
        return Err("Max temperature must be a number");
    }
    if !(0.0..=MAX_STOCKPILE_TEMPERATURE).contains(&value) {
        return Err("Max temperature must be between 0 and 200 °C");
    }
    Ok(())
}

/// Validate stockpile age
pub fn validate_age_days(value: f64) -> Result<(), &'static str> {
    if !value.is_finite() || value < 0.0 {
        return Err("Age must be a non-negative number of days");
    }
    Ok(())
}

/// Validate air temperature (-50 to 50 °C)
pub fn validate_air_temperature(value: f64) -> Result<(), &'static str> {
    let (min, max) = AIR_TEMP_RANGE;
    if !value.is_finite() || value < min || value > max {
        return Err("Air temperature must be between -50 and 50 °C");
    }
    Ok(())
}

/// Validate relative humidity (0-100%)
pub fn validate_humidity(value: f64) -> Result<(), &'static str> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err("Humidity must be between 0 and 100%");
    }
    Ok(())
}

/// Validate precipitation total
pub fn validate_precipitation(value: f64) -> Result<(), &'static str> {
    if !value.is_finite() || value < 0.0 {
        return Err("Precipitation cannot be negative");
    }
    Ok(())
}

/// Validate a full feature vector, returning the name of the first
/// offending feature with its message
pub fn validate_features(features: &FeatureVector) -> Result<(), (&'static str, &'static str)> {
    validate_max_temperature(features.max_temperature).map_err(|e| ("max_temperature", e))?;
    validate_age_days(features.age_days).map_err(|e| ("age_days", e))?;
    validate_air_temperature(features.temp_air).map_err(|e| ("temp_air", e))?;
    validate_humidity(features.humidity).map_err(|e| ("humidity", e))?;
    validate_precipitation(features.precip).map_err(|e| ("precip", e))?;
    if !features.temp_delta_3d.is_finite() {
        return Err(("temp_delta_3d", "Temperature delta must be a number"));
    }
    Ok(())
}

// ============================================================================
// Request Validations
// ============================================================================

/// Validate prediction horizon (1-30 days)
pub fn validate_horizon(days: u32) -> Result<(), &'static str> {
    let (min, max) = HORIZON_RANGE;
    if days < min || days > max {
        return Err("Horizon must be between 1 and 30 days");
    }
    Ok(())
}

/// Validate a probability threshold
pub fn validate_probability(value: f64) -> Result<(), &'static str> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err("Probability must be between 0 and 1");
    }
    Ok(())
}

/// Validate model name (letters, digits, `_` and `-`; no path separators)
pub fn validate_model_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Model name cannot be empty");
    }
    if name.len() > 64 {
        return Err("Model name must be at most 64 characters");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err("Model name may contain only letters, digits, '_' and '-'");
    }
    Ok(())
}

/// Validate model version string (e.g. `1.0`, `2024.10.1`)
pub fn validate_model_version(version: &str) -> Result<(), &'static str> {
    if version.is_empty() {
        return Err("Model version cannot be empty");
    }
    if !version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
        || version.contains("..")
    {
        return Err("Invalid model version format");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Feature Range Tests
    // ========================================================================

    #[test]
    fn test_max_temperature_bounds() {
        assert!(validate_max_temperature(0.0).is_ok());
        assert!(validate_max_temperature(220.0).is_err());
        assert!(validate_max_temperature(200.0).is_ok());
        assert!(validate_max_temperature(-1.0).is_err());
        assert!(validate_max_temperature(f64::NAN).is_err());
    }

    #[test]
    fn test_weather_bounds() {
        assert!(validate_air_temperature(-50.0).is_ok());
        assert!(validate_air_temperature(51.0).is_err());
        assert!(validate_humidity(100.0).is_ok());
        assert!(validate_humidity(101.0).is_err());
        assert!(validate_precipitation(0.0).is_ok());
        assert!(validate_precipitation(-0.1).is_err());
    }

    #[test]
    fn test_validate_features_names_field() {
        let mut features = FeatureVector {
            max_temperature: 80.0,
            age_days: 10.0,
            temp_air: 20.0,
            humidity: 60.0,
            precip: 0.0,
            temp_delta_3d: 5.0,
        };
        assert!(validate_features(&features).is_ok());

        features.humidity = 150.0;
        let (field, _) = validate_features(&features).unwrap_err();
        assert_eq!(field, "humidity");
    }

    // ========================================================================
    // Request Validation Tests
    // ========================================================================

    #[test]
    fn test_horizon() {
        assert!(validate_horizon(1).is_ok());
        assert!(validate_horizon(30).is_ok());
        assert!(validate_horizon(0).is_err());
        assert!(validate_horizon(31).is_err());
    }

    #[test]
    fn test_model_name() {
        assert!(validate_model_name("fire_risk_model").is_ok());
        assert!(validate_model_name("").is_err());
        assert!(validate_model_name("../etc/passwd").is_err());
    }

    #[test]
    fn test_model_version() {
        assert!(validate_model_version("1.0").is_ok());
        assert!(validate_model_version("2024-10").is_ok());
        assert!(validate_model_version("1/0").is_err());
        assert!(validate_model_version("..").is_err());
    }

    #[test]
    fn test_probability() {
        assert!(validate_probability(0.5).is_ok());
        assert!(validate_probability(1.5).is_err());
    }
}
