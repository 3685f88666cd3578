//! Risk tiers and prediction outcome arithmetic

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Days on either side of a predicted fire date reported as the interval
pub const PREDICTION_INTERVAL_DAYS: i64 = 2;

/// Ordered probability bands used for operator alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Determine risk level from a fire probability
    pub fn from_probability(probability: f64, thresholds: &RiskThresholds) -> Self {
        if probability >= thresholds.critical {
            RiskLevel::Critical
        } else if probability >= thresholds.high {
            RiskLevel::High
        } else if probability >= thresholds.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn is_elevated(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
            RiskLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Configurable risk level thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskThresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            medium: 0.4,
            high: 0.6,
            critical: 0.8,
        }
    }
}

/// Expected fire date and its tolerance interval
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FireDateEstimate {
    pub predicted_date: NaiveDate,
    pub interval_low: NaiveDate,
    pub interval_high: NaiveDate,
}

/// Estimate when a predicted fire would happen.
///
/// Only positive predictions get a date; a higher probability pulls the date
/// closer, never earlier than the day after `from`. Returns `None` when the
/// date would fall past the end of the calendar.
pub fn estimate_fire_date(
    from: NaiveDate,
    probability: f64,
    predicted: bool,
    horizon_days: u32,
) -> Option<FireDateEstimate> {
    if !predicted {
        return None;
    }
    let raw = (f64::from(horizon_days) * (1.0 - probability.clamp(0.0, 1.0))).floor() as i64;
    let days_to_fire = raw.max(1);
    let predicted_date = from.checked_add_signed(Duration::days(days_to_fire))?;
    let interval = Duration::days(PREDICTION_INTERVAL_DAYS);
    Some(FireDateEstimate {
        predicted_date,
        interval_low: predicted_date.checked_sub_signed(interval).unwrap_or(NaiveDate::MIN),
        interval_high: predicted_date.checked_add_signed(interval).unwrap_or(NaiveDate::MAX),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_risk_level_from_probability() {
        let t = RiskThresholds::default();
        assert_eq!(RiskLevel::from_probability(0.1, &t), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.39, &t), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.4, &t), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(0.6, &t), RiskLevel::High);
        assert_eq!(RiskLevel::from_probability(0.79, &t), RiskLevel::High);
        assert_eq!(RiskLevel::from_probability(0.8, &t), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_probability(1.0, &t), RiskLevel::Critical);
    }

    #[test]
    fn test_risk_level_serializes_upper_case() {
        assert_eq!(serde_json::to_string(&RiskLevel::Critical).unwrap(), "\"CRITICAL\"");
        assert_eq!(RiskLevel::Medium.to_string(), "MEDIUM");
        assert!(RiskLevel::High.is_elevated());
        assert!(!RiskLevel::Medium.is_elevated());
    }

    #[test]
    fn test_estimate_fire_date_negative_prediction() {
        assert!(estimate_fire_date(date(2020, 8, 1), 0.3, false, 7).is_none());
    }

    #[test]
    fn test_estimate_fire_date_scales_with_probability() {
        // 7 * (1 - 0.5) = 3.5 -> 3 days
        let est = estimate_fire_date(date(2020, 8, 1), 0.5, true, 7).unwrap();
        assert_eq!(est.predicted_date, date(2020, 8, 4));
        assert_eq!(est.interval_low, date(2020, 8, 2));
        assert_eq!(est.interval_high, date(2020, 8, 6));
    }

    #[test]
    fn test_estimate_fire_date_at_least_one_day() {
        let est = estimate_fire_date(date(2020, 8, 1), 0.99, true, 7).unwrap();
        assert_eq!(est.predicted_date, date(2020, 8, 2));
    }
}
