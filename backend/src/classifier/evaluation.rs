//! Model quality metrics

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    pub fn from_labels(actual: &[u8], predicted: &[u8]) -> Self {
        let mut m = Self::default();
        for (&a, &p) in actual.iter().zip(predicted) {
            match (a, p) {
                (1, 1) => m.true_positive += 1,
                (1, _) => m.false_negative += 1,
                (_, 1) => m.false_positive += 1,
                _ => m.true_negative += 1,
            }
        }
        m
    }

    pub fn total(&self) -> usize {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }
}

/// Binary classification metrics. Undefined ratios (no predicted or no
/// actual positives) are reported as 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub confusion_matrix: ConfusionMatrix,
    pub samples: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl ClassificationMetrics {
    pub fn from_labels(actual: &[u8], predicted: &[u8]) -> Self {
        let cm = ConfusionMatrix::from_labels(actual, predicted);
        let precision = ratio(cm.true_positive, cm.true_positive + cm.false_positive);
        let recall = ratio(cm.true_positive, cm.true_positive + cm.false_negative);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            accuracy: ratio(cm.true_positive + cm.true_negative, cm.total()),
            precision,
            recall,
            f1_score,
            confusion_matrix: cm,
            samples: cm.total(),
        }
    }

    /// Threshold probabilities, then score
    pub fn from_probabilities(actual: &[u8], probabilities: &[f64], threshold: f64) -> Self {
        let predicted: Vec<u8> = probabilities
            .iter()
            .map(|&p| u8::from(p >= threshold))
            .collect();
        Self::from_labels(actual, &predicted)
    }
}

/// How close predicted fire dates land to the actual ones
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DateAccuracyMetrics {
    pub mae_days: f64,
    pub rmse_days: f64,
    /// Percentage of predictions within ±2 days
    pub accuracy_within_2d: f64,
    pub accuracy_within_3d: f64,
    pub accuracy_within_5d: f64,
    pub total_predictions: usize,
    pub valid_predictions: usize,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

impl DateAccuracyMetrics {
    /// `errors_days` holds predicted minus actual date in (fractional) days
    /// for each prediction; `None` marks a prediction missing either date.
    pub fn from_errors(errors_days: &[Option<f64>]) -> Self {
        let valid: Vec<f64> = errors_days.iter().flatten().map(|e| e.abs()).collect();
        let total_predictions = errors_days.len();
        if valid.is_empty() {
            return Self {
                total_predictions,
                ..Default::default()
            };
        }

        let n = valid.len() as f64;
        let within = |days: f64| valid.iter().filter(|&&e| e <= days).count() as f64 / n * 100.0;
        Self {
            mae_days: round2(valid.iter().sum::<f64>() / n),
            rmse_days: round2((valid.iter().map(|e| e * e).sum::<f64>() / n).sqrt()),
            accuracy_within_2d: round2(within(2.0)),
            accuracy_within_3d: round2(within(3.0)),
            accuracy_within_5d: round2(within(5.0)),
            total_predictions,
            valid_predictions: valid.len(),
        }
    }
}
