//! Gradient-boosted decision trees for binary classification
//!
//! Logistic loss, second-order leaf weights with L2 regularization and exact
//! greedy split search. Feature importance is the total split gain per
//! feature, normalized to sum to 1.

use serde::{Deserialize, Serialize};
use shared::models::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use thiserror::Error;

use super::RiskClassifier;

/// Boosting hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// L2 penalty on leaf weights
    pub lambda: f64,
    /// Minimum hessian sum in each child
    pub min_child_weight: f64,
    /// Minimum gain required to split
    pub gamma: f64,
    /// Weight of positive samples; `None` uses negatives / positives
    #[serde(default)]
    pub scale_pos_weight: Option<f64>,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: 6,
            learning_rate: 0.1,
            lambda: 1.0,
            min_child_weight: 1.0,
            gamma: 0.0,
            scale_pos_weight: None,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FitError {
    #[error("no training samples")]
    Empty,

    #[error("feature and label counts differ ({features} vs {labels})")]
    LengthMismatch { features: usize, labels: usize },

    #[error("training labels contain a single class")]
    SingleClass,

    #[error("invalid hyperparameter: {0}")]
    InvalidParams(&'static str),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, x: &[f64; FEATURE_COUNT]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let value = x.get(*feature).copied().unwrap_or(f64::NAN);
                    idx = if value < *threshold { *left } else { *right };
                }
                Some(Node::Leaf { value }) => return *value,
                None => return 0.0,
            }
        }
    }
}

/// Trained ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    feature_names: Vec<String>,
    /// Initial margin, in log-odds
    base_score: f64,
    params: BoostingParams,
    trees: Vec<Tree>,
    /// Normalized total gain per feature
    importance: Vec<f64>,
}

struct Gradients {
    grad: Vec<f64>,
    hess: Vec<f64>,
}

struct TreeBuilder<'a> {
    x: &'a [[f64; FEATURE_COUNT]],
    gradients: &'a Gradients,
    params: &'a BoostingParams,
    nodes: Vec<Node>,
    gain: [f64; FEATURE_COUNT],
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl<'a> TreeBuilder<'a> {
    fn leaf_weight(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.params.lambda) * self.params.learning_rate
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.lambda)
    }

    fn build(&mut self, rows: &mut [usize], depth: usize) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { value: 0.0 });

        let g: f64 = rows.iter().map(|&i| self.gradients.grad[i]).sum();
        let h: f64 = rows.iter().map(|&i| self.gradients.hess[i]).sum();

        let split = if depth < self.params.max_depth && rows.len() >= 2 {
            self.best_split(rows, g, h)
        } else {
            None
        };

        let x = self.x;
        let mid = split.as_ref().map(|s| {
            rows.sort_by(|&a, &b| x[a][s.feature].total_cmp(&x[b][s.feature]));
            rows.partition_point(|&i| x[i][s.feature] < s.threshold)
        });

        let (Some(split), Some(mid)) = (split, mid) else {
            self.nodes[id] = Node::Leaf {
                value: self.leaf_weight(g, h),
            };
            return id;
        };
        // midpoint of two adjacent floats can collapse onto one side
        if mid == 0 || mid == rows.len() {
            self.nodes[id] = Node::Leaf {
                value: self.leaf_weight(g, h),
            };
            return id;
        }

        self.gain[split.feature] += split.gain;
        let (left_rows, right_rows) = rows.split_at_mut(mid);

        let left = self.build(left_rows, depth + 1);
        let right = self.build(right_rows, depth + 1);
        self.nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<BestSplit> {
        let parent = self.score(g, h);
        let mut best: Option<BestSplit> = None;
        let mut order: Vec<usize> = rows.to_vec();

        for feature in 0..FEATURE_COUNT {
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let (mut gl, mut hl) = (0.0, 0.0);
            for pos in 0..order.len() - 1 {
                let i = order[pos];
                gl += self.gradients.grad[i];
                hl += self.gradients.hess[i];

                let here = self.x[i][feature];
                let next = self.x[order[pos + 1]][feature];
                if here == next {
                    continue;
                }
                let (gr, hr) = (g - gl, h - hl);
                if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                    continue;
                }

                let gain = 0.5 * (self.score(gl, hl) + self.score(gr, hr) - parent) - self.params.gamma;
                if gain > best.as_ref().map_or(0.0, |b| b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold: (here + next) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl GradientBoostedTrees {
    /// Fit an ensemble on feature rows and 0/1 labels
    pub fn fit(
        x: &[[f64; FEATURE_COUNT]],
        y: &[u8],
        params: &BoostingParams,
    ) -> Result<Self, FitError> {
        if x.is_empty() {
            return Err(FitError::Empty);
        }
        if x.len() != y.len() {
            return Err(FitError::LengthMismatch {
                features: x.len(),
                labels: y.len(),
            });
        }
        if params.n_estimators == 0 {
            return Err(FitError::InvalidParams("n_estimators must be positive"));
        }
        if params.learning_rate.is_nan() || params.learning_rate <= 0.0 {
            return Err(FitError::InvalidParams("learning_rate must be positive"));
        }
        if params.lambda < 0.0 {
            return Err(FitError::InvalidParams("lambda cannot be negative"));
        }

        let positives = y.iter().filter(|&&v| v == 1).count();
        let negatives = y.len() - positives;
        if positives == 0 || negatives == 0 {
            return Err(FitError::SingleClass);
        }
        let pos_weight = params
            .scale_pos_weight
            .unwrap_or(negatives as f64 / positives as f64);
        let weights: Vec<f64> = y
            .iter()
            .map(|&v| if v == 1 { pos_weight } else { 1.0 })
            .collect();

        let base_score = 0.0;
        let mut margins = vec![base_score; x.len()];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut gain = [0.0; FEATURE_COUNT];

        for _ in 0..params.n_estimators {
            let mut gradients = Gradients {
                grad: Vec::with_capacity(x.len()),
                hess: Vec::with_capacity(x.len()),
            };
            for ((margin, &label), w) in margins.iter().zip(y).zip(&weights) {
                let p = sigmoid(*margin);
                gradients.grad.push(w * (p - f64::from(label)));
                gradients.hess.push((w * p * (1.0 - p)).max(1e-16));
            }

            let mut builder = TreeBuilder {
                x,
                gradients: &gradients,
                params,
                nodes: Vec::new(),
                gain: [0.0; FEATURE_COUNT],
            };
            let mut rows: Vec<usize> = (0..x.len()).collect();
            builder.build(&mut rows, 0);

            let tree = Tree {
                nodes: builder.nodes,
            };
            for (margin, row) in margins.iter_mut().zip(x) {
                *margin += tree.predict(row);
            }
            for (total, g) in gain.iter_mut().zip(builder.gain) {
                *total += g;
            }
            trees.push(tree);
        }

        let total_gain: f64 = gain.iter().sum();
        let importance = gain
            .iter()
            .map(|g| if total_gain > 0.0 { g / total_gain } else { 0.0 })
            .collect();

        Ok(Self {
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            base_score,
            params: params.clone(),
            trees,
            importance,
        })
    }

    pub fn params(&self) -> &BoostingParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn margin(&self, x: &[f64; FEATURE_COUNT]) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.predict(x)).sum::<f64>()
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

impl RiskClassifier for GradientBoostedTrees {
    fn predict_proba(&self, features: &FeatureVector) -> f64 {
        sigmoid(self.margin(&features.to_array()))
    }

    fn feature_importance(&self) -> Vec<(String, f64)> {
        self.feature_names
            .iter()
            .cloned()
            .zip(self.importance.iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> (Vec<[f64; FEATURE_COUNT]>, Vec<u8>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..40 {
            let hot = i % 4 == 0;
            let temp = if hot { 150.0 + i as f64 } else { 20.0 + i as f64 };
            x.push([temp, i as f64, 20.0, 60.0, 0.0, 0.0]);
            y.push(u8::from(hot));
        }
        (x, y)
    }

    fn small_params() -> BoostingParams {
        BoostingParams {
            n_estimators: 30,
            max_depth: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_fit_separates_trivial_data() {
        let (x, y) = separable();
        let model = GradientBoostedTrees::fit(&x, &y, &small_params()).unwrap();
        for (row, label) in x.iter().zip(&y) {
            let p = model.predict_proba(&FeatureVector::from_array(*row));
            assert!((0.0..=1.0).contains(&p));
            assert_eq!(u8::from(p >= 0.5), *label, "row {:?} p={}", row, p);
        }

        let importance = model.feature_importance();
        assert_eq!(importance[0].0, "max_temperature");
        let top = importance
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap();
        assert_eq!(top.0, "max_temperature");
    }

    #[test]
    fn test_json_round_trip_preserves_predictions() {
        let (x, y) = separable();
        let model = GradientBoostedTrees::fit(&x, &y, &small_params()).unwrap();
        let restored = GradientBoostedTrees::from_json(&model.to_json().unwrap()).unwrap();
        for row in &x {
            let v = FeatureVector::from_array(*row);
            assert_eq!(model.predict_proba(&v), restored.predict_proba(&v));
        }
    }

    #[test]
    fn test_fit_rejects_bad_input() {
        let (x, _) = separable();
        assert_eq!(
            GradientBoostedTrees::fit(&x, &vec![0; x.len()], &small_params()),
            Err(FitError::SingleClass)
        );
        assert_eq!(
            GradientBoostedTrees::fit(&[], &[], &small_params()),
            Err(FitError::Empty)
        );
        assert!(matches!(
            GradientBoostedTrees::fit(&x, &[0, 1], &small_params()),
            Err(FitError::LengthMismatch { .. })
        ));
    }
}
