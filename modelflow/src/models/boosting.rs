//! Gradient-boosted regression trees with squared loss.

use super::{ModelError, Regressor};
use crate::data::Matrix;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Hyperparameters for [`BoostedTrees`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    /// Number of trees.
    #[serde(default = "default_estimators")]
    pub n_estimators: usize,
    /// Shrinkage applied to every tree.
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Maximum tree depth; a depth of 0 is a single leaf.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Minimum rows on each side of a split.
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
    /// Fraction of rows sampled (without replacement) for each tree.
    #[serde(default = "default_subsample")]
    pub subsample: f64,
    /// Seed for row subsampling.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_estimators() -> usize {
    100
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_max_depth() -> usize {
    3
}

fn default_min_samples_leaf() -> usize {
    1
}

fn default_subsample() -> f64 {
    1.0
}

fn default_seed() -> u64 {
    42
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: default_estimators(),
            learning_rate: default_learning_rate(),
            max_depth: default_max_depth(),
            min_samples_leaf: default_min_samples_leaf(),
            subsample: default_subsample(),
            seed: default_seed(),
        }
    }
}

impl BoostingParams {
    fn validate(&self) -> Result<(), ModelError> {
        if self.n_estimators == 0 {
            return Err(ModelError::InvalidParameter("n_estimators must be positive".into()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(ModelError::InvalidParameter(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(ModelError::InvalidParameter(format!(
                "subsample must be in (0, 1], got {}",
                self.subsample
            )));
        }
        if self.min_samples_leaf == 0 {
            return Err(ModelError::InvalidParameter("min_samples_leaf must be positive".into()));
        }
        Ok(())
    }
}

/// A node of a regression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum TreeNode {
    /// Terminal prediction.
    Leaf {
        /// Predicted residual.
        value: f64,
    },
    /// `x[feature] <= threshold` goes left.
    Split {
        /// Feature index.
        feature: usize,
        /// Split threshold.
        threshold: f64,
        /// Subtree for values at or below the threshold.
        left: Box<TreeNode>,
        /// Subtree for values above the threshold.
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, row: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                Self::Leaf { value } => return *value,
                Self::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

/// A fitted boosted ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedTrees {
    /// Initial prediction (training mean).
    pub base: f64,
    /// Shrinkage used at fit time.
    pub learning_rate: f64,
    /// Fitted trees.
    pub trees: Vec<TreeNode>,
    /// Number of input features.
    pub n_features: usize,
}

impl Regressor for BoostedTrees {
    type Params = BoostingParams;

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn fit(x: &Matrix, y: &[f64], params: &BoostingParams) -> Result<Self, ModelError> {
        let (n, p) = (x.rows(), x.cols());
        if n == 0 || p == 0 {
            return Err(ModelError::EmptyTraining { rows: n, cols: p });
        }
        if y.len() != n {
            return Err(ModelError::DimensionMismatch {
                expected: n,
                actual: y.len(),
            });
        }
        params.validate()?;

        let base = y.iter().sum::<f64>() / n as f64;
        let mut current = vec![base; n];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut rng = StdRng::seed_from_u64(params.seed);
        let sample_size = ((n as f64) * params.subsample).ceil().max(1.0) as usize;

        for _ in 0..params.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&current).map(|(t, c)| t - c).collect();
            let rows: Vec<usize> = if sample_size >= n {
                (0..n).collect()
            } else {
                let mut rows = sample(&mut rng, n, sample_size).into_vec();
                rows.sort_unstable();
                rows
            };

            let builder = TreeBuilder {
                x,
                residuals: &residuals,
                max_depth: params.max_depth,
                min_samples_leaf: params.min_samples_leaf,
            };
            let tree = builder.build(rows, 0);
            for (i, c) in current.iter_mut().enumerate() {
                *c += params.learning_rate * tree.predict(x.row(i));
            }
            trees.push(tree);
        }

        Ok(Self {
            base,
            learning_rate: params.learning_rate,
            trees,
            n_features: p,
        })
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        self.base
            + self.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }
}

struct TreeBuilder<'a> {
    x: &'a Matrix,
    residuals: &'a [f64],
    max_depth: usize,
    min_samples_leaf: usize,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl TreeBuilder<'_> {
    #[allow(clippy::cast_precision_loss)]
    fn leaf(&self, rows: &[usize]) -> TreeNode {
        let value = if rows.is_empty() {
            0.0
        } else {
            rows.iter().map(|&i| self.residuals[i]).sum::<f64>() / rows.len() as f64
        };
        TreeNode::Leaf { value }
    }

    fn build(&self, rows: Vec<usize>, depth: usize) -> TreeNode {
        if depth >= self.max_depth || rows.len() < 2 * self.min_samples_leaf {
            return self.leaf(&rows);
        }
        let Some(best) = self.best_split(&rows) else {
            return self.leaf(&rows);
        };
        let (left, right): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| self.x.get(i, best.feature) <= best.threshold);
        TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(self.build(left, depth + 1)),
            right: Box::new(self.build(right, depth + 1)),
        }
    }

    /// Scans every feature for the split maximising the reduction in squared error.
    #[allow(clippy::cast_precision_loss)]
    fn best_split(&self, rows: &[usize]) -> Option<BestSplit> {
        let n = rows.len();
        let total: f64 = rows.iter().map(|&i| self.residuals[i]).sum();
        let parent_score = total * total / n as f64;
        let mut best: Option<BestSplit> = None;

        for feature in 0..self.x.cols() {
            let mut sorted: Vec<(f64, f64)> = rows
                .iter()
                .map(|&i| (self.x.get(i, feature), self.residuals[i]))
                .collect();
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_sum = 0.0;
            for k in 0..n - 1 {
                left_sum += sorted[k].1;
                let left_n = k + 1;
                let right_n = n - left_n;
                if left_n < self.min_samples_leaf || right_n < self.min_samples_leaf {
                    continue;
                }
                if sorted[k].0 == sorted[k + 1].0 {
                    continue;
                }
                let right_sum = total - left_sum;
                let score = left_sum * left_sum / left_n as f64 + right_sum * right_sum / right_n as f64;
                let gain = score - parent_score;
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold: (sorted[k].0 + sorted[k + 1].0) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}
