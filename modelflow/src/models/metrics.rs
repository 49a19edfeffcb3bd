//! Regression metrics.

use super::ModelError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Standard regression scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Root mean squared error.
    pub rmse: f64,
    /// Mean squared error.
    pub mse: f64,
    /// Mean absolute error.
    pub mae: f64,
    /// Coefficient of determination.
    pub r2: f64,
}

impl RegressionMetrics {
    /// Scores `predicted` against `actual`.
    ///
    /// When the actual values are constant, R² is 1.0 for a perfect fit and
    /// 0.0 otherwise.
    #[allow(clippy::cast_precision_loss)]
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Result<Self, ModelError> {
        if actual.len() != predicted.len() {
            return Err(ModelError::DimensionMismatch {
                expected: actual.len(),
                actual: predicted.len(),
            });
        }
        if actual.is_empty() {
            return Err(ModelError::EmptyEvaluation);
        }
        let n = actual.len() as f64;
        let mean = actual.iter().sum::<f64>() / n;

        let ss_res: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).powi(2)).sum();
        let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
        let mae = actual.iter().zip(predicted).map(|(a, p)| (a - p).abs()).sum::<f64>() / n;
        let mse = ss_res / n;

        let r2 = if ss_tot == 0.0 {
            if ss_res == 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            1.0 - ss_res / ss_tot
        };

        Ok(Self {
            rmse: mse.sqrt(),
            mse,
            mae,
            r2,
        })
    }

    /// Metrics keyed by name, optionally prefixed (e.g. `validation_rmse`).
    #[must_use]
    pub fn to_map(&self, prefix: &str) -> BTreeMap<String, f64> {
        [("rmse", self.rmse), ("mse", self.mse), ("mae", self.mae), ("r2", self.r2)]
            .into_iter()
            .map(|(k, v)| {
                let key = if prefix.is_empty() {
                    k.to_string()
                } else {
                    format!("{prefix}_{k}")
                };
                (key, v)
            })
            .collect()
    }

    /// Reads metrics back from a map produced by [`Self::to_map`] with no prefix.
    #[must_use]
    pub fn from_map(map: &BTreeMap<String, f64>) -> Option<Self> {
        Some(Self {
            rmse: *map.get("rmse")?,
            mse: *map.get("mse")?,
            mae: *map.get("mae")?,
            r2: *map.get("r2")?,
        })
    }
}
