//! Regression model families and the deployable bundle.
//!
//! A family implements [`Regressor`]. [`ModelSpec`] selects the family from
//! configuration and [`FittedModel`] holds the fitted result; both are plain
//! enums matched at the call site.

mod boosting;
mod bundle;
mod linear;
mod metrics;

pub use boosting::{BoostedTrees, BoostingParams, TreeNode};
pub use bundle::ModelBundle;
pub use linear::{LinearModel, LinearParams};
pub use metrics::RegressionMetrics;

use crate::data::{Matrix, Table, TableError};
use crate::preprocess::PreprocessError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while fitting or applying a model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// There are no training rows or no feature columns.
    #[error("Cannot fit a model on {rows} rows and {cols} features")]
    EmptyTraining {
        /// Training rows.
        rows: usize,
        /// Feature columns.
        cols: usize,
    },

    /// The normal equations have no unique solution.
    #[error("Linear system is singular; increase alpha or drop collinear features")]
    Singular,

    /// Input width differs from the fitted width.
    #[error("Expected {expected} features, got {actual}")]
    DimensionMismatch {
        /// Fitted feature count.
        expected: usize,
        /// Supplied feature count.
        actual: usize,
    },

    /// A hyperparameter is out of range.
    #[error("Invalid model parameter: {0}")]
    InvalidParameter(String),

    /// Evaluation needs at least one row.
    #[error("Cannot evaluate on an empty partition")]
    EmptyEvaluation,

    /// The model produced NaN or an infinity.
    #[error("Model produced a non-finite prediction ({0})")]
    NonFinitePrediction(f64),

    /// Building the feature matrix failed.
    #[error(transparent)]
    Table(#[from] TableError),

    /// Reapplying preprocessing failed.
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
}

/// Capability shared by every model family.
pub trait Regressor: Sized {
    /// Hyperparameters of the family.
    type Params;

    /// Fits the model to `x` (row-major features) and targets `y`.
    fn fit(x: &Matrix, y: &[f64], params: &Self::Params) -> Result<Self, ModelError>;

    /// Number of features the model was fitted on.
    fn n_features(&self) -> usize;

    /// Predicts a single row of features.
    fn predict_row(&self, row: &[f64]) -> f64;

    /// Predicts every row of `x`.
    fn predict(&self, x: &Matrix) -> Result<Vec<f64>, ModelError> {
        if x.cols() != self.n_features() {
            return Err(ModelError::DimensionMismatch {
                expected: self.n_features(),
                actual: x.cols(),
            });
        }
        Ok((0..x.rows()).map(|i| self.predict_row(x.row(i))).collect())
    }
}

/// Model family and hyperparameters, as configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ModelSpec {
    /// Ridge-regularised linear regression.
    Linear(LinearParams),
    /// Gradient-boosted regression trees.
    GradientBoosting(BoostingParams),
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self::GradientBoosting(BoostingParams::default())
    }
}

impl ModelSpec {
    /// Fits the selected family.
    pub fn fit(&self, x: &Matrix, y: &[f64]) -> Result<FittedModel, ModelError> {
        match self {
            Self::Linear(params) => LinearModel::fit(x, y, params).map(FittedModel::Linear),
            Self::GradientBoosting(params) => {
                BoostedTrees::fit(x, y, params).map(FittedModel::GradientBoosting)
            }
        }
    }

    /// Hyperparameters as a JSON object, for experiment tracking.
    #[must_use]
    pub fn params(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// A fitted model of any family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum FittedModel {
    /// Fitted linear model.
    Linear(LinearModel),
    /// Fitted boosted trees.
    GradientBoosting(BoostedTrees),
}

impl FittedModel {
    /// Family name.
    #[must_use]
    pub fn family(&self) -> &'static str {
        match self {
            Self::Linear(_) => "linear",
            Self::GradientBoosting(_) => "gradient_boosting",
        }
    }

    /// Predicts every row of `x`.
    pub fn predict(&self, x: &Matrix) -> Result<Vec<f64>, ModelError> {
        match self {
            Self::Linear(m) => m.predict(x),
            Self::GradientBoosting(m) => m.predict(x),
        }
    }
}

/// A fitted model together with the columns it reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    /// Feature columns in matrix order.
    pub feature_columns: Vec<String>,
    /// Target column.
    pub target: String,
    /// The fitted model.
    pub model: FittedModel,
}

impl TrainedModel {
    /// Fits `spec` on the named feature columns of `train`.
    pub fn fit(
        train: &Table,
        target: &str,
        feature_columns: Vec<String>,
        spec: &ModelSpec,
    ) -> Result<Self, ModelError> {
        let x = train.to_matrix(&feature_columns)?;
        let y = train.numeric_complete(target)?;
        let model = spec.fit(&x, &y)?;
        Ok(Self {
            feature_columns,
            target: target.to_string(),
            model,
        })
    }

    /// Predicts every row of a transformed table.
    pub fn predict_table(&self, table: &Table) -> Result<Vec<f64>, ModelError> {
        let x = table.to_matrix(&self.feature_columns)?;
        self.model.predict(&x)
    }

    /// Scores the model on a transformed table holding the target.
    pub fn evaluate(&self, table: &Table) -> Result<RegressionMetrics, ModelError> {
        let predicted = self.predict_table(table)?;
        let actual = table.numeric_complete(&self.target)?;
        RegressionMetrics::compute(&actual, &predicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;

    fn table() -> Table {
        let x: Vec<Option<f64>> = (0..20).map(|i| Some(f64::from(i))).collect();
        let y: Vec<Option<f64>> = (0..20).map(|i| Some(3.0 * f64::from(i) + 1.0)).collect();
        Table::new(vec![Column::numeric("x", x), Column::numeric("y", y)]).unwrap()
    }

    #[test]
    fn test_trained_model_linear() {
        let spec = ModelSpec::Linear(LinearParams { alpha: 0.0 });
        let model = TrainedModel::fit(&table(), "y", vec!["x".to_string()], &spec).unwrap();
        assert_eq!(model.model.family(), "linear");

        let metrics = model.evaluate(&table()).unwrap();
        assert!(metrics.rmse < 1e-6);
        assert!((metrics.r2 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_trained_model_boosting_reduces_error() {
        let spec = ModelSpec::default();
        let model = TrainedModel::fit(&table(), "y", vec!["x".to_string()], &spec).unwrap();
        let metrics = model.evaluate(&table()).unwrap();
        assert!(metrics.r2 > 0.9, "r2 = {}", metrics.r2);
    }

    #[test]
    fn test_spec_deserializes_with_defaults() {
        let spec: ModelSpec = serde_json::from_str(r#"{"family": "linear"}"#).unwrap();
        assert_eq!(spec, ModelSpec::Linear(LinearParams::default()));

        let spec: ModelSpec =
            serde_json::from_str(r#"{"family": "gradient_boosting", "n_estimators": 5}"#).unwrap();
        match spec {
            ModelSpec::GradientBoosting(p) => assert_eq!(p.n_estimators, 5),
            ModelSpec::Linear(_) => panic!("wrong family"),
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let spec = ModelSpec::Linear(LinearParams::default());
        let model = TrainedModel::fit(&table(), "y", vec!["x".to_string()], &spec).unwrap();
        let wide = Matrix::new(1, 2, vec![1.0, 2.0]);
        assert_eq!(
            model.model.predict(&wide),
            Err(ModelError::DimensionMismatch {
                expected: 1,
                actual: 2
            })
        );
    }
}
