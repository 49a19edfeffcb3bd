//! Preprocessing kernels used by the training steps.
//!
//! Every fitted component learns its parameters from the training partition
//! only and is applied unchanged to validation, test and inference rows.

mod features;
mod impute;
mod outliers;
mod split;

pub use features::{FeatureConfig, FeatureTransform, FittedTransformation, Transformation};
pub use impute::{drop_missing_target, FillValue, FittedImputer, ImputeConfig, ImputeStrategy};
pub use outliers::{remove_outliers, OutlierConfig, OutlierReport, OutlierRule};
pub use split::{partition_indices, split_table, Partitions, SplitConfig};

use crate::data::TableError;
use thiserror::Error;

/// Errors raised while fitting or applying preprocessing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PreprocessError {
    /// Split ratios are out of range or leave no training rows.
    #[error("Invalid split ratios: validation={validation}, test={test}")]
    InvalidRatios {
        /// Validation share.
        validation: f64,
        /// Test share.
        test: f64,
    },

    /// A column has no observed values to learn from.
    #[error("Column '{column}' has no observed values")]
    NoObservedValues {
        /// The column.
        column: String,
    },

    /// A strategy does not apply to the column's type.
    #[error("Strategy '{strategy}' cannot be applied to column '{column}'")]
    UnsupportedStrategy {
        /// The column.
        column: String,
        /// The strategy name.
        strategy: String,
    },

    /// A log transform met a negative value.
    #[error("Column '{column}' has value {value} outside the log domain")]
    InvalidLog {
        /// The column.
        column: String,
        /// The offending value.
        value: f64,
    },

    /// The training partition has no rows.
    #[error("Training partition is empty")]
    EmptyTrain,

    /// Underlying table failure.
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Arithmetic mean; zero for an empty slice.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation around `mean`.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}
