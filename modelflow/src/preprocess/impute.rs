//! Missing-value imputation fitted on the training partition.

use super::PreprocessError;
use crate::data::{Column, ColumnData, ColumnSchema, ColumnType, Table};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a column's missing values are filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ImputeStrategy {
    /// Arithmetic mean (numeric only).
    Mean,
    /// Median (numeric only).
    Median,
    /// Most frequent value; ties go to the smallest value.
    MostFrequent,
    /// A fixed value.
    Constant {
        /// The fill value.
        value: FillValue,
    },
}

/// A fill value learned or configured for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FillValue {
    /// Numeric fill.
    Number(f64),
    /// Categorical fill.
    Text(String),
}

/// Imputation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputeConfig {
    /// Per-column strategies; columns not listed use the defaults below.
    #[serde(default)]
    pub strategies: BTreeMap<String, ImputeStrategy>,
    /// Strategy for numeric columns without an explicit entry.
    #[serde(default = "default_numeric")]
    pub numeric_default: ImputeStrategy,
    /// Strategy for categorical columns without an explicit entry.
    #[serde(default = "default_categorical")]
    pub categorical_default: ImputeStrategy,
}

fn default_numeric() -> ImputeStrategy {
    ImputeStrategy::Median
}

fn default_categorical() -> ImputeStrategy {
    ImputeStrategy::MostFrequent
}

impl Default for ImputeConfig {
    fn default() -> Self {
        Self {
            strategies: BTreeMap::new(),
            numeric_default: default_numeric(),
            categorical_default: default_categorical(),
        }
    }
}

/// Fill values learned from a training table.
///
/// `schema` records the feature columns seen at fit time; it is what an
/// inference request must provide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedImputer {
    /// Feature columns at fit time, target excluded.
    pub schema: Vec<ColumnSchema>,
    /// Fill value per column.
    pub fills: BTreeMap<String, FillValue>,
}

impl FittedImputer {
    /// Learns fill values for every feature column of `train`.
    ///
    /// The target column is excluded; rows with a missing target should be
    /// removed with [`drop_missing_target`] beforehand.
    pub fn fit(train: &Table, target: &str, config: &ImputeConfig) -> Result<Self, PreprocessError> {
        let mut fills = BTreeMap::new();
        let mut schema = Vec::new();

        for column in train.columns().iter().filter(|c| c.name != target) {
            schema.push(column.schema());
            let strategy = config.strategies.get(&column.name).unwrap_or(
                match column.data.column_type() {
                    ColumnType::Numeric => &config.numeric_default,
                    ColumnType::Categorical => &config.categorical_default,
                },
            );
            fills.insert(column.name.clone(), fit_column(column, strategy)?);
        }

        Ok(Self { schema, fills })
    }

    /// Fills missing values using the learned values.
    ///
    /// Columns without a learned value are left unchanged.
    pub fn transform(&self, table: &Table) -> Result<Table, PreprocessError> {
        let mut out = table.clone();
        for column in table.columns() {
            let Some(fill) = self.fills.get(&column.name) else {
                continue;
            };
            let data = match (&column.data, fill) {
                (ColumnData::Numeric(values), FillValue::Number(x)) => {
                    ColumnData::Numeric(values.iter().map(|v| Some(v.unwrap_or(*x))).collect())
                }
                (ColumnData::Categorical(values), FillValue::Text(s)) => ColumnData::Categorical(
                    values
                        .iter()
                        .map(|v| Some(v.clone().unwrap_or_else(|| s.clone())))
                        .collect(),
                ),
                (ColumnData::Categorical(values), FillValue::Number(x)) => ColumnData::Categorical(
                    values
                        .iter()
                        .map(|v| Some(v.clone().unwrap_or_else(|| x.to_string())))
                        .collect(),
                ),
                (ColumnData::Numeric(_), FillValue::Text(_)) => {
                    return Err(PreprocessError::UnsupportedStrategy {
                        column: column.name.clone(),
                        strategy: "constant text".to_string(),
                    })
                }
            };
            out.set_column(Column {
                name: column.name.clone(),
                data,
            })?;
        }
        Ok(out)
    }
}

fn fit_column(column: &Column, strategy: &ImputeStrategy) -> Result<FillValue, PreprocessError> {
    let no_values = || PreprocessError::NoObservedValues {
        column: column.name.clone(),
    };
    let unsupported = |name: &str| PreprocessError::UnsupportedStrategy {
        column: column.name.clone(),
        strategy: name.to_string(),
    };

    match (strategy, &column.data) {
        (ImputeStrategy::Constant { value }, _) => Ok(value.clone()),
        (ImputeStrategy::Mean, ColumnData::Numeric(values)) => {
            let observed: Vec<f64> = values.iter().flatten().copied().collect();
            if observed.is_empty() {
                return Err(no_values());
            }
            Ok(FillValue::Number(super::mean(&observed)))
        }
        (ImputeStrategy::Median, ColumnData::Numeric(values)) => {
            let mut observed: Vec<f64> = values.iter().flatten().copied().collect();
            if observed.is_empty() {
                return Err(no_values());
            }
            observed.sort_by(f64::total_cmp);
            let mid = observed.len() / 2;
            let median = if observed.len() % 2 == 0 {
                (observed[mid - 1] + observed[mid]) / 2.0
            } else {
                observed[mid]
            };
            Ok(FillValue::Number(median))
        }
        (ImputeStrategy::MostFrequent, ColumnData::Numeric(values)) => {
            let mut counts: BTreeMap<u64, (f64, usize)> = BTreeMap::new();
            for v in values.iter().flatten() {
                counts.entry(v.to_bits()).or_insert((*v, 0)).1 += 1;
            }
            counts
                .into_values()
                .max_by(|a, b| a.1.cmp(&b.1).then(b.0.total_cmp(&a.0)))
                .map(|(v, _)| FillValue::Number(v))
                .ok_or_else(no_values)
        }
        (ImputeStrategy::MostFrequent, ColumnData::Categorical(values)) => {
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for v in values.iter().flatten() {
                *counts.entry(v.as_str()).or_insert(0) += 1;
            }
            // BTreeMap iterates in ascending key order; keep the first maximum.
            let mut best: Option<(&str, usize)> = None;
            for (value, count) in counts {
                if best.map_or(true, |(_, c)| count > c) {
                    best = Some((value, count));
                }
            }
            best.map(|(v, _)| FillValue::Text(v.to_string()))
                .ok_or_else(no_values)
        }
        (ImputeStrategy::Mean, ColumnData::Categorical(_)) => Err(unsupported("mean")),
        (ImputeStrategy::Median, ColumnData::Categorical(_)) => Err(unsupported("median")),
    }
}

/// Removes rows whose target value is missing.
pub fn drop_missing_target(table: &Table, target: &str) -> Result<Table, PreprocessError> {
    let column = table
        .column(target)
        .ok_or_else(|| crate::data::TableError::MissingColumn(target.to_string()))?;
    let mask: Vec<bool> = match &column.data {
        ColumnData::Numeric(values) => values.iter().map(Option::is_some).collect(),
        ColumnData::Categorical(_) => {
            return Err(crate::data::TableError::NotNumeric(target.to_string()).into())
        }
    };
    Ok(table.filter(&mask))
}
