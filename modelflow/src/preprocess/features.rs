//! Ordered, train-fitted feature transformations.

use super::PreprocessError;
use crate::data::{Column, ColumnData, Table};
use serde::{Deserialize, Serialize};

/// One configured transformation.
///
/// An empty `columns` list selects every numeric feature, or every
/// categorical feature for one-hot encoding. The target is never selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Transformation {
    /// `ln(1 + x)`; values must be non-negative.
    Log {
        /// Columns to transform.
        #[serde(default)]
        columns: Vec<String>,
    },
    /// `(x - mean) / std`.
    StandardScale {
        /// Columns to transform.
        #[serde(default)]
        columns: Vec<String>,
    },
    /// `(x - min) / (max - min)`.
    MinMaxScale {
        /// Columns to transform.
        #[serde(default)]
        columns: Vec<String>,
    },
    /// One indicator column per training category; the source is dropped.
    OneHotEncode {
        /// Columns to encode.
        #[serde(default)]
        columns: Vec<String>,
    },
}

impl Transformation {
    fn name(&self) -> &'static str {
        match self {
            Self::Log { .. } => "log",
            Self::StandardScale { .. } => "standard_scale",
            Self::MinMaxScale { .. } => "min_max_scale",
            Self::OneHotEncode { .. } => "one_hot_encode",
        }
    }
}

/// Feature engineering settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Transformations applied in order.
    #[serde(default = "default_transformations")]
    pub transformations: Vec<Transformation>,
}

fn default_transformations() -> Vec<Transformation> {
    vec![
        Transformation::OneHotEncode {
            columns: Vec::new(),
        },
        Transformation::StandardScale {
            columns: Vec::new(),
        },
    ]
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            transformations: default_transformations(),
        }
    }
}

/// Parameters of one scaled column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleParams {
    /// Column name.
    pub column: String,
    /// Subtracted offset.
    pub offset: f64,
    /// Divisor; 1.0 when the training column was constant.
    pub divisor: f64,
}

/// Categories learned for one encoded column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encoding {
    /// Source column.
    pub column: String,
    /// Sorted training categories.
    pub categories: Vec<String>,
}

/// A transformation with its learned parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FittedTransformation {
    /// Log of the listed columns.
    Log {
        /// Columns transformed.
        columns: Vec<String>,
    },
    /// Affine rescaling (standard or min-max).
    Scale {
        /// Per-column parameters.
        params: Vec<ScaleParams>,
    },
    /// One-hot encoding.
    OneHot {
        /// Per-column categories.
        encodings: Vec<Encoding>,
    },
}

/// The fitted transformation sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTransform {
    /// Target column, left untouched.
    pub target: String,
    /// Fitted steps in application order.
    pub steps: Vec<FittedTransformation>,
}

impl FeatureTransform {
    /// Fits each transformation on the output of the previous one.
    ///
    /// Returns the fitted transform and the transformed training table.
    pub fn fit(
        train: &Table,
        target: &str,
        config: &FeatureConfig,
    ) -> Result<(Self, Table), PreprocessError> {
        if train.is_empty() {
            return Err(PreprocessError::EmptyTrain);
        }
        let mut current = train.clone();
        let mut steps = Vec::with_capacity(config.transformations.len());

        for transformation in &config.transformations {
            let fitted = fit_one(&current, target, transformation)?;
            current = apply_one(&current, &fitted)?;
            tracing::debug!(op = transformation.name(), "Fitted feature transformation");
            steps.push(fitted);
        }

        Ok((
            Self {
                target: target.to_string(),
                steps,
            },
            current,
        ))
    }

    /// Applies the fitted steps to a table with the training layout.
    pub fn apply(&self, table: &Table) -> Result<Table, PreprocessError> {
        self.steps
            .iter()
            .try_fold(table.clone(), |current, step| apply_one(&current, step))
    }

    /// Numeric feature columns of a transformed table, in order.
    ///
    /// Categorical columns left unencoded are not model features.
    #[must_use]
    pub fn feature_columns(&self, transformed: &Table) -> Vec<String> {
        transformed.numeric_columns(&self.target)
    }
}

fn select(table: &Table, target: &str, columns: &[String], categorical: bool) -> Vec<String> {
    if !columns.is_empty() {
        return columns.iter().filter(|c| *c != target).cloned().collect();
    }
    if categorical {
        table.categorical_columns(target)
    } else {
        table.numeric_columns(target)
    }
}

fn fit_one(
    table: &Table,
    target: &str,
    transformation: &Transformation,
) -> Result<FittedTransformation, PreprocessError> {
    match transformation {
        Transformation::Log { columns } => {
            let columns = select(table, target, columns, false);
            for name in &columns {
                table.numeric(name)?;
            }
            Ok(FittedTransformation::Log { columns })
        }
        Transformation::StandardScale { columns } => {
            let params = select(table, target, columns, false)
                .into_iter()
                .map(|name| {
                    let observed = observed(table, &name)?;
                    let mean = super::mean(&observed);
                    let std = super::std_dev(&observed, mean);
                    Ok(ScaleParams {
                        column: name,
                        offset: mean,
                        divisor: if std > 0.0 { std } else { 1.0 },
                    })
                })
                .collect::<Result<_, PreprocessError>>()?;
            Ok(FittedTransformation::Scale { params })
        }
        Transformation::MinMaxScale { columns } => {
            let params = select(table, target, columns, false)
                .into_iter()
                .map(|name| {
                    let observed = observed(table, &name)?;
                    let min = observed.iter().copied().fold(f64::INFINITY, f64::min);
                    let max = observed.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    let range = max - min;
                    Ok(ScaleParams {
                        column: name,
                        offset: min,
                        divisor: if range > 0.0 { range } else { 1.0 },
                    })
                })
                .collect::<Result<_, PreprocessError>>()?;
            Ok(FittedTransformation::Scale { params })
        }
        Transformation::OneHotEncode { columns } => {
            let encodings = select(table, target, columns, true)
                .into_iter()
                .map(|name| {
                    let column = table
                        .column(&name)
                        .ok_or_else(|| crate::data::TableError::MissingColumn(name.clone()))?;
                    let ColumnData::Categorical(values) = &column.data else {
                        return Err(PreprocessError::UnsupportedStrategy {
                            column: name,
                            strategy: "one_hot_encode".to_string(),
                        });
                    };
                    let mut categories: Vec<String> = values.iter().flatten().cloned().collect();
                    categories.sort();
                    categories.dedup();
                    Ok(Encoding {
                        column: name,
                        categories,
                    })
                })
                .collect::<Result<_, PreprocessError>>()?;
            Ok(FittedTransformation::OneHot { encodings })
        }
    }
}

fn observed(table: &Table, name: &str) -> Result<Vec<f64>, PreprocessError> {
    let observed: Vec<f64> = table.numeric(name)?.iter().flatten().copied().collect();
    if observed.is_empty() {
        return Err(PreprocessError::NoObservedValues {
            column: name.to_string(),
        });
    }
    Ok(observed)
}

fn apply_one(table: &Table, step: &FittedTransformation) -> Result<Table, PreprocessError> {
    let mut out = table.clone();
    match step {
        FittedTransformation::Log { columns } => {
            for name in columns {
                let values = table
                    .numeric(name)?
                    .iter()
                    .map(|v| match v {
                        Some(x) if *x < 0.0 => Err(PreprocessError::InvalidLog {
                            column: name.clone(),
                            value: *x,
                        }),
                        Some(x) => Ok(Some(x.ln_1p())),
                        None => Ok(None),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                out.set_column(Column::numeric(name.clone(), values))?;
            }
        }
        FittedTransformation::Scale { params } => {
            for p in params {
                let values = table
                    .numeric(&p.column)?
                    .iter()
                    .map(|v| v.map(|x| (x - p.offset) / p.divisor))
                    .collect();
                out.set_column(Column::numeric(p.column.clone(), values))?;
            }
        }
        FittedTransformation::OneHot { encodings } => {
            for encoding in encodings {
                let column = out.remove_column(&encoding.column)?;
                let ColumnData::Categorical(values) = column.data else {
                    return Err(PreprocessError::UnsupportedStrategy {
                        column: encoding.column.clone(),
                        strategy: "one_hot_encode".to_string(),
                    });
                };
                for category in &encoding.categories {
                    let indicator = values
                        .iter()
                        .map(|v| Some(if v.as_deref() == Some(category.as_str()) { 1.0 } else { 0.0 }))
                        .collect();
                    out.set_column(Column::numeric(
                        format!("{}={}", encoding.column, category),
                        indicator,
                    ))?;
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn train() -> Table {
        Table::new(vec![
            Column::numeric("sqft", vec![Some(0.0), Some(10.0), Some(20.0)]),
            Column::categorical(
                "city",
                vec![
                    Some("b".to_string()),
                    Some("a".to_string()),
                    Some("b".to_string()),
                ],
            ),
            Column::numeric("price", vec![Some(100.0), Some(200.0), Some(300.0)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_default_pipeline_encodes_then_scales() {
        let (transform, out) = FeatureTransform::fit(&train(), "price", &FeatureConfig::default()).unwrap();

        assert_eq!(
            transform.feature_columns(&out),
            vec!["sqft".to_string(), "city=a".to_string(), "city=b".to_string()]
        );
        // Target untouched.
        assert_eq!(out.numeric("price").unwrap(), train().numeric("price").unwrap());

        let sqft = out.numeric_complete("sqft").unwrap();
        let mean: f64 = sqft.iter().sum::<f64>() / 3.0;
        assert!(mean.abs() < 1e-12);
    }

    #[test]
    fn test_unknown_category_encodes_to_zeros() {
        let config = FeatureConfig {
            transformations: vec![Transformation::OneHotEncode { columns: vec![] }],
        };
        let (transform, _) = FeatureTransform::fit(&train(), "price", &config).unwrap();

        let unseen = Table::new(vec![
            Column::numeric("sqft", vec![Some(5.0)]),
            Column::categorical("city", vec![Some("zzz".to_string())]),
            Column::numeric("price", vec![None]),
        ])
        .unwrap();
        let out = transform.apply(&unseen).unwrap();
        assert_eq!(out.numeric("city=a").unwrap(), &[Some(0.0)]);
        assert_eq!(out.numeric("city=b").unwrap(), &[Some(0.0)]);
    }

    #[test]
    fn test_min_max_uses_train_parameters() {
        let config = FeatureConfig {
            transformations: vec![Transformation::MinMaxScale {
                columns: vec!["sqft".to_string()],
            }],
        };
        let (transform, out) = FeatureTransform::fit(&train(), "price", &config).unwrap();
        assert_eq!(out.numeric("sqft").unwrap(), &[Some(0.0), Some(0.5), Some(1.0)]);

        let other = Table::new(vec![Column::numeric("sqft", vec![Some(40.0)])]).unwrap();
        assert_eq!(transform.apply(&other).unwrap().numeric("sqft").unwrap(), &[Some(2.0)]);
    }

    #[test]
    fn test_log_rejects_negative() {
        let config = FeatureConfig {
            transformations: vec![Transformation::Log { columns: vec![] }],
        };
        let (transform, out) = FeatureTransform::fit(&train(), "price", &config).unwrap();
        assert_eq!(out.numeric("sqft").unwrap()[0], Some(0.0));

        let negative = Table::new(vec![Column::numeric("sqft", vec![Some(-1.0)])]).unwrap();
        assert!(matches!(
            transform.apply(&negative),
            Err(PreprocessError::InvalidLog { .. })
        ));
    }

    #[test]
    fn test_config_deserializes() {
        let config: FeatureConfig = serde_json::from_value(serde_json::json!({
            "transformations": [
                {"op": "log", "columns": ["sqft"]},
                {"op": "one_hot_encode"}
            ]
        }))
        .unwrap();
        assert_eq!(config.transformations.len(), 2);
        assert_eq!(
            config.transformations[1],
            Transformation::OneHotEncode { columns: vec![] }
        );
    }
}
