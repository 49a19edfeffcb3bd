//! Statistical outlier filtering.

use super::PreprocessError;
use crate::data::Table;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rule deciding which values are outliers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum OutlierRule {
    /// Outside `[q1 - k*iqr, q3 + k*iqr]`.
    Iqr {
        /// The IQR multiplier `k`.
        #[serde(default = "default_multiplier")]
        multiplier: f64,
    },
    /// Further than `threshold` standard deviations from the mean.
    ZScore {
        /// The z-score threshold.
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
}

fn default_multiplier() -> f64 {
    1.5
}

fn default_threshold() -> f64 {
    3.0
}

impl Default for OutlierRule {
    fn default() -> Self {
        Self::Iqr {
            multiplier: default_multiplier(),
        }
    }
}

/// Outlier filtering settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierConfig {
    /// Whether the filter is part of the pipeline.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// The rule to apply.
    #[serde(default)]
    pub rule: OutlierRule,
    /// Numeric columns to inspect; empty means every numeric column.
    #[serde(default)]
    pub columns: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            rule: OutlierRule::default(),
            columns: Vec::new(),
        }
    }
}

/// Result of an outlier pass.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierReport {
    /// Rows kept.
    pub table: Table,
    /// Number of rows removed.
    pub removed: usize,
    /// Inclusive bounds used per column.
    pub bounds: BTreeMap<String, (f64, f64)>,
}

/// Removes rows with an outlying value in any inspected column.
///
/// Missing values are never flagged.
pub fn remove_outliers(table: &Table, config: &OutlierConfig) -> Result<OutlierReport, PreprocessError> {
    let columns = if config.columns.is_empty() {
        table.numeric_columns("")
    } else {
        config.columns.clone()
    };

    let mut keep = vec![true; table.num_rows()];
    let mut bounds = BTreeMap::new();

    for name in &columns {
        let values = table.numeric(name)?;
        let observed: Vec<f64> = values.iter().flatten().copied().collect();
        let Some((lo, hi)) = column_bounds(&observed, &config.rule) else {
            continue;
        };
        for (row, value) in values.iter().enumerate() {
            if let Some(v) = value {
                if *v < lo || *v > hi {
                    keep[row] = false;
                }
            }
        }
        bounds.insert(name.clone(), (lo, hi));
    }

    let removed = keep.iter().filter(|k| !**k).count();
    Ok(OutlierReport {
        table: table.filter(&keep),
        removed,
        bounds,
    })
}

fn column_bounds(observed: &[f64], rule: &OutlierRule) -> Option<(f64, f64)> {
    if observed.is_empty() {
        return None;
    }
    match rule {
        OutlierRule::Iqr { multiplier } => {
            let mut sorted = observed.to_vec();
            sorted.sort_by(f64::total_cmp);
            let q1 = quantile(&sorted, 0.25);
            let q3 = quantile(&sorted, 0.75);
            let iqr = q3 - q1;
            Some((q1 - multiplier * iqr, q3 + multiplier * iqr))
        }
        OutlierRule::ZScore { threshold } => {
            let mean = super::mean(observed);
            let std = super::std_dev(observed, mean);
            if std == 0.0 {
                return None;
            }
            Some((mean - threshold * std, mean + threshold * std))
        }
    }
}

/// Linear-interpolated quantile of sorted data.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;

    fn table() -> Table {
        let mut values: Vec<Option<f64>> = (1..=9).map(|i| Some(f64::from(i))).collect();
        values.push(Some(1000.0));
        values.push(None);
        let len = values.len();
        Table::new(vec![
            Column::numeric("sqft", values),
            Column::numeric("price", vec![Some(1.0); len]),
        ])
        .unwrap()
    }

    #[test]
    fn test_iqr_removes_extreme_value() {
        let report = remove_outliers(&table(), &OutlierConfig::default()).unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.table.num_rows(), 10);
        assert!(report.table.numeric("sqft").unwrap().iter().all(|v| *v != Some(1000.0)));
    }

    #[test]
    fn test_quantile_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile(&sorted, 0.5) - 2.5).abs() < 1e-12);
        assert!((quantile(&sorted, 0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zscore_with_constant_column_keeps_all() {
        let config = OutlierConfig {
            rule: OutlierRule::ZScore { threshold: 2.0 },
            columns: vec!["price".to_string()],
            ..OutlierConfig::default()
        };
        let report = remove_outliers(&table(), &config).unwrap();
        assert_eq!(report.removed, 0);
        assert!(report.bounds.is_empty());
    }

    #[test]
    fn test_unknown_column_errors() {
        let config = OutlierConfig {
            columns: vec!["missing".to_string()],
            ..OutlierConfig::default()
        };
        assert!(remove_outliers(&table(), &config).is_err());
    }

    #[test]
    fn test_rule_deserializes_with_defaults() {
        let rule: OutlierRule = serde_json::from_str(r#"{"rule": "z_score"}"#).unwrap();
        assert_eq!(rule, OutlierRule::ZScore { threshold: 3.0 });
    }
}
