//! Testing utilities: synthetic housing data and instrumented steps.

use crate::core::{ArtifactValue, StepOutputs, ValueKind};
use crate::data::{Column, Table};
use crate::errors::StepError;
use crate::models::{LinearParams, ModelBundle, ModelSpec, TrainedModel};
use crate::preprocess::{FeatureConfig, FeatureTransform, FittedImputer, ImputeConfig};
use crate::steps::{outputs, SlotSpec, Step, StepContext};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const CITIES: [(&str, f64); 3] = [("austin", 0.0), ("denver", 25_000.0), ("seattle", 60_000.0)];

struct House {
    sqft: Option<f64>,
    bedrooms: f64,
    age: f64,
    city: &'static str,
    price: f64,
}

fn houses(rows: usize, seed: u64) -> Vec<House> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..rows)
        .map(|i| {
            let sqft = rng.gen_range(600.0_f64..3500.0).round();
            let bedrooms = f64::from(rng.gen_range(1_u8..=5));
            let age = f64::from(rng.gen_range(0_u8..80));
            let (city, premium) = CITIES[rng.gen_range(0..CITIES.len())];
            let noise = rng.gen_range(-15_000.0..15_000.0);
            let price = 40_000.0 + 160.0 * sqft + 12_000.0 * bedrooms - 600.0 * age + premium + noise;
            House {
                sqft: (i % 13 != 5).then_some(sqft),
                bedrooms,
                age,
                city,
                price: price.round(),
            }
        })
        .collect()
}

/// A deterministic housing table.
///
/// Columns: `sqft` (every 13th value missing), `bedrooms`, `age`, `city`
/// (categorical) and the target `price`.
#[allow(clippy::expect_used)]
#[must_use]
pub fn synthetic_housing(rows: usize, seed: u64) -> Table {
    let houses = houses(rows, seed);
    Table::new(vec![
        Column::numeric("sqft", houses.iter().map(|h| h.sqft).collect()),
        Column::numeric("bedrooms", houses.iter().map(|h| Some(h.bedrooms)).collect()),
        Column::numeric("age", houses.iter().map(|h| Some(h.age)).collect()),
        Column::categorical("city", houses.iter().map(|h| Some(h.city.to_string())).collect()),
        Column::numeric("price", houses.iter().map(|h| Some(h.price)).collect()),
    ])
    .expect("synthetic columns have equal length")
}

/// Writes the same data as [`synthetic_housing`] to a CSV file.
pub fn write_housing_csv(path: &Path, rows: usize, seed: u64) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["sqft", "bedrooms", "age", "city", "price"])?;
    for house in houses(rows, seed) {
        writer.write_record([
            house.sqft.map(|v| v.to_string()).unwrap_or_default(),
            house.bedrooms.to_string(),
            house.age.to_string(),
            house.city.to_string(),
            house.price.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// A linear model bundle fitted on [`synthetic_housing`] data.
#[allow(clippy::expect_used)]
#[must_use]
pub fn trained_bundle() -> ModelBundle {
    let train = synthetic_housing(200, 7);
    let imputer = FittedImputer::fit(&train, "price", &ImputeConfig::default())
        .expect("imputer fits synthetic data");
    let imputed = imputer.transform(&train).expect("imputer applies");
    let (transform, features) = FeatureTransform::fit(&imputed, "price", &FeatureConfig::default())
        .expect("features fit synthetic data");
    let columns = transform.feature_columns(&features);
    let model = TrainedModel::fit(
        &features,
        "price",
        columns,
        &ModelSpec::Linear(LinearParams::default()),
    )
    .expect("linear model fits synthetic data");
    ModelBundle::new(imputer, transform, model)
}

#[derive(Debug, Deserialize)]
struct CountingConfig {
    #[serde(default = "default_offset")]
    offset: f64,
}

fn default_offset() -> f64 {
    1.0
}

impl Default for CountingConfig {
    fn default() -> Self {
        Self {
            offset: default_offset(),
        }
    }
}

/// A step that counts its executions.
///
/// Outputs `value`: the sum of its scalar inputs plus the configured
/// `offset` (1.0 by default). Clones share the call counter.
#[derive(Debug, Clone)]
pub struct CountingStep {
    name: String,
    inputs: Vec<String>,
    calls: Arc<AtomicUsize>,
}

impl CountingStep {
    /// Creates a step with no inputs.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Declares a scalar input slot.
    #[must_use]
    pub fn with_input(mut self, slot: impl Into<String>) -> Self {
        self.inputs.push(slot.into());
        self
    }

    /// Number of executions so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Step for CountingStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<SlotSpec> {
        self.inputs
            .iter()
            .map(|slot| SlotSpec::new(slot.as_str(), ValueKind::Scalar))
            .collect()
    }

    fn outputs(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::new("value", ValueKind::Scalar)]
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutputs, StepError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let config: CountingConfig = ctx.config()?;
        let mut total = config.offset;
        for slot in &self.inputs {
            match ctx.inputs().get(slot)? {
                ArtifactValue::Scalar(v) => total += v,
                other => {
                    return Err(StepError::KindMismatch {
                        slot: slot.clone(),
                        expected: ValueKind::Scalar,
                        actual: other.kind(),
                    })
                }
            }
        }
        Ok(outputs([("value", ArtifactValue::Scalar(total))]))
    }
}

/// A step that always fails.
#[derive(Debug, Clone)]
pub struct FailingStep {
    name: String,
    inputs: Vec<String>,
}

impl FailingStep {
    /// Creates a failing step with no inputs.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
        }
    }

    /// Declares a scalar input slot.
    #[must_use]
    pub fn with_input(mut self, slot: impl Into<String>) -> Self {
        self.inputs.push(slot.into());
        self
    }
}

#[async_trait]
impl Step for FailingStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<SlotSpec> {
        self.inputs
            .iter()
            .map(|slot| SlotSpec::new(slot.as_str(), ValueKind::Scalar))
            .collect()
    }

    fn outputs(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::new("value", ValueKind::Scalar)]
    }

    async fn execute(&self, _ctx: &StepContext) -> Result<StepOutputs, StepError> {
        Err(StepError::InvalidConfig(format!("{} always fails", self.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_housing_is_deterministic() {
        let a = synthetic_housing(50, 3);
        assert_eq!(a, synthetic_housing(50, 3));
        assert_ne!(a, synthetic_housing(50, 4));
        assert_eq!(a.num_rows(), 50);
        assert_eq!(a.column_names(), vec!["sqft", "bedrooms", "age", "city", "price"]);
        assert_eq!(a.column("sqft").unwrap().data.missing_count(), 4);
    }

    #[test]
    fn test_csv_matches_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("houses.csv");
        write_housing_csv(&path, 30, 9).unwrap();
        let loaded = crate::data::load_csv(&path, &crate::data::CsvOptions::default()).unwrap();
        assert_eq!(loaded, synthetic_housing(30, 9));
    }

    #[test]
    fn test_trained_bundle_scores_records() {
        let bundle = trained_bundle();
        let record = [("sqft".to_string(), serde_json::json!(1500.0))].into_iter().collect();
        let predictions = bundle.predict_records(&[record]).unwrap();
        assert!(predictions[0].is_finite());
    }
}
