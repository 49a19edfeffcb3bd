//! Imputation, outlier removal and feature engineering steps.
//!
//! Each fitted component is learned from the train partition only.

use super::{outputs, SlotSpec, Step, StepContext};
use crate::core::{ArtifactValue, StepOutputs, ValueKind};
use crate::errors::StepError;
use crate::preprocess::{
    drop_missing_target, remove_outliers, FeatureConfig, FeatureTransform, FittedImputer,
    ImputeConfig, OutlierConfig, PreprocessError,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

fn partitions() -> Vec<SlotSpec> {
    vec![
        SlotSpec::table("train"),
        SlotSpec::table("validation"),
        SlotSpec::table("test"),
    ]
}

/// Configuration of the `impute` behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ImputeStepConfig {
    /// Target column; rows missing it are dropped, it is never imputed.
    pub target: String,
    /// Strategies.
    #[serde(default)]
    pub imputation: ImputeConfig,
}

/// Drops rows without a target and fills missing feature values.
#[derive(Debug, Default)]
pub struct ImputeStep;

#[async_trait]
impl Step for ImputeStep {
    fn name(&self) -> &str {
        "impute"
    }

    fn inputs(&self) -> Vec<SlotSpec> {
        partitions()
    }

    fn outputs(&self) -> Vec<SlotSpec> {
        let mut slots = partitions();
        slots.push(SlotSpec::new("imputer", ValueKind::Imputer));
        slots
    }

    #[allow(clippy::cast_precision_loss)]
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutputs, StepError> {
        let config: ImputeStepConfig = ctx.config()?;
        let inputs = ctx.inputs();

        let train = drop_missing_target(inputs.table("train")?, &config.target)?;
        let validation = drop_missing_target(inputs.table("validation")?, &config.target)?;
        let test = drop_missing_target(inputs.table("test")?, &config.target)?;
        if train.is_empty() {
            return Err(PreprocessError::EmptyTrain.into());
        }

        let imputer = FittedImputer::fit(&train, &config.target, &config.imputation)?;
        let dropped = inputs.table("train")?.num_rows() - train.num_rows();
        ctx.log_params(serde_json::to_value(&config.imputation).unwrap_or_default());
        ctx.log_metrics(BTreeMap::from([(
            "train_rows_without_target".to_string(),
            dropped as f64,
        )]));

        Ok(outputs([
            ("train", ArtifactValue::Table(imputer.transform(&train)?)),
            ("validation", ArtifactValue::Table(imputer.transform(&validation)?)),
            ("test", ArtifactValue::Table(imputer.transform(&test)?)),
            ("imputer", ArtifactValue::Imputer(imputer)),
        ]))
    }
}

/// Removes outlying rows from the train partition.
#[derive(Debug, Default)]
pub struct RemoveOutliersStep;

#[async_trait]
impl Step for RemoveOutliersStep {
    fn name(&self) -> &str {
        "remove_outliers"
    }

    fn inputs(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::table("train")]
    }

    fn outputs(&self) -> Vec<SlotSpec> {
        vec![
            SlotSpec::table("train"),
            SlotSpec::new("removed", ValueKind::Scalar),
        ]
    }

    #[allow(clippy::cast_precision_loss)]
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutputs, StepError> {
        let config: OutlierConfig = ctx.config()?;
        let report = remove_outliers(ctx.inputs().table("train")?, &config)?;
        if report.table.is_empty() {
            return Err(PreprocessError::EmptyTrain.into());
        }

        let removed = report.removed as f64;
        ctx.log_params(serde_json::to_value(&config.rule).unwrap_or_default());
        ctx.log_metrics(BTreeMap::from([("removed".to_string(), removed)]));
        info!(step = ctx.step(), removed = report.removed, "Removed outliers");

        Ok(outputs([
            ("train", ArtifactValue::Table(report.table)),
            ("removed", ArtifactValue::Scalar(removed)),
        ]))
    }
}

/// Configuration of the `engineer_features` behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FeatureStepConfig {
    /// Target column; never transformed.
    pub target: String,
    /// Transformations.
    #[serde(default)]
    pub features: FeatureConfig,
}

/// Fits the feature transformations on train and applies them everywhere.
#[derive(Debug, Default)]
pub struct EngineerFeaturesStep;

#[async_trait]
impl Step for EngineerFeaturesStep {
    fn name(&self) -> &str {
        "engineer_features"
    }

    fn inputs(&self) -> Vec<SlotSpec> {
        partitions()
    }

    fn outputs(&self) -> Vec<SlotSpec> {
        let mut slots = partitions();
        slots.push(SlotSpec::new("transform", ValueKind::Transform));
        slots
    }

    #[allow(clippy::cast_precision_loss)]
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutputs, StepError> {
        let config: FeatureStepConfig = ctx.config()?;
        let inputs = ctx.inputs();

        let (transform, train) =
            FeatureTransform::fit(inputs.table("train")?, &config.target, &config.features)?;
        let validation = transform.apply(inputs.table("validation")?)?;
        let test = transform.apply(inputs.table("test")?)?;

        let features = transform.feature_columns(&train);
        ctx.log_params(serde_json::json!({
            "transformations": config.features.transformations,
            "feature_columns": features,
        }));
        ctx.log_metrics(BTreeMap::from([(
            "feature_count".to_string(),
            features.len() as f64,
        )]));

        Ok(outputs([
            ("train", ArtifactValue::Table(train)),
            ("validation", ArtifactValue::Table(validation)),
            ("test", ArtifactValue::Table(test)),
            ("transform", ArtifactValue::Transform(transform)),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Column, Table};
    use crate::steps::{InputSource, StepInputs};
    use crate::tracking::{InMemoryTracker, RunContext};
    use serde_json::json;
    use std::sync::Arc;

    fn partitioned(train: Table, other: Table) -> StepInputs {
        StepInputs::new()
            .with("train", ArtifactValue::Table(train), InputSource::Constant)
            .with("validation", ArtifactValue::Table(other.clone()), InputSource::Constant)
            .with("test", ArtifactValue::Table(other), InputSource::Constant)
    }

    fn table(sqft: Vec<Option<f64>>, price: Vec<Option<f64>>) -> Table {
        Table::new(vec![Column::numeric("sqft", sqft), Column::numeric("price", price)]).unwrap()
    }

    fn run() -> (Arc<InMemoryTracker>, Arc<RunContext>) {
        let tracker = Arc::new(InMemoryTracker::new());
        let run = RunContext::open("test", tracker.clone());
        (tracker, run)
    }

    #[tokio::test]
    async fn test_impute_drops_missing_target_and_fits_on_train() {
        let train = table(
            vec![Some(1.0), None, Some(3.0), Some(100.0)],
            vec![Some(10.0), Some(20.0), Some(30.0), None],
        );
        let other = table(vec![None], vec![Some(5.0)]);
        let (_, run) = run();
        let ctx = StepContext::new(
            "impute",
            json!({"target": "price", "imputation": {"numeric_default": {"strategy": "mean"}}}),
            partitioned(train, other),
            run,
        );

        let out = ImputeStep.execute(&ctx).await.unwrap();
        let Some(ArtifactValue::Table(train)) = out.get("train") else {
            panic!("missing train");
        };
        // The row without a target is gone, so 100.0 never enters the mean.
        assert_eq!(train.num_rows(), 3);
        assert_eq!(train.numeric("sqft").unwrap()[1], Some(2.0));

        let Some(ArtifactValue::Table(test)) = out.get("test") else {
            panic!("missing test");
        };
        assert_eq!(test.numeric("sqft").unwrap(), &[Some(2.0)]);
        assert!(matches!(out.get("imputer"), Some(ArtifactValue::Imputer(_))));
    }

    #[tokio::test]
    async fn test_outlier_step_reports_removed_count() {
        let mut sqft: Vec<Option<f64>> = (1..=9).map(|i| Some(f64::from(i))).collect();
        sqft.push(Some(500.0));
        let price = vec![Some(1.0); 10];
        let (tracker, run) = run();
        let ctx = StepContext::new(
            "outliers",
            json!({"columns": ["sqft"]}),
            StepInputs::new().with(
                "train",
                ArtifactValue::Table(table(sqft, price)),
                InputSource::Constant,
            ),
            run.clone(),
        );

        let out = RemoveOutliersStep.execute(&ctx).await.unwrap();
        assert_eq!(out.get("removed"), Some(&ArtifactValue::Scalar(1.0)));
        assert_eq!(
            tracker.metrics_for(run.run_id()).get("outliers.removed"),
            Some(&1.0)
        );
    }

    #[tokio::test]
    async fn test_features_step_leaves_target() {
        let train = table(vec![Some(1.0), Some(3.0)], vec![Some(10.0), Some(30.0)]);
        let other = table(vec![Some(5.0)], vec![Some(50.0)]);
        let (_, run) = run();
        let ctx = StepContext::new(
            "features",
            json!({"target": "price"}),
            partitioned(train, other),
            run,
        );

        let out = EngineerFeaturesStep.execute(&ctx).await.unwrap();
        let Some(ArtifactValue::Table(test)) = out.get("test") else {
            panic!("missing test");
        };
        assert_eq!(test.numeric("price").unwrap(), &[Some(50.0)]);
        // Scaled with train mean 2 and std 1.
        assert_eq!(test.numeric("sqft").unwrap(), &[Some(3.0)]);
    }
}
