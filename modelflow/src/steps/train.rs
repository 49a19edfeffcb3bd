//! Training, evaluation and packaging steps.

use super::{outputs, SlotSpec, Step, StepContext};
use crate::core::{ArtifactValue, StepOutputs, ValueKind};
use crate::errors::StepError;
use crate::models::{ModelBundle, ModelSpec, TrainedModel};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Configuration of the `train_model` behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TrainConfig {
    /// Target column.
    pub target: String,
    /// Model family and hyperparameters.
    #[serde(default)]
    pub model: ModelSpec,
}

/// Fits the configured model family on the engineered train partition.
#[derive(Debug, Default)]
pub struct TrainModelStep;

#[async_trait]
impl Step for TrainModelStep {
    fn name(&self) -> &str {
        "train_model"
    }

    fn inputs(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::table("train"), SlotSpec::table("validation")]
    }

    fn outputs(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::new("model", ValueKind::Model)]
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutputs, StepError> {
        let config: TrainConfig = ctx.config()?;
        let train = ctx.inputs().table("train")?;
        let validation = ctx.inputs().table("validation")?;

        let features = train.numeric_columns(&config.target);
        let spec = config.model.clone();
        let target = config.target.clone();
        let fit_table = train.clone();
        let model = tokio::task::spawn_blocking(move || {
            TrainedModel::fit(&fit_table, &target, features, &spec)
        })
        .await??;

        ctx.log_params(serde_json::json!({
            "model": config.model.params(),
            "feature_count": model.feature_columns.len(),
        }));
        if !validation.is_empty() {
            let metrics = model.evaluate(validation)?;
            ctx.log_metrics(metrics.to_map("validation"));
            info!(step = ctx.step(), rmse = metrics.rmse, r2 = metrics.r2, "Validation metrics");
        }

        Ok(outputs([("model", ArtifactValue::Model(model))]))
    }
}

/// Scores the model on the test partition.
#[derive(Debug, Default)]
pub struct EvaluateModelStep;

#[async_trait]
impl Step for EvaluateModelStep {
    fn name(&self) -> &str {
        "evaluate_model"
    }

    fn inputs(&self) -> Vec<SlotSpec> {
        vec![
            SlotSpec::new("model", ValueKind::Model),
            SlotSpec::table("test"),
        ]
    }

    fn outputs(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::new("metrics", ValueKind::Metrics)]
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutputs, StepError> {
        let model = ctx.inputs().model("model")?;
        let test = ctx.inputs().table("test")?;

        let metrics = model.evaluate(test)?;
        let map = metrics.to_map("");
        ctx.log_metrics(map.clone());
        info!(
            step = ctx.step(),
            rmse = metrics.rmse,
            mae = metrics.mae,
            r2 = metrics.r2,
            "Test metrics"
        );

        Ok(outputs([("metrics", ArtifactValue::Metrics(map))]))
    }
}

/// Bundles the fitted components into a deployable model.
#[derive(Debug, Default)]
pub struct PackageModelStep;

#[async_trait]
impl Step for PackageModelStep {
    fn name(&self) -> &str {
        "package_model"
    }

    fn inputs(&self) -> Vec<SlotSpec> {
        vec![
            SlotSpec::new("imputer", ValueKind::Imputer),
            SlotSpec::new("transform", ValueKind::Transform),
            SlotSpec::new("model", ValueKind::Model),
        ]
    }

    fn outputs(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::new("bundle", ValueKind::Bundle)]
    }

    async fn execute(&self, ctx: &StepContext) -> Result<StepOutputs, StepError> {
        let inputs = ctx.inputs();
        let bundle = ModelBundle::new(
            inputs.imputer("imputer")?.clone(),
            inputs.transform("transform")?.clone(),
            inputs.model("model")?.clone(),
        );
        bundle.validate()?;
        ctx.log_params(serde_json::json!({
            "family": bundle.model.model.family(),
            "input_columns": bundle.input_schema.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        }));

        Ok(outputs([("bundle", ArtifactValue::Bundle(bundle))]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Column, Table};
    use crate::models::LinearParams;
    use crate::steps::{InputSource, StepInputs};
    use crate::tracking::{InMemoryTracker, RunContext};
    use serde_json::json;
    use std::sync::Arc;

    fn linear_table(n: i32) -> Table {
        Table::new(vec![
            Column::numeric("x", (0..n).map(|i| Some(f64::from(i))).collect()),
            Column::numeric("y", (0..n).map(|i| Some(2.0 * f64::from(i) + 1.0)).collect()),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_train_then_evaluate() {
        let tracker = Arc::new(InMemoryTracker::new());
        let run = RunContext::open("test", tracker.clone());
        let ctx = StepContext::new(
            "train",
            json!({"target": "y", "model": {"family": "linear", "alpha": 0.0}}),
            StepInputs::new()
                .with("train", ArtifactValue::Table(linear_table(20)), InputSource::Constant)
                .with("validation", ArtifactValue::Table(linear_table(5)), InputSource::Constant),
            run.clone(),
        );
        let out = TrainModelStep.execute(&ctx).await.unwrap();
        let model = out.get("model").cloned().unwrap();
        assert!(tracker
            .metrics_for(run.run_id())
            .contains_key("train.validation_rmse"));

        let ctx = StepContext::new(
            "evaluate",
            serde_json::Value::Null,
            StepInputs::new()
                .with("model", model, InputSource::Constant)
                .with("test", ArtifactValue::Table(linear_table(8)), InputSource::Constant),
            run,
        );
        let out = EvaluateModelStep.execute(&ctx).await.unwrap();
        let Some(ArtifactValue::Metrics(metrics)) = out.get("metrics") else {
            panic!("missing metrics");
        };
        assert!(metrics["rmse"] < 1e-6);
        assert!((metrics["r2"] - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_evaluate_on_empty_test_fails() {
        let model = TrainedModel::fit(
            &linear_table(10),
            "y",
            vec!["x".to_string()],
            &ModelSpec::Linear(LinearParams::default()),
        )
        .unwrap();
        let ctx = StepContext::new(
            "evaluate",
            serde_json::Value::Null,
            StepInputs::new()
                .with("model", ArtifactValue::Model(model), InputSource::Constant)
                .with("test", ArtifactValue::Table(linear_table(0)), InputSource::Constant),
            RunContext::open("test", Arc::new(InMemoryTracker::new())),
        );
        assert!(matches!(
            EvaluateModelStep.execute(&ctx).await,
            Err(StepError::Model(_))
        ));
    }
}
