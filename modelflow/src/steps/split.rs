//! Train/validation/test split.

use super::{outputs, SlotSpec, Step, StepContext};
use crate::core::{ArtifactValue, StepOutputs};
use crate::errors::StepError;
use crate::preprocess::{split_table, SplitConfig};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Partitions the raw table with a seeded shuffle.
#[derive(Debug, Default)]
pub struct SplitStep;

#[async_trait]
impl Step for SplitStep {
    fn name(&self) -> &str {
        "split"
    }

    fn inputs(&self) -> Vec<SlotSpec> {
        vec![SlotSpec::table("table")]
    }

    fn outputs(&self) -> Vec<SlotSpec> {
        vec![
            SlotSpec::table("train"),
            SlotSpec::table("validation"),
            SlotSpec::table("test"),
        ]
    }

    #[allow(clippy::cast_precision_loss)]
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutputs, StepError> {
        let config: SplitConfig = ctx.config()?;
        let table = ctx.inputs().table("table")?;
        let (train, validation, test) = split_table(table, &config)?;

        ctx.log_params(serde_json::to_value(&config).unwrap_or_default());
        ctx.log_metrics(BTreeMap::from([
            ("train_rows".to_string(), train.num_rows() as f64),
            ("validation_rows".to_string(), validation.num_rows() as f64),
            ("test_rows".to_string(), test.num_rows() as f64),
        ]));

        Ok(outputs([
            ("train", ArtifactValue::Table(train)),
            ("validation", ArtifactValue::Table(validation)),
            ("test", ArtifactValue::Table(test)),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::{InputSource, StepInputs};
    use crate::testing::synthetic_housing;
    use crate::tracking::{NoOpTracker, RunContext};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_split_sizes() {
        let inputs = StepInputs::new().with(
            "table",
            ArtifactValue::Table(synthetic_housing(100, 1)),
            InputSource::Constant,
        );
        let ctx = StepContext::new(
            "split",
            serde_json::json!({"validation_ratio": 0.2, "test_ratio": 0.1, "seed": 3}),
            inputs,
            RunContext::open("test", Arc::new(NoOpTracker)),
        );
        let out = SplitStep.execute(&ctx).await.unwrap();

        let rows = |slot: &str| match out.get(slot) {
            Some(ArtifactValue::Table(t)) => t.num_rows(),
            _ => usize::MAX,
        };
        assert_eq!((rows("train"), rows("validation"), rows("test")), (70, 20, 10));
    }
}
