//! The standard house-price training graph.

use super::{PipelineBuilder, PipelineGraph, StepSpec};
use crate::config::PipelineConfig;
use crate::errors::ModelflowError;
use crate::steps::StepRegistry;
use serde_json::json;

/// Node names of the standard graph.
pub mod nodes {
    /// Loads the CSV file.
    pub const INGEST: &str = "ingest";
    /// Partitions rows.
    pub const SPLIT: &str = "split";
    /// Fills missing values.
    pub const IMPUTE: &str = "impute";
    /// Filters outlying train rows.
    pub const OUTLIERS: &str = "outliers";
    /// Engineers features.
    pub const FEATURES: &str = "features";
    /// Fits the model.
    pub const TRAIN: &str = "train";
    /// Scores the test partition.
    pub const EVALUATE: &str = "evaluate";
    /// Assembles the bundle.
    pub const PACKAGE: &str = "package";
    /// Deploys the bundle.
    pub const DEPLOY: &str = "deploy";
}

/// Builds the training graph described by `config`.
///
/// `ingest -> split -> impute -> [outliers] -> features -> train -> evaluate`,
/// with `package` reading the fitted imputer, transform and model and
/// `deploy` (when enabled) reading the bundle and the test metrics.
pub fn training_pipeline(
    config: &PipelineConfig,
    registry: &StepRegistry,
) -> Result<PipelineGraph, ModelflowError> {
    use nodes::{DEPLOY, EVALUATE, FEATURES, IMPUTE, INGEST, OUTLIERS, PACKAGE, SPLIT, TRAIN};

    let target = &config.data.target;
    let mut builder = PipelineBuilder::new(&config.name)
        .step(
            StepSpec::new(INGEST, registry.get("ingest_csv")?).with_config(json!({
                "path": config.data.path,
                "target": target,
                "categorical": config.data.categorical,
                "delimiter": config.data.delimiter,
            })),
        )
        .step(
            StepSpec::new(SPLIT, registry.get("split")?)
                .bind("table", INGEST, "table")
                .with_config(serde_json::to_value(&config.split).map_err(config_error)?),
        )
        .step(
            StepSpec::new(IMPUTE, registry.get("impute")?)
                .bind_from("train", SPLIT)
                .bind_from("validation", SPLIT)
                .bind_from("test", SPLIT)
                .with_config(json!({"target": target, "imputation": config.imputation})),
        );

    let train_source = if config.outliers.enabled {
        builder.add_step(
            StepSpec::new(OUTLIERS, registry.get("remove_outliers")?)
                .bind_from("train", IMPUTE)
                .with_config(serde_json::to_value(&config.outliers).map_err(config_error)?),
        );
        OUTLIERS
    } else {
        IMPUTE
    };

    builder = builder
        .step(
            StepSpec::new(FEATURES, registry.get("engineer_features")?)
                .bind_from("train", train_source)
                .bind_from("validation", IMPUTE)
                .bind_from("test", IMPUTE)
                .with_config(json!({"target": target, "features": config.features})),
        )
        .step(
            StepSpec::new(TRAIN, registry.get("train_model")?)
                .bind_from("train", FEATURES)
                .bind_from("validation", FEATURES)
                .with_config(json!({"target": target, "model": config.model})),
        )
        .step(
            StepSpec::new(EVALUATE, registry.get("evaluate_model")?)
                .bind_from("model", TRAIN)
                .bind_from("test", FEATURES),
        )
        .step(
            StepSpec::new(PACKAGE, registry.get("package_model")?)
                .bind_from("imputer", IMPUTE)
                .bind_from("transform", FEATURES)
                .bind_from("model", TRAIN),
        );

    if config.deploy.enabled {
        builder.add_step(
            StepSpec::new(DEPLOY, registry.get("deploy_model")?)
                .bind_from("bundle", PACKAGE)
                .bind_from("metrics", EVALUATE)
                .with_config(serde_json::to_value(config.deploy.gate()).map_err(config_error)?),
        );
    }

    builder.build()
}

fn config_error(e: serde_json::Error) -> ModelflowError {
    crate::config::ConfigError::Parse(e).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serving::ModelDeployer;
    use std::sync::Arc;

    fn registry() -> StepRegistry {
        StepRegistry::standard(Arc::new(ModelDeployer::default()))
    }

    fn config() -> PipelineConfig {
        PipelineConfig::from_json(r#"{"data": {"path": "houses.csv"}}"#).unwrap()
    }

    #[test]
    fn test_default_graph_order() {
        let graph = training_pipeline(&config(), &registry()).unwrap();
        assert_eq!(
            graph.execution_order(),
            &["ingest", "split", "impute", "outliers", "features", "train", "evaluate", "package"]
        );
    }

    #[test]
    fn test_optional_nodes() {
        let mut config = config();
        config.outliers.enabled = false;
        config.deploy.enabled = true;
        let graph = training_pipeline(&config, &registry()).unwrap();

        assert!(graph.node("outliers").is_none());
        assert_eq!(graph.execution_order().last().map(String::as_str), Some("deploy"));
        assert_eq!(graph.node("deploy").unwrap().config["enabled"], true);
    }

    #[test]
    fn test_unknown_behaviour() {
        let err = training_pipeline(&config(), &StepRegistry::new()).unwrap_err();
        assert!(matches!(err, ModelflowError::Validation(_)));
    }
}
