//! End-to-end tests of the training graph over a CSV file.

use super::{training_pipeline, Externals, PipelineExecutor, RunResult};
use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::core::{ArtifactValue, RunStatus};
use crate::errors::ModelflowError;
use crate::models::{LinearParams, ModelSpec};
use crate::serving::{DeploymentState, ModelDeployer, PredictionRequest, Predictor};
use crate::steps::StepRegistry;
use crate::store::{FileArtifactStore, InMemoryArtifactStore};
use crate::testing::write_housing_csv;
use crate::tracking::{EventKind, InMemoryTracker, NoOpTracker};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    config: PipelineConfig,
    deployer: Arc<ModelDeployer>,
    registry: StepRegistry,
    tracker: Arc<InMemoryTracker>,
    executor: PipelineExecutor,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("houses.csv");
        write_housing_csv(&path, 300, 11).unwrap();

        let mut config = PipelineConfig::default();
        config.data.path = path;
        let deployer = Arc::new(ModelDeployer::default());
        let tracker = Arc::new(InMemoryTracker::new());
        Self {
            _dir: dir,
            config,
            registry: StepRegistry::standard(Arc::clone(&deployer)),
            deployer,
            executor: PipelineExecutor::new(Arc::new(InMemoryArtifactStore::new()), tracker.clone()),
            tracker,
        }
    }

    async fn run(&self) -> Result<RunResult, ModelflowError> {
        let graph = training_pipeline(&self.config, &self.registry)?;
        self.executor
            .run(&graph, &Externals::new(), &CancellationToken::new())
            .await
    }
}

#[tokio::test]
async fn test_training_run_then_cached_rerun() {
    let harness = Harness::new();

    let first = harness.run().await.unwrap();
    assert_eq!(
        first.executed(),
        vec!["ingest", "split", "impute", "outliers", "features", "train", "evaluate", "package"]
    );
    let metrics = harness.tracker.metrics_for(first.run_id);
    assert!(metrics["evaluate.r2"] > 0.5, "test r2 {}", metrics["evaluate.r2"]);
    assert!(metrics.contains_key("train.validation_rmse"));
    assert!(matches!(first.output("package", "bundle"), Some(ArtifactValue::Bundle(_))));

    // The file is unchanged, so ingest reproduces the same artifact.
    let second = harness.run().await.unwrap();
    assert_eq!(second.executed(), vec!["ingest"]);
    assert_eq!(second.cached().len(), 7);
    assert_eq!(
        second.report("package").unwrap().artifact,
        first.report("package").unwrap().artifact
    );
    assert_eq!(second.report("ingest").unwrap().artifact.version, 1);
}

#[tokio::test]
async fn test_model_change_reruns_model_steps_only() {
    let mut harness = Harness::new();
    harness.run().await.unwrap();

    harness.config.model = ModelSpec::Linear(LinearParams::default());
    let second = harness.run().await.unwrap();
    assert_eq!(second.executed(), vec!["ingest", "train", "evaluate", "package"]);
    assert_eq!(second.report("package").unwrap().artifact.version, 2);
}

#[tokio::test]
async fn test_changed_data_reruns_everything() {
    let harness = Harness::new();
    harness.run().await.unwrap();

    write_housing_csv(&harness.config.data.path, 300, 12).unwrap();
    let second = harness.run().await.unwrap();
    assert_eq!(second.cached(), Vec::<&str>::new());
    assert_eq!(second.report("ingest").unwrap().artifact.version, 2);
}

async fn run_on_file_store(harness: &Harness, root: &std::path::Path) -> RunResult {
    let store = FileArtifactStore::open(root).await.unwrap();
    let graph = training_pipeline(&harness.config, &harness.registry).unwrap();
    PipelineExecutor::new(Arc::new(store), Arc::new(NoOpTracker))
        .run(&graph, &Externals::new(), &CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_independent_stores_produce_identical_artifacts() {
    let harness = Harness::new();
    let (left, right) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());

    let first = run_on_file_store(&harness, left.path()).await;
    let second = run_on_file_store(&harness, right.path()).await;
    for (a, b) in first.steps.iter().zip(&second.steps) {
        assert_eq!(a.artifact.fingerprint, b.artifact.fingerprint, "step {}", a.name);
    }
    assert_eq!(first.outputs, second.outputs);

    // Reading back from disk yields the bundle computed in memory.
    let resumed = run_on_file_store(&harness, left.path()).await;
    assert_eq!(resumed.executed(), vec!["ingest"]);
    assert_eq!(
        resumed.output("package", "bundle"),
        second.output("package", "bundle")
    );
    assert_eq!(resumed.outputs, first.outputs);
}

#[tokio::test]
async fn test_without_outlier_filter() {
    let mut harness = Harness::new();
    harness.config.outliers.enabled = false;
    let result = harness.run().await.unwrap();
    assert!(result.report("outliers").is_none());
    assert_eq!(result.steps.len(), 7);
}

#[tokio::test]
async fn test_failure_names_step_and_closes_run_once() {
    let mut harness = Harness::new();
    harness.config.data.target = "missing_column".to_string();

    let err = harness.run().await.unwrap_err();
    match err {
        ModelflowError::StepExecution(e) => assert_eq!(e.step, "ingest"),
        other => panic!("unexpected error {other}"),
    }

    let run_id = harness.tracker.runs()[0];
    assert_eq!(harness.tracker.status_of(run_id), Some(RunStatus::Failed));
    let closes = harness
        .tracker
        .events_for(run_id)
        .into_iter()
        .filter(|e| matches!(e.kind, EventKind::RunClosed { .. }))
        .count();
    assert_eq!(closes, 1);
}

#[tokio::test]
async fn test_deploy_serves_predictions() {
    let mut harness = Harness::new();
    harness.config.deploy.enabled = true;

    let first = harness.run().await.unwrap();
    let deployment = match first.output("deploy", "deployment") {
        Some(ArtifactValue::Json(v)) => v.clone(),
        other => panic!("unexpected deployment output {other:?}"),
    };
    assert_eq!(deployment["deployed"], true);

    let status = harness.deployer.status();
    assert_eq!(status.state, DeploymentState::Running);
    let endpoint = status.endpoint.clone().unwrap();
    let response = Predictor::new(&endpoint)
        .unwrap()
        .predict(
            &PredictionRequest::new()
                .with("sqft", 1800.0)
                .unwrap()
                .with_category("city", "denver"),
        )
        .await
        .unwrap();
    assert!(response.prediction.is_finite());
    assert_eq!(response.model.step, "package");

    // Redeploying the same bundle version keeps the running service.
    let second = harness.run().await.unwrap();
    assert_eq!(second.executed(), vec!["ingest", "deploy"]);
    assert_eq!(harness.deployer.status().generation, status.generation);
    assert_eq!(harness.deployer.status().endpoint, Some(endpoint));

    harness.deployer.teardown().await;
}

#[tokio::test]
async fn test_quality_gate_blocks_deployment() {
    let mut harness = Harness::new();
    harness.config.deploy.enabled = true;
    harness.config.deploy.min_r2 = Some(0.999_999);

    let result = harness.run().await.unwrap();
    match result.output("deploy", "deployment") {
        Some(ArtifactValue::Json(v)) => assert_eq!(v["deployed"], false),
        other => panic!("unexpected deployment output {other:?}"),
    }
    assert_eq!(harness.deployer.status().state, DeploymentState::Absent);
}
