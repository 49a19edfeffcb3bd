//! Sequential executor with fingerprint-keyed caching.

use super::{Binding, PipelineGraph, RunResult, StepReport, StepSpec};
use crate::cancellation::CancellationToken;
use crate::core::{
    Artifact, ArtifactValue, Fingerprint, RunStatus, StepInvocation, StepOutputs, StepStatus,
};
use crate::errors::{ModelflowError, StepError, StepExecutionError, UnboundInputError};
use crate::steps::{CachePolicy, InputSource, SlotSpec, StepContext, StepInputs};
use crate::store::ArtifactStore;
use crate::tracking::{ExperimentTracker, RunContext};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// Values supplied to `External` bindings for one run.
pub type Externals = BTreeMap<String, ArtifactValue>;

/// Runs pipeline graphs one node at a time.
#[derive(Clone)]
pub struct PipelineExecutor {
    store: Arc<dyn ArtifactStore>,
    tracker: Arc<dyn ExperimentTracker>,
    caching: bool,
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("store", &self.store)
            .field("caching", &self.caching)
            .finish_non_exhaustive()
    }
}

impl PipelineExecutor {
    /// Creates an executor with caching enabled.
    #[must_use]
    pub fn new(store: Arc<dyn ArtifactStore>, tracker: Arc<dyn ExperimentTracker>) -> Self {
        Self {
            store,
            tracker,
            caching: true,
        }
    }

    /// Enables or disables reuse of stored artifacts.
    #[must_use]
    pub fn with_caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }

    /// The artifact store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Runs `graph` to completion.
    ///
    /// External bindings are checked before a run is opened. The first failing
    /// node aborts the run; artifacts stored before it remain valid.
    pub async fn run(
        &self,
        graph: &PipelineGraph,
        externals: &Externals,
        cancel: &CancellationToken,
    ) -> Result<RunResult, ModelflowError> {
        for (step, slot, key) in graph.external_bindings() {
            if !externals.contains_key(key) {
                return Err(UnboundInputError::missing_external(step, slot, key).into());
            }
        }

        let run = RunContext::open(graph.name(), Arc::clone(&self.tracker));
        let span = info_span!("pipeline_run", pipeline = graph.name(), run_id = %run.run_id());
        let result = self
            .run_nodes(graph, externals, cancel, &run)
            .instrument(span)
            .await;

        match &result {
            Ok(_) => {
                run.close(RunStatus::Succeeded);
            }
            Err(ModelflowError::Cancelled(_)) => {
                run.close(RunStatus::Cancelled);
            }
            Err(_) => {
                run.close(RunStatus::Failed);
            }
        }
        result
    }

    async fn run_nodes(
        &self,
        graph: &PipelineGraph,
        externals: &Externals,
        cancel: &CancellationToken,
        run: &Arc<RunContext>,
    ) -> Result<RunResult, ModelflowError> {
        let started = Instant::now();
        let mut produced: HashMap<String, Artifact> = HashMap::new();
        let mut reports = Vec::with_capacity(graph.len());

        for name in graph.execution_order() {
            if cancel.is_cancelled() {
                let reason = cancel.reason().unwrap_or_else(|| "cancelled".to_string());
                warn!(step = %name, %reason, "Run cancelled before step");
                return Err(ModelflowError::Cancelled(reason));
            }
            let Some(node) = graph.node(name) else {
                continue;
            };

            let step_start = Instant::now();
            let (artifact, status) = self
                .run_node(node, &produced, externals, run)
                .instrument(info_span!("step", step = %node.name))
                .await?;

            run.log_artifact(&node.name, artifact.reference(), status.is_cache_hit());
            let report = StepReport {
                name: node.name.clone(),
                behaviour: node.behaviour.name().to_string(),
                status,
                artifact: artifact.reference(),
                duration_ms: step_start.elapsed().as_secs_f64() * 1000.0,
            };
            info!(
                step = %report.name,
                status = %report.status,
                version = report.artifact.version,
                fingerprint = report.artifact.fingerprint.short(),
                duration_ms = report.duration_ms,
                "Step completed"
            );
            reports.push(report);
            produced.insert(node.name.clone(), artifact);
        }

        info!(
            steps = reports.len(),
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Pipeline run completed"
        );
        let outputs = produced
            .into_iter()
            .map(|(name, artifact)| (name, artifact.outputs))
            .collect();
        Ok(RunResult {
            run_id: run.run_id(),
            pipeline: graph.name().to_string(),
            steps: reports,
            outputs,
        })
    }

    async fn run_node(
        &self,
        node: &StepSpec,
        produced: &HashMap<String, Artifact>,
        externals: &Externals,
        run: &Arc<RunContext>,
    ) -> Result<(Artifact, StepStatus), ModelflowError> {
        let fail = |source: StepError| StepExecutionError::new(&node.name, source);
        let behaviour = &node.behaviour;
        let declared = behaviour.outputs();

        let (inputs, fingerprints) = resolve_inputs(node, produced, externals).map_err(fail)?;
        let fingerprint = StepInvocation {
            step: &node.name,
            behaviour: behaviour.name(),
            behaviour_version: behaviour.version(),
            config: &node.config,
            inputs: fingerprints,
        }
        .fingerprint();

        let policy = behaviour.cache_policy();
        if self.caching && policy == CachePolicy::Cached {
            if let Some(artifact) = self.lookup(&node.name, &fingerprint, &declared).await {
                return Ok((artifact, StepStatus::Cached));
            }
        }

        debug!(fingerprint = fingerprint.short(), "Executing step");
        let ctx = StepContext::new(&node.name, node.config.clone(), inputs, Arc::clone(run));
        let outputs = match behaviour.execute(&ctx).await {
            Ok(outputs) => outputs,
            Err(source) => {
                warn!(error = %source, "Step failed");
                return Err(fail(source).into());
            }
        };
        verify_outputs(&outputs, &declared).map_err(fail)?;

        let key = match policy {
            CachePolicy::Cached => fingerprint,
            CachePolicy::Always => {
                let content = Fingerprint::of_value(&outputs).map_err(|e| {
                    fail(StepError::InvalidConfig(format!("cannot fingerprint outputs: {e}")))
                })?;
                fingerprint.derive(content.as_str())
            }
        };
        let meta = self.store.put(&node.name, &key, &outputs).await?;
        Ok((Artifact { meta, outputs }, StepStatus::Executed))
    }

    /// Store read failures and unusable payloads count as a miss.
    async fn lookup(
        &self,
        step: &str,
        fingerprint: &Fingerprint,
        declared: &[SlotSpec],
    ) -> Option<Artifact> {
        match self.store.get(fingerprint).await {
            Ok(Some(artifact)) => match verify_outputs(&artifact.outputs, declared) {
                Ok(()) => Some(artifact),
                Err(e) => {
                    warn!(step, error = %e, "Stored artifact does not match declared outputs");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(step, error = %e, "Artifact lookup failed; executing step");
                None
            }
        }
    }
}

fn resolve_inputs(
    node: &StepSpec,
    produced: &HashMap<String, Artifact>,
    externals: &Externals,
) -> Result<(StepInputs, BTreeMap<String, Fingerprint>), StepError> {
    let mut inputs = StepInputs::new();
    let mut fingerprints = BTreeMap::new();

    for (slot, binding) in &node.bindings {
        let (value, source, fingerprint) = match binding {
            Binding::Output { step, slot: output } => {
                let artifact = produced
                    .get(step)
                    .ok_or_else(|| StepError::MissingInput(slot.clone()))?;
                let value = artifact
                    .output(output)
                    .cloned()
                    .ok_or_else(|| StepError::MissingInput(slot.clone()))?;
                let source = InputSource::Artifact {
                    artifact: artifact.reference(),
                    slot: output.clone(),
                };
                (value, source, artifact.meta.fingerprint.derive(output))
            }
            Binding::External { key } => {
                let value = externals
                    .get(key)
                    .cloned()
                    .ok_or_else(|| StepError::MissingInput(slot.clone()))?;
                let fingerprint = content_fingerprint(slot, &value)?;
                (value, InputSource::External(key.clone()), fingerprint)
            }
            Binding::Constant(value) => {
                let fingerprint = content_fingerprint(slot, value)?;
                (value.clone(), InputSource::Constant, fingerprint)
            }
        };
        fingerprints.insert(slot.clone(), fingerprint);
        inputs.insert(slot.clone(), value, source);
    }

    Ok((inputs, fingerprints))
}

fn content_fingerprint(slot: &str, value: &ArtifactValue) -> Result<Fingerprint, StepError> {
    Fingerprint::of_value(value)
        .map_err(|e| StepError::InvalidConfig(format!("cannot fingerprint input '{slot}': {e}")))
}

fn verify_outputs(outputs: &StepOutputs, declared: &[SlotSpec]) -> Result<(), StepError> {
    for slot in declared {
        let value = outputs
            .get(&slot.name)
            .ok_or_else(|| StepError::MissingOutput(slot.name.clone()))?;
        if value.kind() != slot.kind {
            return Err(StepError::KindMismatch {
                slot: slot.name.clone(),
                expected: slot.kind,
                actual: value.kind(),
            });
        }
    }
    Ok(())
}
