//! The step capability and the builtin house-price steps.
//!
//! A [`Step`] declares typed input and output slots and turns resolved
//! inputs into outputs. Steps are registered by behaviour name in a
//! [`StepRegistry`]; the pipeline refers to them through that name.

mod deploy;
mod ingest;
mod preprocess;
mod registry;
mod split;
mod train;

pub use deploy::{DeployGate, DeployModelStep};
pub use ingest::{IngestConfig, IngestCsvStep};
pub use preprocess::{
    EngineerFeaturesStep, FeatureStepConfig, ImputeStep, ImputeStepConfig, RemoveOutliersStep,
};
pub use registry::StepRegistry;
pub use split::SplitStep;
pub use train::{EvaluateModelStep, PackageModelStep, TrainConfig, TrainModelStep};

use crate::core::{ArtifactRef, ArtifactValue, StepOutputs, ValueKind};
use crate::data::Table;
use crate::errors::StepError;
use crate::models::{ModelBundle, TrainedModel};
use crate::preprocess::{FeatureTransform, FittedImputer};
use crate::tracking::RunContext;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Whether a step's outputs may be reused from the artifact store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Reuse stored outputs when the fingerprint matches.
    #[default]
    Cached,
    /// Run every time; used for steps that read or affect the outside world.
    Always,
}

/// A named, typed input or output slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotSpec {
    /// Slot name.
    pub name: String,
    /// Value kind carried by the slot.
    pub kind: ValueKind,
}

impl SlotSpec {
    /// Creates a slot.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Creates a table slot.
    #[must_use]
    pub fn table(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::Table)
    }
}

/// Where a resolved input came from.
#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
    /// Output `slot` of a stored artifact.
    Artifact {
        /// The producing artifact.
        artifact: ArtifactRef,
        /// The producing slot.
        slot: String,
    },
    /// An external input supplied for the run.
    External(String),
    /// A constant bound in the pipeline definition.
    Constant,
}

/// A resolved input value.
#[derive(Debug, Clone, PartialEq)]
pub struct StepInput {
    /// The value.
    pub value: ArtifactValue,
    /// Its origin.
    pub source: InputSource,
}

/// The resolved inputs of one invocation, by slot.
#[derive(Debug, Clone, Default)]
pub struct StepInputs {
    inputs: BTreeMap<String, StepInput>,
}

impl StepInputs {
    /// Creates an empty set of inputs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an input.
    #[must_use]
    pub fn with(mut self, slot: impl Into<String>, value: ArtifactValue, source: InputSource) -> Self {
        self.insert(slot, value, source);
        self
    }

    /// Adds an input in place.
    pub fn insert(&mut self, slot: impl Into<String>, value: ArtifactValue, source: InputSource) {
        self.inputs.insert(slot.into(), StepInput { value, source });
    }

    /// Returns the raw value of a slot.
    pub fn get(&self, slot: &str) -> Result<&ArtifactValue, StepError> {
        self.inputs
            .get(slot)
            .map(|i| &i.value)
            .ok_or_else(|| StepError::MissingInput(slot.to_string()))
    }

    /// Returns where a slot's value came from.
    #[must_use]
    pub fn source(&self, slot: &str) -> Option<&InputSource> {
        self.inputs.get(slot).map(|i| &i.source)
    }

    /// Returns the artifact a slot was read from, if it came from the store.
    #[must_use]
    pub fn artifact_ref(&self, slot: &str) -> Option<&ArtifactRef> {
        match self.source(slot) {
            Some(InputSource::Artifact { artifact, .. }) => Some(artifact),
            _ => None,
        }
    }

    /// Slot names in order.
    pub fn slots(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }

    fn typed<'a, T>(
        &'a self,
        slot: &str,
        expected: ValueKind,
        extract: impl FnOnce(&'a ArtifactValue) -> Option<&'a T>,
    ) -> Result<&'a T, StepError> {
        let value = self.get(slot)?;
        extract(value).ok_or_else(|| StepError::KindMismatch {
            slot: slot.to_string(),
            expected,
            actual: value.kind(),
        })
    }

    /// Returns a table input.
    pub fn table(&self, slot: &str) -> Result<&Table, StepError> {
        self.typed(slot, ValueKind::Table, |v| match v {
            ArtifactValue::Table(t) => Some(t),
            _ => None,
        })
    }

    /// Returns an imputer input.
    pub fn imputer(&self, slot: &str) -> Result<&FittedImputer, StepError> {
        self.typed(slot, ValueKind::Imputer, |v| match v {
            ArtifactValue::Imputer(i) => Some(i),
            _ => None,
        })
    }

    /// Returns a feature transform input.
    pub fn transform(&self, slot: &str) -> Result<&FeatureTransform, StepError> {
        self.typed(slot, ValueKind::Transform, |v| match v {
            ArtifactValue::Transform(t) => Some(t),
            _ => None,
        })
    }

    /// Returns a model input.
    pub fn model(&self, slot: &str) -> Result<&TrainedModel, StepError> {
        self.typed(slot, ValueKind::Model, |v| match v {
            ArtifactValue::Model(m) => Some(m),
            _ => None,
        })
    }

    /// Returns a bundle input.
    pub fn bundle(&self, slot: &str) -> Result<&ModelBundle, StepError> {
        self.typed(slot, ValueKind::Bundle, |v| match v {
            ArtifactValue::Bundle(b) => Some(b),
            _ => None,
        })
    }

    /// Returns a metrics input.
    pub fn metrics(&self, slot: &str) -> Result<&BTreeMap<String, f64>, StepError> {
        self.typed(slot, ValueKind::Metrics, |v| match v {
            ArtifactValue::Metrics(m) => Some(m),
            _ => None,
        })
    }
}

/// Everything a step sees while executing.
#[derive(Debug)]
pub struct StepContext {
    step: String,
    config: serde_json::Value,
    inputs: StepInputs,
    run: Arc<RunContext>,
}

impl StepContext {
    /// Creates a context.
    #[must_use]
    pub fn new(
        step: impl Into<String>,
        config: serde_json::Value,
        inputs: StepInputs,
        run: Arc<RunContext>,
    ) -> Self {
        Self {
            step: step.into(),
            config,
            inputs,
            run,
        }
    }

    /// The node name being executed.
    #[must_use]
    pub fn step(&self) -> &str {
        &self.step
    }

    /// The raw node configuration.
    #[must_use]
    pub fn config_value(&self) -> &serde_json::Value {
        &self.config
    }

    /// Decodes the node configuration; JSON null yields `T::default()`.
    pub fn config<T: DeserializeOwned + Default>(&self) -> Result<T, StepError> {
        if self.config.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.config.clone())
            .map_err(|e| StepError::InvalidConfig(format!("{}: {e}", self.step)))
    }

    /// The resolved inputs.
    #[must_use]
    pub fn inputs(&self) -> &StepInputs {
        &self.inputs
    }

    /// The run this invocation belongs to.
    #[must_use]
    pub fn run(&self) -> &RunContext {
        &self.run
    }

    /// Logs parameters under this node's name.
    pub fn log_params(&self, params: serde_json::Value) {
        self.run.log_params(&self.step, params);
    }

    /// Logs metrics under this node's name.
    pub fn log_metrics(&self, metrics: BTreeMap<String, f64>) {
        self.run.log_metrics(&self.step, metrics);
    }
}

/// A unit of work in a pipeline.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Behaviour name; the registry key.
    fn name(&self) -> &str;

    /// Behaviour version; bumping it invalidates stored outputs.
    fn version(&self) -> u32 {
        1
    }

    /// Declared input slots.
    fn inputs(&self) -> Vec<SlotSpec>;

    /// Declared output slots.
    fn outputs(&self) -> Vec<SlotSpec>;

    /// Whether outputs may be reused.
    fn cache_policy(&self) -> CachePolicy {
        CachePolicy::Cached
    }

    /// Runs the step.
    async fn execute(&self, ctx: &StepContext) -> Result<StepOutputs, StepError>;
}

/// Builds a [`StepOutputs`] map from slot/value pairs.
pub fn outputs<const N: usize>(pairs: [(&str, ArtifactValue); N]) -> StepOutputs {
    pairs
        .into_iter()
        .map(|(slot, value)| (slot.to_string(), value))
        .collect()
}
