//! Explicit registry of step behaviours.

use super::{
    DeployModelStep, EngineerFeaturesStep, EvaluateModelStep, ImputeStep, IngestCsvStep,
    PackageModelStep, RemoveOutliersStep, SplitStep, Step, TrainModelStep,
};
use crate::errors::PipelineValidationError;
use crate::serving::ModelDeployer;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps behaviour names to step implementations.
#[derive(Debug, Default, Clone)]
pub struct StepRegistry {
    steps: HashMap<String, Arc<dyn Step>>,
}

impl StepRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every builtin behaviour.
    #[must_use]
    pub fn standard(deployer: Arc<ModelDeployer>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(IngestCsvStep));
        registry.register(Arc::new(SplitStep));
        registry.register(Arc::new(ImputeStep));
        registry.register(Arc::new(RemoveOutliersStep));
        registry.register(Arc::new(EngineerFeaturesStep));
        registry.register(Arc::new(TrainModelStep));
        registry.register(Arc::new(EvaluateModelStep));
        registry.register(Arc::new(PackageModelStep));
        registry.register(Arc::new(DeployModelStep::new(deployer)));
        registry
    }

    /// Registers a behaviour under its name, replacing any previous one.
    pub fn register(&mut self, step: Arc<dyn Step>) -> Option<Arc<dyn Step>> {
        self.steps.insert(step.name().to_string(), step)
    }

    /// Looks up a behaviour.
    pub fn get(&self, behaviour: &str) -> Result<Arc<dyn Step>, PipelineValidationError> {
        self.steps
            .get(behaviour)
            .cloned()
            .ok_or_else(|| PipelineValidationError::UnknownBehaviour {
                behaviour: behaviour.to_string(),
            })
    }

    /// Registered behaviour names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.steps.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
