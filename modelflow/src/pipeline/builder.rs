//! Pipeline builder with validation.

use super::{Binding, PipelineGraph, StepSpec};
use crate::errors::{
    CycleDetectedError, ModelflowError, PipelineValidationError, UnboundInputError,
};
use std::collections::{HashMap, HashSet};

/// Builder for creating validated pipelines.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    /// The pipeline name.
    name: String,
    /// Nodes in declaration order.
    steps: Vec<StepSpec>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Adds a node. Validation happens in [`Self::build`].
    #[must_use]
    pub fn step(mut self, spec: StepSpec) -> Self {
        self.steps.push(spec);
        self
    }

    /// Adds a node in place.
    pub fn add_step(&mut self, spec: StepSpec) {
        self.steps.push(spec);
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Validates the nodes and builds the graph.
    ///
    /// Checks run in this order: empty pipeline, duplicate names, bindings
    /// (slot, producer, output, kind), unbound inputs, cycles.
    pub fn build(self) -> Result<PipelineGraph, ModelflowError> {
        if self.steps.is_empty() {
            return Err(PipelineValidationError::Empty {
                pipeline: self.name,
            }
            .into());
        }

        let mut by_name: HashMap<&str, &StepSpec> = HashMap::new();
        for spec in &self.steps {
            if by_name.insert(spec.name.as_str(), spec).is_some() {
                return Err(PipelineValidationError::DuplicateStep {
                    step: spec.name.clone(),
                }
                .into());
            }
        }

        for spec in &self.steps {
            validate_bindings(spec, &by_name)?;
        }

        for spec in &self.steps {
            for slot in spec.behaviour.inputs() {
                if !spec.bindings.contains_key(&slot.name) {
                    return Err(UnboundInputError::new(&spec.name, &slot.name).into());
                }
            }
        }

        detect_cycles(&self.steps, &by_name)?;

        Ok(PipelineGraph::new(self.name, self.steps))
    }
}

fn validate_bindings(
    spec: &StepSpec,
    by_name: &HashMap<&str, &StepSpec>,
) -> Result<(), PipelineValidationError> {
    let inputs = spec.behaviour.inputs();
    for (slot, binding) in &spec.bindings {
        let Some(declared) = inputs.iter().find(|s| &s.name == slot) else {
            return Err(PipelineValidationError::UnknownSlot {
                step: spec.name.clone(),
                slot: slot.clone(),
            });
        };

        match binding {
            Binding::Output { step, slot: output } => {
                let producer =
                    by_name
                        .get(step.as_str())
                        .ok_or_else(|| PipelineValidationError::UnknownProducer {
                            step: spec.name.clone(),
                            slot: slot.clone(),
                            producer: step.clone(),
                        })?;
                let produced = producer
                    .behaviour
                    .outputs()
                    .into_iter()
                    .find(|o| &o.name == output)
                    .ok_or_else(|| PipelineValidationError::UnknownOutput {
                        step: spec.name.clone(),
                        slot: slot.clone(),
                        producer: step.clone(),
                        output: output.clone(),
                    })?;
                if produced.kind != declared.kind {
                    return Err(PipelineValidationError::KindMismatch {
                        step: spec.name.clone(),
                        slot: slot.clone(),
                        producer: step.clone(),
                        output: output.clone(),
                        expected: declared.kind,
                        actual: produced.kind,
                    });
                }
            }
            Binding::Constant(value) if value.kind() != declared.kind => {
                return Err(PipelineValidationError::KindMismatch {
                    step: spec.name.clone(),
                    slot: slot.clone(),
                    producer: "<constant>".to_string(),
                    output: slot.clone(),
                    expected: declared.kind,
                    actual: value.kind(),
                });
            }
            Binding::Constant(_) | Binding::External { .. } => {}
        }
    }
    Ok(())
}

/// Detects cycles in the dependency graph.
fn detect_cycles(
    steps: &[StepSpec],
    by_name: &HashMap<&str, &StepSpec>,
) -> Result<(), CycleDetectedError> {
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for spec in steps {
        if !visited.contains(spec.name.as_str()) {
            if let Some(cycle) =
                dfs_cycle(&spec.name, by_name, &mut visited, &mut rec_stack, &mut path)
            {
                return Err(CycleDetectedError::new(cycle));
            }
        }
    }

    Ok(())
}

fn dfs_cycle<'a>(
    node: &'a str,
    by_name: &HashMap<&str, &'a StepSpec>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(&spec) = by_name.get(node) {
        for dep in spec.dependencies() {
            if !visited.contains(dep) {
                if let Some(cycle) = dfs_cycle(dep, by_name, visited, rec_stack, path) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(dep) {
                let start = path.iter().position(|n| *n == dep).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|s| (*s).to_string()).collect();
                cycle.push(dep.to_string());
                return Some(cycle);
            }
        }
    }

    path.pop();
    rec_stack.remove(node);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ArtifactValue;
    use crate::testing::CountingStep;
    use std::sync::Arc;

    fn source(name: &str) -> StepSpec {
        StepSpec::new(name, Arc::new(CountingStep::new("source")))
    }

    fn sink(name: &str) -> StepSpec {
        StepSpec::new(name, Arc::new(CountingStep::new("sink").with_input("value")))
    }

    #[test]
    fn test_builder_creation() {
        let builder = PipelineBuilder::new("test");
        assert_eq!(builder.name(), "test");
        assert_eq!(builder.step_count(), 0);
    }

    #[test]
    fn test_builder_empty_build() {
        let err = PipelineBuilder::new("test").build().unwrap_err();
        match err {
            ModelflowError::Validation(e) => assert_eq!(e.error_info().code, "GRAPH-EMPTY"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_builder_duplicate() {
        let err = PipelineBuilder::new("test")
            .step(source("a"))
            .step(source("a"))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ModelflowError::Validation(PipelineValidationError::DuplicateStep { .. })
        ));
    }

    #[test]
    fn test_builder_unknown_producer_and_output() {
        let err = PipelineBuilder::new("test")
            .step(sink("b").bind("value", "missing", "value"))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ModelflowError::Validation(PipelineValidationError::UnknownProducer { .. })
        ));

        let err = PipelineBuilder::new("test")
            .step(source("a"))
            .step(sink("b").bind("value", "a", "nope"))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ModelflowError::Validation(PipelineValidationError::UnknownOutput { .. })
        ));
    }

    #[test]
    fn test_builder_unknown_slot() {
        let err = PipelineBuilder::new("test")
            .step(source("a").bind("extra", "a", "value"))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ModelflowError::Validation(PipelineValidationError::UnknownSlot { .. })
        ));
    }

    #[test]
    fn test_builder_constant_kind_mismatch() {
        let err = PipelineBuilder::new("test")
            .step(sink("b").bind_constant("value", ArtifactValue::Json(serde_json::json!(1))))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ModelflowError::Validation(PipelineValidationError::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_builder_unbound_input() {
        let err = PipelineBuilder::new("test").step(sink("b")).build().unwrap_err();
        match err {
            ModelflowError::Unbound(e) => {
                assert_eq!(e.step, "b");
                assert_eq!(e.slot, "value");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_builder_cycle_detection() {
        let err = PipelineBuilder::new("test")
            .step(sink("a").bind("value", "b", "value"))
            .step(sink("b").bind("value", "a", "value"))
            .build()
            .unwrap_err();
        match err {
            ModelflowError::Cycle(e) => assert_eq!(e.cycle_path, vec!["a", "b", "a"]),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_builder_self_cycle() {
        let err = PipelineBuilder::new("test")
            .step(sink("a").bind("value", "a", "value"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ModelflowError::Cycle(_)));
    }

    #[test]
    fn test_builder_build_success() {
        let graph = PipelineBuilder::new("test")
            .step(sink("b").bind("value", "a", "value"))
            .step(source("a"))
            .build()
            .unwrap();

        assert_eq!(graph.name(), "test");
        assert_eq!(graph.execution_order(), &["a", "b"]);
    }
}
