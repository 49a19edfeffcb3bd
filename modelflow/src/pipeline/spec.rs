//! Step node specifications.

use crate::core::ArtifactValue;
use crate::steps::Step;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Where an input slot gets its value from.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Output `slot` of node `step`.
    Output {
        /// Producer node name.
        step: String,
        /// Producer output slot.
        slot: String,
    },
    /// A value supplied for the run under `key`.
    External {
        /// External input key.
        key: String,
    },
    /// A value fixed in the pipeline definition.
    Constant(ArtifactValue),
}

/// A node of the pipeline graph.
#[derive(Debug, Clone)]
pub struct StepSpec {
    /// The unique node name.
    pub name: String,
    /// The behaviour executed by the node.
    pub behaviour: Arc<dyn Step>,
    /// Input bindings by slot.
    pub bindings: BTreeMap<String, Binding>,
    /// Immutable node configuration.
    pub config: serde_json::Value,
}

impl StepSpec {
    /// Creates a node with no bindings and a null configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, behaviour: Arc<dyn Step>) -> Self {
        Self {
            name: name.into(),
            behaviour,
            bindings: BTreeMap::new(),
            config: serde_json::Value::Null,
        }
    }

    /// Binds `slot` to output `output` of node `step`.
    #[must_use]
    pub fn bind(mut self, slot: impl Into<String>, step: impl Into<String>, output: impl Into<String>) -> Self {
        self.bindings.insert(
            slot.into(),
            Binding::Output {
                step: step.into(),
                slot: output.into(),
            },
        );
        self
    }

    /// Binds `slot` to the same-named output of node `step`.
    #[must_use]
    pub fn bind_from(self, slot: &str, step: impl Into<String>) -> Self {
        self.bind(slot, step, slot)
    }

    /// Binds `slot` to an external input.
    #[must_use]
    pub fn bind_external(mut self, slot: impl Into<String>, key: impl Into<String>) -> Self {
        self.bindings
            .insert(slot.into(), Binding::External { key: key.into() });
        self
    }

    /// Binds `slot` to a constant value.
    #[must_use]
    pub fn bind_constant(mut self, slot: impl Into<String>, value: ArtifactValue) -> Self {
        self.bindings.insert(slot.into(), Binding::Constant(value));
        self
    }

    /// Sets the node configuration.
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Names of the nodes this node reads from.
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.bindings.values().filter_map(|b| match b {
            Binding::Output { step, .. } => Some(step.as_str()),
            _ => None,
        })
    }
}
