//! Run results.

use crate::core::{ArtifactRef, ArtifactValue, StepOutputs, StepStatus};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// What happened to one node in a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    /// Node name.
    pub name: String,
    /// Behaviour name.
    pub behaviour: String,
    /// Executed or reused.
    pub status: StepStatus,
    /// The stored artifact (fingerprint and version).
    pub artifact: ArtifactRef,
    /// Wall time in milliseconds, including the store lookup.
    pub duration_ms: f64,
}

/// Result of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// The tracker run id.
    pub run_id: Uuid,
    /// Pipeline name.
    pub pipeline: String,
    /// One report per node, in execution order.
    pub steps: Vec<StepReport>,
    /// Outputs of every node.
    pub outputs: BTreeMap<String, StepOutputs>,
}

impl RunResult {
    /// The report of node `name`.
    #[must_use]
    pub fn report(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Output `slot` of node `step`.
    #[must_use]
    pub fn output(&self, step: &str, slot: &str) -> Option<&ArtifactValue> {
        self.outputs.get(step).and_then(|o| o.get(slot))
    }

    /// Names of nodes that executed.
    #[must_use]
    pub fn executed(&self) -> Vec<&str> {
        self.with_status(StepStatus::Executed)
    }

    /// Names of nodes reused from the store.
    #[must_use]
    pub fn cached(&self) -> Vec<&str> {
        self.with_status(StepStatus::Cached)
    }

    fn with_status(&self, status: StepStatus) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.status == status)
            .map(|s| s.name.as_str())
            .collect()
    }
}
