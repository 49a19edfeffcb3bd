//! Error types for the modelflow framework.
//!
//! Construction-time errors (`PipelineValidationError`, `CycleDetectedError`,
//! `UnboundInputError`) are raised before anything executes. Failures inside a
//! step are reported as `StepError` and wrapped by the executor into a
//! `StepExecutionError` naming the failing step.

use crate::config::ConfigError;
use crate::core::ValueKind;
use crate::data::TableError;
use crate::models::ModelError;
use crate::preprocess::PreprocessError;
use crate::serving::DeployError;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for modelflow operations.
#[derive(Debug, Error)]
pub enum ModelflowError {
    /// The pipeline graph is malformed.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// The pipeline graph contains a cycle.
    #[error("{0}")]
    Cycle(#[from] CycleDetectedError),

    /// An input slot has no binding.
    #[error("{0}")]
    Unbound(#[from] UnboundInputError),

    /// A step failed during a run.
    #[error("{0}")]
    StepExecution(#[from] StepExecutionError),

    /// The artifact store failed outside of a step.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// A deployment operation failed outside of a step.
    #[error("{0}")]
    Deploy(#[from] DeployError),

    /// The configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The run was cancelled between steps.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),
}

/// Metadata about a graph-construction error for better diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }
}

/// Error raised when a pipeline graph fails validation.
#[derive(Debug, Clone, Error)]
pub enum PipelineValidationError {
    /// The pipeline declares no steps.
    #[error("Pipeline '{pipeline}' has no steps")]
    Empty {
        /// The pipeline name.
        pipeline: String,
    },

    /// Two steps share a name.
    #[error("Step '{step}' is declared more than once")]
    DuplicateStep {
        /// The duplicated step name.
        step: String,
    },

    /// A binding targets an input slot the step does not declare.
    #[error("Step '{step}' has no input slot '{slot}'")]
    UnknownSlot {
        /// The step name.
        step: String,
        /// The undeclared slot.
        slot: String,
    },

    /// A binding references a step that is not part of the pipeline.
    #[error("Step '{step}' binds '{slot}' to unknown step '{producer}'")]
    UnknownProducer {
        /// The consuming step.
        step: String,
        /// The consuming slot.
        slot: String,
        /// The missing producer.
        producer: String,
    },

    /// A binding references an output the producer does not declare.
    #[error("Step '{step}' binds '{slot}' to '{producer}.{output}', which is not an output of '{producer}'")]
    UnknownOutput {
        /// The consuming step.
        step: String,
        /// The consuming slot.
        slot: String,
        /// The producer step.
        producer: String,
        /// The missing output slot.
        output: String,
    },

    /// A binding connects slots of different kinds.
    #[error("Step '{step}' expects {expected} on '{slot}' but '{producer}.{output}' produces {actual}")]
    KindMismatch {
        /// The consuming step.
        step: String,
        /// The consuming slot.
        slot: String,
        /// The producer step.
        producer: String,
        /// The producer slot.
        output: String,
        /// The kind the consumer declares.
        expected: ValueKind,
        /// The kind the producer declares.
        actual: ValueKind,
    },

    /// No behaviour is registered under the requested name.
    #[error("No step behaviour registered as '{behaviour}'")]
    UnknownBehaviour {
        /// The requested behaviour name.
        behaviour: String,
    },
}

impl PipelineValidationError {
    /// Returns diagnostic information for this error.
    #[must_use]
    pub fn error_info(&self) -> ContractErrorInfo {
        match self {
            Self::Empty { .. } => ContractErrorInfo::new("GRAPH-EMPTY", self.to_string())
                .with_fix_hint("Add at least one step to the pipeline before building."),
            Self::DuplicateStep { .. } => {
                ContractErrorInfo::new("GRAPH-DUPLICATE", self.to_string())
                    .with_fix_hint("Give every step in the pipeline a unique name.")
            }
            Self::UnknownSlot { .. } => ContractErrorInfo::new("GRAPH-UNKNOWN-SLOT", self.to_string())
                .with_fix_hint("Bind only the input slots the step behaviour declares."),
            Self::UnknownProducer { .. } | Self::UnknownOutput { .. } => {
                ContractErrorInfo::new("GRAPH-MISSING-DEP", self.to_string())
                    .with_fix_hint("Check the producer step name and output slot for typos.")
            }
            Self::KindMismatch { .. } => ContractErrorInfo::new("GRAPH-KIND", self.to_string()),
            Self::UnknownBehaviour { .. } => {
                ContractErrorInfo::new("GRAPH-BEHAVIOUR", self.to_string())
                    .with_fix_hint("Register the behaviour in the step registry before building.")
            }
        }
    }
}

/// Error raised when a cycle is detected in the pipeline graph.
#[derive(Debug, Clone, Error)]
#[error("Cycle detected in pipeline: {}", cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The path of steps forming the cycle, first step repeated at the end.
    pub cycle_path: Vec<String>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl CycleDetectedError {
    /// Creates a new cycle detected error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        let info = ContractErrorInfo::new(
            "GRAPH-CYCLE",
            format!("Pipeline contains a dependency cycle: {}", cycle_path.join(" -> ")),
        )
        .with_fix_hint("Remove one of the bindings in the cycle to break it.");

        Self {
            cycle_path,
            error_info: info,
        }
    }
}

/// Error raised when an input slot has no binding, or is bound to an external
/// key that was not supplied for the run.
#[derive(Debug, Clone, Error)]
#[error("Step '{step}' has no binding for input '{slot}'{}", external.as_ref().map(|k| format!(" (external key '{k}' not supplied)")).unwrap_or_default())]
pub struct UnboundInputError {
    /// The step name.
    pub step: String,
    /// The unbound slot.
    pub slot: String,
    /// The external key, when the slot is bound externally but not supplied.
    pub external: Option<String>,
}

impl UnboundInputError {
    /// Creates an error for a slot without any binding.
    #[must_use]
    pub fn new(step: impl Into<String>, slot: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            slot: slot.into(),
            external: None,
        }
    }

    /// Creates an error for an external binding whose key was not supplied.
    #[must_use]
    pub fn missing_external(
        step: impl Into<String>,
        slot: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            step: step.into(),
            slot: slot.into(),
            external: Some(key.into()),
        }
    }
}

/// Raised when the external data source cannot be read.
#[derive(Debug, Error)]
pub enum DataSourceError {
    /// The source could not be opened or read.
    #[error("Cannot read data source {}: {source}", path.display())]
    Unreadable {
        /// The source path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The source was readable but not valid.
    #[error("Malformed data source {}: {message}", path.display())]
    Malformed {
        /// The source path.
        path: PathBuf,
        /// What was wrong.
        message: String,
    },

    /// The source has no data rows.
    #[error("Data source {} contains no rows", path.display())]
    Empty {
        /// The source path.
        path: PathBuf,
    },

    /// A required column is absent.
    #[error("Data source {} has no column '{column}'", path.display())]
    MissingColumn {
        /// The source path.
        path: PathBuf,
        /// The missing column.
        column: String,
    },
}

/// A failure inside a single step.
#[derive(Debug, Error)]
pub enum StepError {
    /// The data source could not be loaded.
    #[error(transparent)]
    DataSource(#[from] DataSourceError),

    /// A table operation failed.
    #[error(transparent)]
    Table(#[from] TableError),

    /// A preprocessing kernel failed.
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    /// Fitting or evaluating a model failed.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The deployer rejected the model.
    #[error(transparent)]
    Deploy(#[from] DeployError),

    /// The step's configuration could not be decoded.
    #[error("Invalid step configuration: {0}")]
    InvalidConfig(String),

    /// A blocking worker task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A declared input was not resolved.
    #[error("Missing input '{0}'")]
    MissingInput(String),

    /// A declared output was not produced.
    #[error("Missing output '{0}'")]
    MissingOutput(String),

    /// A value has the wrong kind.
    #[error("Slot '{slot}' expected {expected} but holds {actual}")]
    KindMismatch {
        /// The slot name.
        slot: String,
        /// The expected kind.
        expected: ValueKind,
        /// The actual kind.
        actual: ValueKind,
    },
}

/// A step failed; the run is aborted.
#[derive(Debug, Error)]
#[error("Step '{step}' failed: {source}")]
pub struct StepExecutionError {
    /// The failing step.
    pub step: String,
    /// The underlying failure.
    #[source]
    pub source: StepError,
}

impl StepExecutionError {
    /// Creates a new step execution error.
    #[must_use]
    pub fn new(step: impl Into<String>, source: StepError) -> Self {
        Self {
            step: step.into(),
            source,
        }
    }
}
