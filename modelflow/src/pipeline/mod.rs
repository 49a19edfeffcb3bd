//! Pipeline building and execution.
//!
//! This module provides:
//! - Node specifications and input bindings
//! - A builder that validates bindings and rejects cycles
//! - A sequential executor with fingerprint-keyed caching
//! - The standard house-price training graph

mod builder;
mod executor;
mod graph;
mod result;
mod spec;
mod training;

#[cfg(test)]
mod integration_tests;

pub use builder::PipelineBuilder;
pub use executor::{Externals, PipelineExecutor};
pub use graph::PipelineGraph;
pub use result::{RunResult, StepReport};
pub use spec::{Binding, StepSpec};
pub use training::{nodes, training_pipeline};
