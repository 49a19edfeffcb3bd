//! # Modelflow
//!
//! A cached DAG pipeline that trains tabular regression models and serves
//! them over HTTP.
//!
//! Modelflow provides:
//!
//! - **Typed steps**: nodes declare input and output slots; the builder checks
//!   every binding before anything runs
//! - **Fingerprint caching**: a node is skipped when its behaviour, config
//!   and inputs match a stored artifact
//! - **Experiment tracking**: params, metrics and artifacts per run
//! - **Deployment**: a single-model HTTP inference service with hot swap
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use modelflow::prelude::*;
//!
//! let config = PipelineConfig::load("pipeline.json")?;
//! let deployer = Arc::new(ModelDeployer::new(config.deploy.deployer()));
//! let registry = StepRegistry::standard(deployer);
//! let graph = training_pipeline(&config, &registry)?;
//!
//! let executor = PipelineExecutor::new(
//!     Arc::new(InMemoryArtifactStore::new()),
//!     Arc::new(LoggingTracker::default()),
//! );
//! let result = executor.run(&graph, &Externals::new(), &CancellationToken::new()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod data;
pub mod errors;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod preprocess;
pub mod serving;
pub mod steps;
pub mod store;
pub mod testing;
pub mod tracking;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::PipelineConfig;
    pub use crate::core::{ArtifactRef, ArtifactValue, Fingerprint, RunStatus, StepStatus};
    pub use crate::data::{load_csv, Table};
    pub use crate::errors::{ModelflowError, StepError};
    pub use crate::models::{ModelBundle, ModelSpec, TrainedModel};
    pub use crate::pipeline::{
        training_pipeline, Externals, PipelineBuilder, PipelineExecutor, PipelineGraph,
        RunResult, StepSpec,
    };
    pub use crate::serving::{ModelDeployer, PredictionRequest, Predictor};
    pub use crate::steps::{Step, StepContext, StepRegistry};
    pub use crate::store::{ArtifactStore, FileArtifactStore, InMemoryArtifactStore};
    pub use crate::tracking::{ExperimentTracker, JsonlTracker, LoggingTracker};
    pub use std::sync::Arc;
}
