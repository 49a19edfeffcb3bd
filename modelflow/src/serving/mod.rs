//! Model deployment and the HTTP inference service.
//!
//! This module contains:
//! - [`ModelDeployer`]: the deployment state machine owning one record
//! - the axum inference service (`/health`, `/predict`)
//! - the wire protocol shared by service and client
//! - [`Predictor`]: a reqwest client for a running service

mod client;
mod deployer;
mod protocol;
mod service;

pub use client::{PredictionError, PredictionRequest, Predictor};
pub use deployer::{
    DeployableModel, DeployerConfig, DeploymentRecord, DeploymentState, DeploymentStatus,
    ModelDeployer,
};
pub use protocol::{ErrorResponse, HealthResponse, ModelInfo, PredictRequest, PredictResponse};

use crate::models::ModelError;
use thiserror::Error;

/// The model artifact cannot be loaded into a service.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    /// No artifact exists for the requested step/version.
    #[error("No model artifact for step '{step}'{}", version.map(|v| format!(" version {v}")).unwrap_or_default())]
    NotFound {
        /// The producing step.
        step: String,
        /// The requested version, if any.
        version: Option<u64>,
    },

    /// The artifact exists but does not hold a usable bundle.
    #[error("Model artifact for step '{step}' is corrupt: {reason}")]
    Corrupt {
        /// The producing step.
        step: String,
        /// What was wrong.
        reason: String,
    },

    /// The bundle cannot score a record.
    #[error("Model bundle failed validation: {0}")]
    Invalid(#[source] ModelError),
}

/// Deployment and serving failures.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The model could not be loaded.
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),

    /// The service is not running.
    #[error("Inference service unavailable (state: {state})")]
    ServiceUnavailable {
        /// The state the deployment is in.
        state: DeploymentState,
    },

    /// The listener could not be bound.
    #[error("Cannot bind inference service to {addr}: {source}")]
    Bind {
        /// The requested address.
        addr: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The requested lifecycle operation is not valid in the current state.
    #[error("Cannot {action} a deployment in state {from}")]
    InvalidTransition {
        /// The current state.
        from: DeploymentState,
        /// The rejected operation.
        action: &'static str,
    },

    /// Scoring a request failed.
    #[error("Prediction failed: {0}")]
    Prediction(#[from] ModelError),
}
