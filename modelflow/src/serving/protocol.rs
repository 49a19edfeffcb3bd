//! JSON payloads of the inference service.

use crate::core::ArtifactRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Body of `POST /predict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PredictRequest {
    /// Raw feature values by column name; absent columns are imputed.
    pub features: BTreeMap<String, Value>,
}

/// Identifies the model that answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// The producing step.
    pub step: String,
    /// The artifact version.
    pub version: u64,
}

impl From<&ArtifactRef> for ModelInfo {
    fn from(artifact: &ArtifactRef) -> Self {
        Self {
            step: artifact.step.clone(),
            version: artifact.version,
        }
    }
}

/// Body returned by `POST /predict`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    /// The predicted target value.
    pub prediction: f64,
    /// The model that produced it.
    pub model: ModelInfo,
}

/// Body returned by `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `running` while the service answers.
    pub status: String,
    /// The loaded model.
    pub model: ModelInfo,
    /// Predictions served since start.
    pub requests_served: u64,
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// What went wrong.
    pub error: String,
}
