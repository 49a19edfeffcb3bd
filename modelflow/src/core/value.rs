//! Values that flow between steps.

use crate::data::Table;
use crate::models::{ModelBundle, TrainedModel};
use crate::preprocess::{FeatureTransform, FittedImputer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A value produced by a step output slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ArtifactValue {
    /// A data table.
    Table(Table),
    /// A fitted imputer.
    Imputer(FittedImputer),
    /// A fitted feature transform.
    Transform(FeatureTransform),
    /// A trained model.
    Model(TrainedModel),
    /// A deployable bundle.
    Bundle(ModelBundle),
    /// Named scores.
    Metrics(BTreeMap<String, f64>),
    /// A single number.
    Scalar(f64),
    /// Free-form JSON.
    Json(serde_json::Value),
}

impl ArtifactValue {
    /// Returns the kind tag of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Table(_) => ValueKind::Table,
            Self::Imputer(_) => ValueKind::Imputer,
            Self::Transform(_) => ValueKind::Transform,
            Self::Model(_) => ValueKind::Model,
            Self::Bundle(_) => ValueKind::Bundle,
            Self::Metrics(_) => ValueKind::Metrics,
            Self::Scalar(_) => ValueKind::Scalar,
            Self::Json(_) => ValueKind::Json,
        }
    }
}

/// The type of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// [`ArtifactValue::Table`].
    Table,
    /// [`ArtifactValue::Imputer`].
    Imputer,
    /// [`ArtifactValue::Transform`].
    Transform,
    /// [`ArtifactValue::Model`].
    Model,
    /// [`ArtifactValue::Bundle`].
    Bundle,
    /// [`ArtifactValue::Metrics`].
    Metrics,
    /// [`ArtifactValue::Scalar`].
    Scalar,
    /// [`ArtifactValue::Json`].
    Json,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Table => "table",
            Self::Imputer => "imputer",
            Self::Transform => "transform",
            Self::Model => "model",
            Self::Bundle => "bundle",
            Self::Metrics => "metrics",
            Self::Scalar => "scalar",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}
