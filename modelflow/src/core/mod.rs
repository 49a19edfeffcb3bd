//! Core domain types for modelflow.
//!
//! This module contains the types shared by the store, the executor and the
//! steps:
//! - artifact values, kinds and references
//! - content fingerprints
//! - step and run status enums

mod artifact;
mod fingerprint;
mod status;
mod value;

pub use artifact::{Artifact, ArtifactMeta, ArtifactRef, StepOutputs};
pub use fingerprint::{canonical_json, Fingerprint, StepInvocation};
pub use status::{RunStatus, StepStatus};
pub use value::{ArtifactValue, ValueKind};
