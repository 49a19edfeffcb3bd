//! Stored artifacts and references to them.

use super::{ArtifactValue, Fingerprint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Named outputs of one step invocation.
pub type StepOutputs = BTreeMap<String, ArtifactValue>;

/// Identifies one stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Producing step.
    pub step: String,
    /// Version within the step, starting at 1.
    pub version: u64,
    /// Invocation fingerprint.
    pub fingerprint: Fingerprint,
}

impl ArtifactRef {
    /// Returns true if both refer to the same step version.
    #[must_use]
    pub fn same_version(&self, other: &Self) -> bool {
        self.step == other.step && self.version == other.version
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{} ({})", self.step, self.version, self.fingerprint.short())
    }
}

/// Metadata recorded when an artifact is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
    /// Producing step.
    pub step: String,
    /// Version within the step.
    pub version: u64,
    /// Invocation fingerprint.
    pub fingerprint: Fingerprint,
    /// When the artifact was first stored.
    pub created_at: DateTime<Utc>,
}

impl ArtifactMeta {
    /// Returns a reference to this artifact.
    #[must_use]
    pub fn reference(&self) -> ArtifactRef {
        ArtifactRef {
            step: self.step.clone(),
            version: self.version,
            fingerprint: self.fingerprint.clone(),
        }
    }
}

/// A stored artifact: outputs plus metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Storage metadata.
    pub meta: ArtifactMeta,
    /// The outputs.
    pub outputs: StepOutputs,
}

impl Artifact {
    /// Returns a reference to this artifact.
    #[must_use]
    pub fn reference(&self) -> ArtifactRef {
        self.meta.reference()
    }

    /// Returns one output slot.
    #[must_use]
    pub fn output(&self, slot: &str) -> Option<&ArtifactValue> {
        self.outputs.get(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_and_display() {
        let meta = ArtifactMeta {
            step: "package".to_string(),
            version: 3,
            fingerprint: Fingerprint::of_bytes(b"bundle"),
            created_at: Utc::now(),
        };
        let r = meta.reference();
        assert_eq!(r.version, 3);
        assert!(r.to_string().starts_with("package@v3 ("));

        let mut other = r.clone();
        other.fingerprint = Fingerprint::of_bytes(b"other");
        assert!(r.same_version(&other));
        other.version = 4;
        assert!(!r.same_version(&other));
    }
}
