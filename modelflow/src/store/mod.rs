//! Durable, versioned storage of step outputs keyed by fingerprint.
//!
//! Stores are write-once per fingerprint: storing the same fingerprint twice
//! returns the metadata of the first write. Versions are allocated per step,
//! starting at 1 and increasing with every new fingerprint.

mod fs;
mod memory;

pub use fs::FileArtifactStore;
pub use memory::InMemoryArtifactStore;

use crate::core::{Artifact, ArtifactMeta, Fingerprint, StepOutputs};
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by an artifact store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A filesystem operation failed.
    #[error("Artifact store I/O error at {}: {source}", path.display())]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Outputs could not be encoded.
    #[error("Cannot encode artifact: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored artifact cannot be read back.
    #[error("Artifact {fingerprint} is corrupt: {reason}")]
    Corrupt {
        /// The affected fingerprint.
        fingerprint: Fingerprint,
        /// What is wrong.
        reason: String,
    },

    /// The step name cannot be used as a storage key.
    #[error("Invalid step name '{0}'")]
    InvalidStepName(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Storage backend for step artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync + std::fmt::Debug {
    /// Looks up an artifact; `None` when nothing is stored under `fingerprint`.
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Artifact>, StoreError>;

    /// Stores outputs under `fingerprint`, allocating the next version of `step`.
    ///
    /// If the fingerprint is already stored, returns its existing metadata.
    async fn put(
        &self,
        step: &str,
        fingerprint: &Fingerprint,
        outputs: &StepOutputs,
    ) -> Result<ArtifactMeta, StoreError>;

    /// Lists every version of a step, ascending.
    async fn list_versions(&self, step: &str) -> Result<Vec<ArtifactMeta>, StoreError>;

    /// Looks up one version of a step.
    async fn get_version(&self, step: &str, version: u64) -> Result<Option<Artifact>, StoreError>;

    /// Looks up the highest version of a step.
    async fn latest(&self, step: &str) -> Result<Option<Artifact>, StoreError> {
        match self.list_versions(step).await?.last() {
            Some(meta) => self.get_version(step, meta.version).await,
            None => Ok(None),
        }
    }
}
