//! In-memory artifact store.

use super::{ArtifactStore, StoreError};
use crate::core::{Artifact, ArtifactMeta, Fingerprint, StepOutputs};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Artifact store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    artifacts: DashMap<Fingerprint, Artifact>,
    versions: Mutex<HashMap<String, Vec<Fingerprint>>>,
}

impl InMemoryArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Artifact>, StoreError> {
        Ok(self.artifacts.get(fingerprint).map(|a| a.value().clone()))
    }

    async fn put(
        &self,
        step: &str,
        fingerprint: &Fingerprint,
        outputs: &StepOutputs,
    ) -> Result<ArtifactMeta, StoreError> {
        // Held for the whole put so version allocation is serialized.
        let mut versions = self.versions.lock();
        if let Some(existing) = self.artifacts.get(fingerprint) {
            return Ok(existing.meta.clone());
        }

        let step_versions = versions.entry(step.to_string()).or_default();
        step_versions.push(fingerprint.clone());
        let meta = ArtifactMeta {
            step: step.to_string(),
            version: step_versions.len() as u64,
            fingerprint: fingerprint.clone(),
            created_at: Utc::now(),
        };
        self.artifacts.insert(
            fingerprint.clone(),
            Artifact {
                meta: meta.clone(),
                outputs: outputs.clone(),
            },
        );
        Ok(meta)
    }

    async fn list_versions(&self, step: &str) -> Result<Vec<ArtifactMeta>, StoreError> {
        let versions = self.versions.lock();
        Ok(versions
            .get(step)
            .map(|fps| {
                fps.iter()
                    .filter_map(|fp| self.artifacts.get(fp).map(|a| a.meta.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_version(&self, step: &str, version: u64) -> Result<Option<Artifact>, StoreError> {
        let fingerprint = {
            let versions = self.versions.lock();
            let index = usize::try_from(version).ok().and_then(|v| v.checked_sub(1));
            index.and_then(|i| versions.get(step).and_then(|fps| fps.get(i)).cloned())
        };
        match fingerprint {
            Some(fp) => self.get(&fp).await,
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ArtifactValue;

    fn outputs(x: f64) -> StepOutputs {
        StepOutputs::from([("value".to_string(), ArtifactValue::Scalar(x))])
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = InMemoryArtifactStore::new();
        let fp = Fingerprint::of_bytes(b"nothing");
        assert!(store.get(&fp).await.unwrap().is_none());
        assert!(store.get_version("s", 1).await.unwrap().is_none());
        assert!(store.get_version("s", 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_versions_are_monotonic_per_step() {
        let store = InMemoryArtifactStore::new();
        let a = store.put("train", &Fingerprint::of_bytes(b"a"), &outputs(1.0)).await.unwrap();
        let b = store.put("train", &Fingerprint::of_bytes(b"b"), &outputs(2.0)).await.unwrap();
        let c = store.put("other", &Fingerprint::of_bytes(b"c"), &outputs(3.0)).await.unwrap();

        assert_eq!((a.version, b.version, c.version), (1, 2, 1));
        let listed = store.list_versions("train").await.unwrap();
        assert_eq!(listed.iter().map(|m| m.version).collect::<Vec<_>>(), vec![1, 2]);

        let latest = store.latest("train").await.unwrap().unwrap();
        assert_eq!(latest.output("value"), Some(&ArtifactValue::Scalar(2.0)));
    }

    #[tokio::test]
    async fn test_put_is_write_once() {
        let store = InMemoryArtifactStore::new();
        let fp = Fingerprint::of_bytes(b"same");
        let first = store.put("train", &fp, &outputs(1.0)).await.unwrap();
        let second = store.put("train", &fp, &outputs(99.0)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
        let stored = store.get(&fp).await.unwrap().unwrap();
        assert_eq!(stored.output("value"), Some(&ArtifactValue::Scalar(1.0)));
    }
}
