//! File-backed artifact store.
//!
//! Layout under the root directory:
//!
//! ```text
//! objects/<fingerprint>/outputs.json   serialized step outputs
//! objects/<fingerprint>/meta.json      serialized ArtifactMeta
//! steps/<step>/<version:010>           fingerprint of that version
//! ```
//!
//! Every file is written to a temporary sibling and renamed into place.
//! Version pointers are hard-linked instead, so a version number already
//! claimed by another process sharing the directory is never overwritten;
//! the writer moves on to the next free number.

use super::{ArtifactStore, StoreError};
use crate::core::{Artifact, ArtifactMeta, Fingerprint, StepOutputs};
use async_trait::async_trait;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const OUTPUTS_FILE: &str = "outputs.json";
const META_FILE: &str = "meta.json";

/// Artifact store persisted to a directory.
#[derive(Debug)]
pub struct FileArtifactStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileArtifactStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        for dir in [root.join("objects"), root.join("steps")] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| StoreError::io(&dir, e))?;
        }
        debug!(root = %root.display(), "Opened artifact store");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_dir(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join("objects").join(fingerprint.as_str())
    }

    fn step_dir(&self, step: &str) -> Result<PathBuf, StoreError> {
        let invalid = step.is_empty()
            || step == "."
            || step == ".."
            || step.contains(&['/', '\\', '\0'][..]);
        if invalid {
            return Err(StoreError::InvalidStepName(step.to_string()));
        }
        Ok(self.root.join("steps").join(step))
    }

    async fn read_meta(&self, fingerprint: &Fingerprint) -> Result<Option<ArtifactMeta>, StoreError> {
        let path = self.object_dir(fingerprint).join(META_FILE);
        let Some(bytes) = read_optional(&path).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                fingerprint: fingerprint.clone(),
                reason: format!("unreadable metadata: {e}"),
            })
    }

    async fn read_outputs(&self, fingerprint: &Fingerprint) -> Result<StepOutputs, StoreError> {
        let path = self.object_dir(fingerprint).join(OUTPUTS_FILE);
        let bytes = read_optional(&path).await?.ok_or_else(|| StoreError::Corrupt {
            fingerprint: fingerprint.clone(),
            reason: "outputs are missing".to_string(),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            fingerprint: fingerprint.clone(),
            reason: format!("undecodable outputs: {e}"),
        })
    }

    async fn versions_of(&self, step: &str) -> Result<Vec<(u64, PathBuf)>, StoreError> {
        let dir = self.step_dir(step)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };
        let mut versions = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| StoreError::io(&dir, e))? {
            let name = entry.file_name();
            if let Some(version) = name.to_str().and_then(|n| n.parse::<u64>().ok()) {
                versions.push((version, entry.path()));
            }
        }
        versions.sort_by_key(|(v, _)| *v);
        Ok(versions)
    }

    async fn read_pointer(&self, path: &Path) -> Result<Option<Fingerprint>, StoreError> {
        let Some(bytes) = read_optional(path).await? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&bytes);
        Ok(Fingerprint::parse(text.trim()))
    }

    fn pointer_path(dir: &Path, version: u64) -> PathBuf {
        dir.join(format!("{version:010}"))
    }
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Artifact>, StoreError> {
        let Some(meta) = self.read_meta(fingerprint).await? else {
            return Ok(None);
        };
        let outputs = self.read_outputs(fingerprint).await?;
        Ok(Some(Artifact { meta, outputs }))
    }

    async fn put(
        &self,
        step: &str,
        fingerprint: &Fingerprint,
        outputs: &StepOutputs,
    ) -> Result<ArtifactMeta, StoreError> {
        let step_dir = self.step_dir(step)?;
        let payload = serde_json::to_vec(outputs)?;
        let _guard = self.write_lock.lock().await;

        let object_dir = self.object_dir(fingerprint);
        let existing = match self.read_meta(fingerprint).await {
            Ok(meta) => meta,
            Err(StoreError::Corrupt { reason, .. }) => {
                warn!(fingerprint = %fingerprint.short(), %reason, "Replacing corrupt artifact metadata");
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(meta) = existing {
            if let Err(err) = self.read_outputs(fingerprint).await {
                warn!(fingerprint = %fingerprint.short(), error = %err, "Repairing artifact outputs");
                write_atomic(&object_dir.join(OUTPUTS_FILE), &payload).await?;
            }
            let pointer = Self::pointer_path(&self.step_dir(&meta.step)?, meta.version);
            if read_optional(&pointer).await?.is_none() {
                tokio::fs::create_dir_all(pointer.parent().unwrap_or(&self.root))
                    .await
                    .map_err(|e| StoreError::io(&pointer, e))?;
                write_atomic(&pointer, fingerprint.as_str().as_bytes()).await?;
            }
            return Ok(meta);
        }

        for dir in [&object_dir, &step_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StoreError::io(dir, e))?;
        }
        let next = self
            .versions_of(step)
            .await?
            .last()
            .map_or(1, |(v, _)| v + 1);
        write_atomic(&object_dir.join(OUTPUTS_FILE), &payload).await?;
        let version = claim_version(&step_dir, next, fingerprint).await?;
        let meta = ArtifactMeta {
            step: step.to_string(),
            version,
            fingerprint: fingerprint.clone(),
            created_at: Utc::now(),
        };
        write_atomic(&object_dir.join(META_FILE), &serde_json::to_vec_pretty(&meta)?).await?;

        debug!(step, version, fingerprint = %fingerprint.short(), "Stored artifact");
        Ok(meta)
    }

    async fn list_versions(&self, step: &str) -> Result<Vec<ArtifactMeta>, StoreError> {
        let mut metas = Vec::new();
        for (version, path) in self.versions_of(step).await? {
            let Some(fingerprint) = self.read_pointer(&path).await? else {
                warn!(step, version, "Skipping unreadable version pointer");
                continue;
            };
            match self.read_meta(&fingerprint).await? {
                Some(meta) => metas.push(meta),
                None => warn!(step, version, "Skipping version without metadata"),
            }
        }
        Ok(metas)
    }

    async fn get_version(&self, step: &str, version: u64) -> Result<Option<Artifact>, StoreError> {
        let path = Self::pointer_path(&self.step_dir(step)?, version);
        match self.read_pointer(&path).await? {
            Some(fingerprint) => self.get(&fingerprint).await,
            None => Ok(None),
        }
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()))
}

/// Links a pointer to `fingerprint` at the first free version from `from`.
async fn claim_version(
    step_dir: &Path,
    from: u64,
    fingerprint: &Fingerprint,
) -> Result<u64, StoreError> {
    let tmp = temp_path(&step_dir.join("pointer"));
    tokio::fs::write(&tmp, fingerprint.as_str().as_bytes())
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    let mut version = from;
    let claimed = loop {
        let pointer = FileArtifactStore::pointer_path(step_dir, version);
        match tokio::fs::hard_link(&tmp, &pointer).await {
            Ok(()) => break Ok(version),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(version, "Version already claimed; trying the next one");
                version += 1;
            }
            Err(e) => break Err(StoreError::io(&pointer, e)),
        }
    };
    if let Err(e) = tokio::fs::remove_file(&tmp).await {
        warn!(path = %tmp.display(), error = %e, "Could not remove temporary pointer");
    }
    claimed
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = temp_path(path);
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::io(path, e))
}
