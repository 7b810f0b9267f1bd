// Filesystem artifact store
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use infographic_core::port::artifact_store::{batch_dir_name, variant_artifact_path};
use infographic_core::port::{ArtifactError, ArtifactStore};

/// Writes batches under `<root>/batch_<id>/variant_<n>/infographic.svg`
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn create_batch_dir(&self, batch_id: &str) -> Result<PathBuf, ArtifactError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| ArtifactError::CreateDir {
                path: self.root.display().to_string(),
                source,
            })?;

        let dir = self.root.join(batch_dir_name(batch_id));
        tokio::fs::create_dir(&dir).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::AlreadyExists {
                ArtifactError::AlreadyExists {
                    path: dir.display().to_string(),
                }
            } else {
                ArtifactError::CreateDir {
                    path: dir.display().to_string(),
                    source,
                }
            }
        })?;
        debug!(path = %dir.display(), "Batch directory created");
        Ok(dir)
    }

    async fn persist_variant(
        &self,
        batch_dir: &Path,
        variant_id: u32,
        payload: &[u8],
    ) -> Result<PathBuf, ArtifactError> {
        let path = variant_artifact_path(batch_dir, variant_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ArtifactError::CreateDir {
                    path: parent.display().to_string(),
                    source,
                })?;
        }
        tokio::fs::write(&path, payload)
            .await
            .map_err(|source| ArtifactError::Write {
                path: path.display().to_string(),
                source,
            })?;
        debug!(path = %path.display(), bytes = payload.len(), "Variant artifact written");
        Ok(path)
    }
}
