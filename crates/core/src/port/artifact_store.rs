// Artifact Store Port
// Per-batch output directories and per-variant SVG files

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of a persisted variant inside its variant directory
pub const ARTIFACT_FILE_NAME: &str = "infographic.svg";

/// Artifact storage errors
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Batch directory {path} already exists")]
    AlreadyExists { path: String },

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// `batch_<batch_id>`
pub fn batch_dir_name(batch_id: &str) -> String {
    format!("batch_{}", batch_id)
}

/// `<batch_dir>/variant_<id>/infographic.svg`
pub fn variant_artifact_path(batch_dir: &Path, variant_id: u32) -> PathBuf {
    batch_dir
        .join(format!("variant_{}", variant_id))
        .join(ARTIFACT_FILE_NAME)
}

/// Artifact store trait
///
/// Each batch owns its directory exclusively; each variant writes only its
/// own file, so implementations need no cross-call locking.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Allocate the exclusive output directory of a batch
    ///
    /// # Errors
    /// - `ArtifactError::AlreadyExists` if another batch owns the directory
    /// - `ArtifactError::CreateDir` if the directory cannot be created
    async fn create_batch_dir(&self, batch_id: &str) -> Result<PathBuf, ArtifactError>;

    /// Persist one variant's SVG and return its path
    ///
    /// # Errors
    /// - `ArtifactError::CreateDir` / `ArtifactError::Write` on I/O failure
    async fn persist_variant(
        &self,
        batch_dir: &Path,
        variant_id: u32,
        payload: &[u8],
    ) -> Result<PathBuf, ArtifactError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// In-memory store that can be told to fail
    pub struct MockArtifactStore {
        root: PathBuf,
        fail_create: bool,
        fail_variants: HashSet<u32>,
        persisted: Mutex<Vec<(u32, PathBuf, usize)>>,
    }

    impl MockArtifactStore {
        pub fn new() -> Self {
            Self {
                root: PathBuf::from("generated"),
                fail_create: false,
                fail_variants: HashSet::new(),
                persisted: Mutex::new(Vec::new()),
            }
        }

        /// Every `create_batch_dir` call fails
        pub fn failing_create() -> Self {
            Self {
                fail_create: true,
                ..Self::new()
            }
        }

        /// Writes for this variant fail
        pub fn fail_variant(mut self, variant_id: u32) -> Self {
            self.fail_variants.insert(variant_id);
            self
        }

        /// `(variant_id, path, bytes)` of every successful write
        pub fn persisted(&self) -> Vec<(u32, PathBuf, usize)> {
            self.persisted.lock().unwrap().clone()
        }
    }

    impl Default for MockArtifactStore {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ArtifactStore for MockArtifactStore {
        async fn create_batch_dir(&self, batch_id: &str) -> Result<PathBuf, ArtifactError> {
            let path = self.root.join(batch_dir_name(batch_id));
            if self.fail_create {
                return Err(ArtifactError::CreateDir {
                    path: path.display().to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::PermissionDenied,
                        "read-only file system",
                    ),
                });
            }
            Ok(path)
        }

        async fn persist_variant(
            &self,
            batch_dir: &Path,
            variant_id: u32,
            payload: &[u8],
        ) -> Result<PathBuf, ArtifactError> {
            let path = variant_artifact_path(batch_dir, variant_id);
            if self.fail_variants.contains(&variant_id) {
                return Err(ArtifactError::Write {
                    path: path.display().to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "no space left on device"),
                });
            }
            self.persisted
                .lock()
                .unwrap()
                .push((variant_id, path.clone(), payload.len()));
            Ok(path)
        }
    }
}
