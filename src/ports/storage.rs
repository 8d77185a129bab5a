use crate::domain::errors::StorageError;
use crate::domain::segment::{PersistedHandle, RecoveryManifest};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoragePort: Send + Sync {
    /// Take ownership of a finished recording
    async fn persist(&self, merged: &Path) -> Result<PersistedHandle, StorageError>;

    /// Remove a temporary file (a segment or a merged output)
    async fn delete_temporary(&self, path: &Path) -> Result<(), StorageError>;

    /// Record which segments a failed merge left behind
    async fn write_manifest(&self, manifest: &RecoveryManifest) -> Result<PathBuf, StorageError>;
}
