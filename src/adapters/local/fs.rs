use crate::config::RecorderConfig;
use crate::domain::errors::StorageError;
use crate::domain::segment::{PersistedHandle, RecoveryManifest};
use crate::ports::storage::StoragePort;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Filesystem storage: finished recordings go to `library_dir`, recovery
/// manifests to `work_dir`.
#[derive(Clone, Debug)]
pub struct FsStorage {
    library_dir: PathBuf,
    work_dir: PathBuf,
}

impl FsStorage {
    pub fn new(library_dir: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: library_dir.into(),
            work_dir: work_dir.into(),
        }
    }

    pub fn from_config(config: &RecorderConfig) -> Self {
        Self::new(&config.library_dir, &config.work_dir)
    }

    /// Free `VID_<millis>[_n].<ext>` name in the library.
    async fn library_path(&self, extension: &str) -> PathBuf {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();

        let mut candidate = self.library_dir.join(format!("VID_{}.{}", millis, extension));
        let mut n = 1;
        while tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            candidate = self
                .library_dir
                .join(format!("VID_{}_{}.{}", millis, n, extension));
            n += 1;
        }
        candidate
    }
}

/// Load a manifest written by `write_manifest`.
pub async fn read_manifest(path: &Path) -> Result<RecoveryManifest, StorageError> {
    let data = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&data)?)
}

#[async_trait]
impl StoragePort for FsStorage {
    async fn persist(&self, merged: &Path) -> Result<PersistedHandle, StorageError> {
        tokio::fs::create_dir_all(&self.library_dir).await?;

        let extension = merged
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("mp4");
        let destination = self.library_path(extension).await;

        // rename fails across filesystems; fall back to copy + remove.
        if let Err(e) = tokio::fs::rename(merged, &destination).await {
            debug!("Rename of {:?} failed ({}), copying instead", merged, e);
            tokio::fs::copy(merged, &destination).await?;
            tokio::fs::remove_file(merged).await?;
        }

        info!("Persisted recording to {:?}", destination);
        Ok(PersistedHandle { path: destination })
    }

    async fn delete_temporary(&self, path: &Path) -> Result<(), StorageError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!("Deleted temporary {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_manifest(&self, manifest: &RecoveryManifest) -> Result<PathBuf, StorageError> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let path = self
            .work_dir
            .join(format!("recovery_{}.json", manifest.session_id));
        tokio::fs::write(&path, serde_json::to_vec_pretty(manifest)?).await?;
        info!("Wrote recovery manifest {:?}", path);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::segment::Segment;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_persist_moves_into_library() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path().join("library"), dir.path().join("work"));
        let merged = dir.path().join("merged_x.mp4");
        tokio::fs::write(&merged, b"movie").await.unwrap();

        let handle = storage.persist(&merged).await.unwrap();

        assert!(!merged.exists());
        assert!(handle.path.starts_with(dir.path().join("library")));
        assert_eq!(handle.path.extension().unwrap(), "mp4");
        assert_eq!(tokio::fs::read(&handle.path).await.unwrap(), b"movie");
    }

    #[tokio::test]
    async fn test_persist_never_overwrites() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path(), dir.path().join("work"));
        let first = dir.path().join("a.mp4");
        let second = dir.path().join("b.mp4");
        tokio::fs::write(&first, b"first").await.unwrap();
        tokio::fs::write(&second, b"second").await.unwrap();

        let a = storage.persist(&first).await.unwrap();
        let b = storage.persist(&second).await.unwrap();

        assert_ne!(a.path, b.path);
        assert_eq!(tokio::fs::read(&a.path).await.unwrap(), b"first");
        assert_eq!(tokio::fs::read(&b.path).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_delete_temporary_tolerates_missing_file() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path(), dir.path());
        let segment = dir.path().join("segment_0.mp4");
        tokio::fs::write(&segment, b"x").await.unwrap();

        storage.delete_temporary(&segment).await.unwrap();
        assert!(!segment.exists());
        storage.delete_temporary(&segment).await.unwrap();
    }

    #[tokio::test]
    async fn test_manifest_round_trip_through_disk() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path().join("library"), dir.path().join("work"));
        let manifest = RecoveryManifest {
            session_id: "4f2c".to_string(),
            segments: vec![Segment::new("a.mp4", 10), Segment::new("b.mp4", 20)],
            attempted_output: PathBuf::from("merged.mp4"),
            reason: "corrupt sample".to_string(),
        };

        let path = storage.write_manifest(&manifest).await.unwrap();

        assert_eq!(path, dir.path().join("work").join("recovery_4f2c.json"));
        assert_eq!(read_manifest(&path).await.unwrap(), manifest);
    }
}
