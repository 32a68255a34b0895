//! Local-disk filesystem rooted at a directory.

use crate::backend::FileSystem;
use crate::error::{StorageError, StorageResult};
use crate::path;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;

/// A filesystem backed by a directory on the local disk.
///
/// Logical paths are resolved below `root`. Writes go to a temporary sibling
/// file which is synced and then renamed over the target, so a crash never
/// leaves a half-written attachment or database file behind.
///
/// # Example
///
/// ```no_run
/// use memodb_storage::{FileSystem, LocalFileSystem};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let fs = LocalFileSystem::open("/var/lib/memodb").await.unwrap();
/// fs.write("/memodb.db", b"...").await.unwrap();
/// # });
/// ```
#[derive(Debug)]
pub struct LocalFileSystem {
    root: PathBuf,
    tmp_counter: AtomicU64,
}

impl LocalFileSystem {
    /// Opens a filesystem rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub async fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StorageError::io(root.display().to_string(), e))?;
        Ok(Self {
            root,
            tmp_counter: AtomicU64::new(0),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a logical path to a path on disk.
    pub fn resolve(&self, logical: &str) -> StorageResult<PathBuf> {
        let normalized = path::normalize(logical)?;
        let mut resolved = self.root.clone();
        for segment in normalized.split('/').filter(|s| !s.is_empty()) {
            resolved.push(segment);
        }
        Ok(resolved)
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read(&self, p: &str) -> StorageResult<Vec<u8>> {
        let target = self.resolve(p)?;
        tokio::fs::read(&target)
            .await
            .map_err(|e| StorageError::io(p, e))
    }

    async fn write(&self, p: &str, data: &[u8]) -> StorageResult<()> {
        let target = self.resolve(p)?;
        let n = self.tmp_counter.fetch_add(1, Ordering::SeqCst);
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| StorageError::InvalidPath(p.to_string()))?;
        let tmp = target.with_file_name(format!(".{file_name}.{}.{n}.tmp", std::process::id()));

        let result = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, &target).await
        }
        .await;

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StorageError::io(p, e));
        }
        tracing::trace!(path = p, bytes = data.len(), "wrote file");
        Ok(())
    }

    async fn mkdirp(&self, p: &str) -> StorageResult<()> {
        let target = self.resolve(p)?;
        tokio::fs::create_dir_all(&target)
            .await
            .map_err(|e| StorageError::io(p, e))
    }

    async fn remove(&self, p: &str) -> StorageResult<()> {
        let target = self.resolve(p)?;
        tokio::fs::remove_file(&target)
            .await
            .map_err(|e| StorageError::io(p, e))
    }

    async fn exists(&self, p: &str) -> StorageResult<bool> {
        let target = self.resolve(p)?;
        tokio::fs::try_exists(&target)
            .await
            .map_err(|e| StorageError::io(p, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn file_write_and_read() {
        let dir = tempdir().unwrap();
        let fs = LocalFileSystem::open(dir.path()).await.unwrap();

        fs.mkdirp("/aa/bb").await.unwrap();
        fs.write("/aa/bb/cc", b"persistent data").await.unwrap();

        assert_eq!(fs.read("/aa/bb/cc").await.unwrap(), b"persistent data");
        assert!(dir.path().join("aa").join("bb").join("cc").exists());
    }

    #[tokio::test]
    async fn file_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let fs = LocalFileSystem::open(dir.path()).await.unwrap();
        assert!(fs.read("/nothing").await.unwrap_err().is_not_found());
        assert!(!fs.exists("/nothing").await.unwrap());
    }

    #[tokio::test]
    async fn file_persistence_across_instances() {
        let dir = tempdir().unwrap();
        {
            let fs = LocalFileSystem::open(dir.path()).await.unwrap();
            fs.write("/memodb.db", b"snapshot").await.unwrap();
        }
        let fs = LocalFileSystem::open(dir.path()).await.unwrap();
        assert_eq!(fs.read("/memodb.db").await.unwrap(), b"snapshot");
    }

    #[tokio::test]
    async fn file_overwrite_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let fs = LocalFileSystem::open(dir.path()).await.unwrap();
        fs.write("/f", b"one").await.unwrap();
        fs.write("/f", b"two").await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(fs.read("/f").await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn file_remove() {
        let dir = tempdir().unwrap();
        let fs = LocalFileSystem::open(dir.path()).await.unwrap();
        fs.write("/f", b"x").await.unwrap();
        fs.remove("/f").await.unwrap();
        assert!(fs.remove("/f").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn file_open_creates_nested_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("nested").join("root");
        let fs = LocalFileSystem::open(&root).await.unwrap();
        assert_eq!(fs.root(), root);
        assert!(root.exists());
    }

    #[tokio::test]
    async fn file_resolve_rejects_escape() {
        let dir = tempdir().unwrap();
        let fs = LocalFileSystem::open(dir.path()).await.unwrap();
        assert!(fs.resolve("/../x").is_err());
    }
}
