//! In-memory filesystem for testing.

use crate::backend::FileSystem;
use crate::error::{StorageError, StorageResult};
use crate::path;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

/// An in-memory filesystem.
///
/// Suitable for:
/// - Unit and integration tests
/// - Ephemeral clients that don't need persistence
///
/// Directories are tracked explicitly so that writing into a directory that
/// was never created fails the same way it does on disk.
///
/// # Example
///
/// ```rust
/// use memodb_storage::{FileSystem, InMemoryFileSystem};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let fs = InMemoryFileSystem::new();
/// assert!(fs.read("/missing").await.unwrap_err().is_not_found());
/// # });
/// ```
#[derive(Debug, Default)]
pub struct InMemoryFileSystem {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
    dirs: RwLock<BTreeSet<String>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl InMemoryFileSystem {
    /// Creates a new empty filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the paths of all files, sorted.
    #[must_use]
    pub fn files(&self) -> Vec<String> {
        self.files.read().keys().cloned().collect()
    }

    /// Returns the number of files stored.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    /// Number of successful reads served so far.
    #[must_use]
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of writes performed so far.
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn dir_exists(&self, dir: &str) -> bool {
        dir == "/" || self.dirs.read().contains(dir)
    }
}

#[async_trait]
impl FileSystem for InMemoryFileSystem {
    async fn read(&self, p: &str) -> StorageResult<Vec<u8>> {
        let p = path::normalize(p)?;
        let data = self
            .files
            .read()
            .get(&p)
            .cloned()
            .ok_or_else(|| StorageError::not_found(&p))?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(data)
    }

    async fn write(&self, p: &str, data: &[u8]) -> StorageResult<()> {
        let p = path::normalize(p)?;
        let parent = path::parent(&p).ok_or_else(|| StorageError::InvalidPath(p.clone()))?;
        if !self.dir_exists(parent) {
            return Err(StorageError::Io {
                path: p,
                source: io::Error::new(io::ErrorKind::NotFound, "parent directory missing"),
            });
        }
        if self.dirs.read().contains(&p) {
            return Err(StorageError::Io {
                path: p,
                source: io::Error::other("is a directory"),
            });
        }

        self.files.write().insert(p, data.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn mkdirp(&self, p: &str) -> StorageResult<()> {
        let p = path::normalize(p)?;
        let files = self.files.read();
        let mut dirs = self.dirs.write();
        for dir in path::ancestors(&p) {
            if files.contains_key(dir) {
                return Err(StorageError::Io {
                    path: dir.to_string(),
                    source: io::Error::other("not a directory"),
                });
            }
            dirs.insert(dir.to_string());
        }
        Ok(())
    }

    async fn remove(&self, p: &str) -> StorageResult<()> {
        let p = path::normalize(p)?;
        self.files
            .write()
            .remove(&p)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(p))
    }

    async fn exists(&self, p: &str) -> StorageResult<bool> {
        let p = path::normalize(p)?;
        Ok(self.files.read().contains_key(&p))
    }
}
