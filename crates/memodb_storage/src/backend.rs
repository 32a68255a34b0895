//! Filesystem trait definition.

use crate::error::StorageResult;
use async_trait::async_trait;

/// An asynchronous filesystem used for attachment bytes and database files.
///
/// Paths are logical (see [`crate::path`]). Implementations normalize them
/// and reject anything that could escape their root.
///
/// # Invariants
///
/// - `read` of a path that was never written fails with `StorageError::NotFound`
/// - `write` replaces the whole file; readers never observe a partial write
/// - `write` requires the parent directory to exist (see `mkdirp`)
/// - `mkdirp` is idempotent
///
/// # Implementors
///
/// - [`super::InMemoryFileSystem`] - For testing
/// - [`super::LocalFileSystem`] - For persistent storage
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Reads the whole file at `path`.
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Writes `data` to `path`, replacing any previous content.
    async fn write(&self, path: &str, data: &[u8]) -> StorageResult<()>;

    /// Creates `path` and all missing parent directories.
    async fn mkdirp(&self, path: &str) -> StorageResult<()>;

    /// Removes the file at `path`.
    async fn remove(&self, path: &str) -> StorageResult<()>;

    /// Returns true if a file exists at `path`.
    async fn exists(&self, path: &str) -> StorageResult<bool>;
}
