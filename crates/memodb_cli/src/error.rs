//! CLI errors.

use memodb_core::CoreError;
use memodb_storage::StorageError;
use memodb_sync_engine::SyncError;
use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors a command can fail with.
#[derive(Debug, Error)]
pub enum CliError {
    /// Database or controller failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Filesystem failure while opening the data directory.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Failure reading sync state.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Local file I/O.
    #[error("{path}: {source}")]
    Io {
        /// File involved.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// JSON input or output.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// Stored data failed a consistency check.
    #[error("verification failed: {0}")]
    Verification(String),

    /// Bad arguments.
    #[error("{0}")]
    Usage(String),
}

impl CliError {
    /// Wraps an I/O error on `path`.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        CliError::Io {
            path: path.into(),
            source,
        }
    }
}
