//! Error types for filesystem operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during filesystem operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested file does not exist.
    #[error("file not found: {path}")]
    NotFound {
        /// Logical path that was requested.
        path: String,
    },

    /// An I/O error occurred.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Logical path of the failed operation.
        path: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The path is not a valid logical path.
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl StorageError {
    /// Creates a not-found error for a path.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Wraps an I/O error, mapping `ErrorKind::NotFound` to [`StorageError::NotFound`].
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }

    /// Returns true if the error means the file does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_not_found_is_mapped() {
        let err = StorageError::io("/a", io::Error::from(io::ErrorKind::NotFound));
        assert!(err.is_not_found());

        let err = StorageError::io("/a", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("/a"));
    }
}
