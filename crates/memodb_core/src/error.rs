//! Error types for memodb core.

use memodb_storage::StorageError;
use memodb_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Coarse classification of a [`CoreError`].
///
/// Context wrappers never change the kind of the error they wrap, so callers
/// can branch on `err.kind()` no matter how many layers added context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A memo, attachment, setting or file does not exist.
    NotFound,
    /// Filesystem failure other than not-found.
    Io,
    /// Hashing, key or AEAD failure.
    Crypto,
    /// Database constraint or persistence failure.
    Storage,
    /// Remote API failure.
    Network,
    /// Malformed input or wire data.
    Validation,
    /// The operation's context was cancelled.
    Cancelled,
    /// The operation's deadline passed.
    Timeout,
}

/// Errors that can occur in memodb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind, e.g. `"memo"`.
        entity: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// Entity with the same id already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Entity kind, e.g. `"memo"`.
        entity: &'static str,
        /// The conflicting id.
        id: String,
    },

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] StorageError),

    /// Cryptographic failure.
    #[error("crypto error: {message}")]
    Crypto {
        /// Description of the failure.
        message: String,
    },

    /// Database constraint or persistence failure.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the failure.
        message: String,
    },

    /// Remote API failure.
    #[error("network error: {message}")]
    Network {
        /// Description of the failure.
        message: String,
    },

    /// Invalid input.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the problem.
        message: String,
    },

    /// Changelog entry or wire message could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Database snapshot could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the problem.
        message: String,
    },

    /// Operation was cancelled through its context.
    #[error("operation cancelled")]
    Cancelled,

    /// Operation ran past its context deadline.
    #[error("deadline exceeded")]
    Timeout,

    /// Another error with the operation and target that produced it.
    #[error("{context}: {source}")]
    Context {
        /// Operation description, e.g. `"update memo abc"`.
        context: String,
        /// The wrapped error.
        #[source]
        source: Box<CoreError>,
    },
}

impl CoreError {
    /// Creates a not-found error.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates an already-exists error.
    pub fn already_exists(entity: &'static str, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity,
            id: id.into(),
        }
    }

    /// Creates a crypto error.
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Wraps this error with a description of the failed operation.
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Io(e) if e.is_not_found() => ErrorKind::NotFound,
            Self::Io(_) => ErrorKind::Io,
            Self::Crypto { .. } => ErrorKind::Crypto,
            Self::AlreadyExists { .. } | Self::Storage { .. } | Self::Codec { .. } => {
                ErrorKind::Storage
            }
            Self::Network { .. } => ErrorKind::Network,
            Self::Validation { .. } | Self::Protocol(_) => ErrorKind::Validation,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Timeout => ErrorKind::Timeout,
            Self::Context { source, .. } => source.kind(),
        }
    }

    /// Returns the innermost error, skipping context wrappers.
    pub fn root(&self) -> &CoreError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns true if this error is, or wraps, a duplicate-id error.
    pub fn is_already_exists(&self) -> bool {
        matches!(self.root(), Self::AlreadyExists { .. })
    }

    /// Returns true if this error is, or wraps, a not-found error.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Adds operation context to fallible results.
pub trait ResultExt<T> {
    /// Wraps the error, if any, with `context`.
    fn context(self, context: impl Into<String>) -> CoreResult<T>;

    /// Wraps the error, if any, with a lazily built context.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> CoreResult<T>;
}

impl<T, E: Into<CoreError>> ResultExt<T> for Result<T, E> {
    fn context(self, context: impl Into<String>) -> CoreResult<T> {
        self.map_err(|e| e.into().context(context))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> CoreResult<T> {
        self.map_err(|e| e.into().context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_preserves_kind() {
        let err = CoreError::not_found("memo", "m1")
            .context("update memo m1")
            .context("apply changelog");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(matches!(err.root(), CoreError::NotFound { .. }));
        assert_eq!(
            err.to_string(),
            "apply changelog: update memo m1: memo not found: m1"
        );
    }

    #[test]
    fn storage_not_found_maps_to_not_found_kind() {
        let err: CoreError = StorageError::not_found("/a/b").into();
        assert!(err.is_not_found());

        let err: CoreError = StorageError::InvalidPath("..".into()).into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn protocol_errors_are_validation() {
        let err: CoreError = ProtocolError::validation("bad target").into();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn result_ext_wraps() {
        let res: Result<(), StorageError> = Err(StorageError::not_found("/x"));
        let err = res.with_context(|| "read attachment a1".to_string()).unwrap_err();
        assert!(err.to_string().starts_with("read attachment a1: "));
        assert!(err.is_not_found());
    }
}
