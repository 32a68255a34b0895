//! Error types for the sync engine.

use memodb_core::{CoreError, ErrorKind};
use memodb_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The request never produced a response.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A request or response body could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered with a non-success status.
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Message from the error body.
        message: String,
    },

    /// Local database, crypto or filesystem failure.
    #[error("database error: {0}")]
    Core(CoreError),

    /// Sync has not been set up, or was reset.
    #[error("sync is not enabled")]
    NotEnabled,

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// The context deadline passed.
    #[error("operation timed out")]
    Timeout,

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns true for a 404 from the server.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Server { status: 404, .. })
            || matches!(self, SyncError::Core(e) if e.is_not_found())
    }
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err.kind() {
            ErrorKind::Cancelled => SyncError::Cancelled,
            ErrorKind::Timeout => SyncError::Timeout,
            _ => SyncError::Core(err),
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}

impl From<SyncError> for CoreError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Core(e) => e,
            SyncError::Cancelled => CoreError::Cancelled,
            SyncError::Timeout => CoreError::Timeout,
            other => CoreError::network(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection reset").is_retryable());
        assert!(!SyncError::transport_fatal("bad base url").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::Server {
            status: 503,
            message: "busy".into()
        }
        .is_retryable());
        assert!(!SyncError::Server {
            status: 401,
            message: "who are you".into()
        }
        .is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn context_signals_map_to_sync_variants() {
        assert!(matches!(
            SyncError::from(CoreError::Cancelled.context("apply page")),
            SyncError::Cancelled
        ));
        assert!(matches!(SyncError::from(CoreError::Timeout), SyncError::Timeout));
        assert!(matches!(
            SyncError::from(CoreError::validation("bad")),
            SyncError::Core(_)
        ));
    }

    #[test]
    fn error_display() {
        let err = SyncError::Server {
            status: 413,
            message: "too many entries".into(),
        };
        assert_eq!(err.to_string(), "server error (413): too many entries");
        assert_eq!(SyncError::NotEnabled.to_string(), "sync is not enabled");
    }
}
