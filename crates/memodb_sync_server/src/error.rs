//! Error types for the sync server.

use memodb_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or malformed credentials.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Valid credentials, but not for this request.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Unknown route or missing resource.
    #[error("not found: {0}")]
    NotFound(String),

    /// Request body or entry count over the configured limit.
    #[error("payload too large: {size} > {limit}")]
    PayloadTooLarge {
        /// Size of the request.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::AuthenticationFailed(_)
                | ServerError::NotAuthorized(_)
                | ServerError::NotFound(_)
                | ServerError::PayloadTooLarge { .. }
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Internal(_))
    }

    /// HTTP status code for the error.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) => 400,
            ServerError::AuthenticationFailed(_) => 401,
            ServerError::NotAuthorized(_) => 403,
            ServerError::NotFound(_) => 404,
            ServerError::PayloadTooLarge { .. } => 413,
            ServerError::Internal(_) => 500,
        }
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        ServerError::InvalidRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(!ServerError::InvalidRequest("bad".into()).is_server_error());
    }

    #[test]
    fn status_codes() {
        assert_eq!(ServerError::AuthenticationFailed("no token".into()).status_code(), 401);
        assert_eq!(ServerError::NotAuthorized("other client".into()).status_code(), 403);
        assert_eq!(ServerError::NotFound("/x".into()).status_code(), 404);
        assert_eq!(
            ServerError::PayloadTooLarge { size: 10, limit: 5 }.status_code(),
            413
        );
    }

    #[test]
    fn error_display() {
        let err = ServerError::PayloadTooLarge { size: 600, limit: 500 };
        let msg = err.to_string();
        assert!(msg.contains("600"));
        assert!(msg.contains("500"));
    }
}
