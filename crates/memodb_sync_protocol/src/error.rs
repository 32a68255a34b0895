//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding or validating protocol data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload has an unknown or inconsistent shape.
    #[error("validation error: {0}")]
    Validation(String),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Base64 decoding failed.
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl ProtocolError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
