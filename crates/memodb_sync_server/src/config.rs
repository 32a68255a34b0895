//! Server configuration.

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum entries accepted in one changelog upload.
    pub max_upload_entries: usize,
    /// Maximum size in bytes of an attachment or full-sync blob.
    pub max_blob_size: usize,
    /// Whether to require authentication.
    pub require_auth: bool,
    /// Secret key for token validation (if auth enabled).
    pub auth_secret: Option<Vec<u8>>,
}

impl ServerConfig {
    /// Creates a server configuration with the default limits.
    pub fn new() -> Self {
        Self {
            max_upload_entries: 500,
            max_blob_size: 32 * 1024 * 1024,
            require_auth: false,
            auth_secret: None,
        }
    }

    /// Sets the maximum entries per upload.
    pub fn with_max_upload_entries(mut self, max: usize) -> Self {
        self.max_upload_entries = max;
        self
    }

    /// Sets the maximum blob size.
    pub fn with_max_blob_size(mut self, max: usize) -> Self {
        self.max_blob_size = max;
        self
    }

    /// Enables authentication with the given secret.
    pub fn with_auth(mut self, secret: Vec<u8>) -> Self {
        self.require_auth = true;
        self.auth_secret = Some(secret);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_upload_entries, 500);
        assert_eq!(config.max_blob_size, ServerConfig::new().max_blob_size);
        assert!(!config.require_auth);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_max_upload_entries(50)
            .with_max_blob_size(1024)
            .with_auth(vec![1, 2, 3, 4]);

        assert_eq!(config.max_upload_entries, 50);
        assert_eq!(config.max_blob_size, 1024);
        assert!(config.require_auth);
        assert_eq!(config.auth_secret, Some(vec![1, 2, 3, 4]));
    }
}
