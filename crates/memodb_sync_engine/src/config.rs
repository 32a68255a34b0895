//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Changelog entries per page in the apply and upload passes.
    pub page_size: usize,
    /// Deadline applied to each request to the sync server.
    pub request_timeout: Duration,
    /// Name the account key is registered under.
    pub account_key_name: String,
    /// Key type reported with the account key.
    pub account_key_type: String,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            page_size: 50,
            request_timeout: Duration::from_secs(30),
            account_key_name: "primary".to_string(),
            account_key_type: "aes256gcm-v1".to_string(),
        }
    }

    /// Sets the page size. Zero is treated as one.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Sets the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the account key name.
    pub fn with_account_key_name(mut self, name: impl Into<String>) -> Self {
        self.account_key_name = name.into();
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
