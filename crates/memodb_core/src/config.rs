//! Database configuration.

use crate::search::TokenizerConfig;
use std::time::Duration;

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Logical path of the database snapshot file.
    pub path: String,

    /// Root directory for content-addressed attachment bytes.
    pub attachments_root: String,

    /// Name written to the `source` field of new changelog entries.
    pub source_name: String,

    /// Whether every commit writes the snapshot file.
    pub persist_on_commit: bool,

    /// How long a deleted memo is kept before cleanup removes it.
    pub deleted_memo_retention: Duration,

    /// Page size used when a listing is requested without one.
    pub default_page_size: usize,

    /// Tokenizer for memo full-text search.
    pub tokenizer: TokenizerConfig,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: "/memodb.db".to_string(),
            attachments_root: "/attachments".to_string(),
            source_name: "local".to_string(),
            persist_on_commit: true,
            deleted_memo_retention: Duration::from_secs(30 * 24 * 60 * 60), // 30 days
            default_page_size: 50,
            tokenizer: TokenizerConfig::default(),
        }
    }
}

impl DbConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the snapshot file path.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the attachments root directory.
    #[must_use]
    pub fn attachments_root(mut self, root: impl Into<String>) -> Self {
        self.attachments_root = root.into();
        self
    }

    /// Sets the changelog source name.
    #[must_use]
    pub fn source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }

    /// Sets whether commits write the snapshot file.
    #[must_use]
    pub const fn persist_on_commit(mut self, value: bool) -> Self {
        self.persist_on_commit = value;
        self
    }

    /// Sets the retention for deleted memos.
    #[must_use]
    pub const fn deleted_memo_retention(mut self, retention: Duration) -> Self {
        self.deleted_memo_retention = retention;
        self
    }

    /// Sets the default page size.
    #[must_use]
    pub const fn default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = size;
        self
    }

    /// Sets the search tokenizer.
    #[must_use]
    pub fn tokenizer(mut self, tokenizer: TokenizerConfig) -> Self {
        self.tokenizer = tokenizer;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = DbConfig::default();
        assert_eq!(config.path, "/memodb.db");
        assert_eq!(config.attachments_root, "/attachments");
        assert!(config.persist_on_commit);
        assert_eq!(config.default_page_size, 50);
    }

    #[test]
    fn builder_pattern() {
        let config = DbConfig::new()
            .path("/data/notes.db")
            .source_name("laptop")
            .persist_on_commit(false)
            .deleted_memo_retention(Duration::ZERO);

        assert_eq!(config.path, "/data/notes.db");
        assert_eq!(config.source_name, "laptop");
        assert!(!config.persist_on_commit);
        assert_eq!(config.deleted_memo_retention, Duration::ZERO);
    }
}
