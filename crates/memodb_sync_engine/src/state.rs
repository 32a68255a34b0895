//! Sync state and statistics.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Engine is idle, not syncing.
    Idle,
    /// Registering the account key fingerprint with the server.
    UploadingAccountKey,
    /// Fetching and inserting remote changelog entries.
    FetchingRemote,
    /// Applying unapplied entries, while local entries upload alongside.
    Applying,
    /// Apply finished; local entries are still uploading.
    UploadingLocal,
    /// The last cycle failed.
    Error,
}

impl SyncState {
    /// Returns true while a cycle is running.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncState::Idle | SyncState::Error)
    }

    /// Returns true if the engine can start a new sync.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncState::Idle | SyncState::Error)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncState::Idle => "idle",
            SyncState::UploadingAccountKey => "uploading-account-key",
            SyncState::FetchingRemote => "fetching-remote",
            SyncState::Applying => "applying",
            SyncState::UploadingLocal => "uploading-local",
            SyncState::Error => "error",
        })
    }
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Total number of sync cycles completed.
    pub cycles_completed: u64,
    /// Remote entries inserted into the local changelog.
    pub entries_fetched: u64,
    /// Entries applied to the local tables.
    pub entries_applied: u64,
    /// Local entries uploaded.
    pub entries_uploaded: u64,
    /// Attachment files uploaded.
    pub attachments_uploaded: u64,
    /// Last successful sync time.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a sync cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncCycleResult {
    /// Remote entries inserted.
    pub fetched: u64,
    /// Remote entries skipped: this client's own uploads or already known ids.
    pub skipped: u64,
    /// Entries applied.
    pub applied: u64,
    /// Local entries uploaded.
    pub uploaded: u64,
    /// Attachment files uploaded.
    pub attachments_uploaded: u64,
    /// Duration of the sync cycle.
    pub duration: Duration,
}
