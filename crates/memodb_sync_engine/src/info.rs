//! Persisted sync settings.

use crate::error::SyncResult;
use chrono::{DateTime, Utc};
use memodb_core::repo::kv;
use memodb_core::{Context, Database, Transaction};
use serde::{Deserialize, Serialize};

/// Key of the sync info item in the database's key/value table.
pub const SYNC_INFO_KEY: &str = "sync_info";

/// Sync state kept across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncInfo {
    /// Whether sync is set up.
    pub is_enabled: bool,
    /// Base URL of the sync server.
    pub server: String,
    /// Account name on the server.
    pub username: String,
    /// This client's id, also written as `source` of new changelog entries.
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// Start time of the last successful sync cycle.
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Parameters for [`SyncEngine::setup`](crate::SyncEngine::setup).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupSync {
    /// Base URL of the sync server.
    pub server: String,
    /// Account name on the server.
    pub username: String,
    /// Client id to register; a new one is generated when absent.
    pub client_id: Option<String>,
}

impl SetupSync {
    /// Creates setup parameters with a generated client id.
    pub fn new(server: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            username: username.into(),
            client_id: None,
        }
    }

    /// Uses `client_id` instead of generating one.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

/// Reads the committed sync info.
pub fn load(db: &Database) -> SyncResult<Option<SyncInfo>> {
    Ok(db.read(|t| kv::get(t, SYNC_INFO_KEY))?)
}

/// Writes `info` inside `tx`.
pub fn store(tx: &Transaction, info: &SyncInfo) -> SyncResult<()> {
    Ok(tx.write(|t| kv::set(t, SYNC_INFO_KEY, info))?)
}

/// Writes `info` in its own transaction.
pub async fn save(ctx: &Context, db: &Database, info: &SyncInfo) -> SyncResult<()> {
    let tx = db.begin(ctx).await?;
    store(&tx, info)?;
    tx.commit(ctx).await?;
    Ok(())
}

/// Removes the sync info. Returns true if it existed.
pub async fn clear(ctx: &Context, db: &Database) -> SyncResult<bool> {
    let tx = db.begin(ctx).await?;
    let removed = tx.write(|t| kv::remove(t, SYNC_INFO_KEY));
    tx.commit(ctx).await?;
    Ok(removed)
}
