//! An opened data directory.

use crate::error::CliResult;
use memodb_core::repo::kv;
use memodb_core::{
    AttachmentController, ChangelogStore, Context, Database, DbConfig, MemoController,
    SettingsController,
};
use memodb_storage::{FileSystem, LocalFileSystem};
use memodb_sync_engine::{SyncInfo, SYNC_INFO_KEY};
use std::path::Path;
use std::sync::Arc;

/// Logical path of the snapshot file inside the data directory.
pub const DB_FILE: &str = "/memodb.db";

/// The database and controllers of one data directory.
pub struct Session {
    /// Context for every call made by the command.
    pub ctx: Context,
    /// The database.
    pub db: Database,
    /// Changelog store.
    pub changelog: ChangelogStore,
    /// Memo controller.
    pub memos: MemoController,
    /// Attachment controller.
    pub attachments: AttachmentController,
    /// Settings controller.
    pub settings: SettingsController,
    /// Stored sync settings, if sync was ever set up.
    pub sync_info: Option<SyncInfo>,
}

impl Session {
    /// Opens (or creates) the database under `dir`.
    ///
    /// Entries written by commands carry the sync client id when sync is
    /// set up, so the next sync cycle uploads them like any other edit.
    pub async fn open(dir: &Path) -> CliResult<Self> {
        let ctx = Context::new();
        let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::open(dir).await?);
        let db = Database::open(&ctx, fs.clone(), DbConfig::new().path(DB_FILE)).await?;
        tracing::debug!(dir = %dir.display(), "opened data directory");

        let changelog = ChangelogStore::new(db.clone());
        let sync_info: Option<SyncInfo> = db.read(|t| kv::get(t, SYNC_INFO_KEY))?;
        if let Some(info) = sync_info.as_ref().filter(|i| i.is_enabled) {
            changelog.set_source(info.client_id.clone());
        }

        Ok(Self {
            memos: MemoController::new(changelog.clone()),
            attachments: AttachmentController::new(changelog.clone(), fs),
            settings: SettingsController::new(changelog.clone()),
            ctx,
            db,
            changelog,
            sync_info,
        })
    }
}
