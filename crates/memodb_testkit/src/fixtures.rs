//! Test fixtures and client helpers.
//!
//! A [`TestClient`] is one device: a database, its changelog and the three
//! controllers, backed either by memory or by a temporary directory.

use memodb_core::{
    Appliers, AttachmentController, ChangelogStore, Context, CreateMemo, Database, DbConfig,
    Memo, MemoController, SettingsController,
};
use memodb_storage::{FileSystem, InMemoryFileSystem, LocalFileSystem};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A database with its controllers and automatic cleanup.
pub struct TestClient {
    /// Context used for every call.
    pub ctx: Context,
    /// The database instance.
    pub db: Database,
    /// Changelog store shared by the controllers.
    pub changelog: ChangelogStore,
    /// Memo controller.
    pub memos: MemoController,
    /// Attachment controller.
    pub attachments: AttachmentController,
    /// Settings controller.
    pub settings: SettingsController,
    /// Filesystem holding attachments and, on disk, the snapshot.
    pub fs: Arc<dyn FileSystem>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestClient {
    /// Creates an in-memory client with the default source name.
    pub fn memory() -> Self {
        Self::memory_with(DbConfig::default())
    }

    /// Creates an in-memory client whose entries carry `source`.
    pub fn named(source: &str) -> Self {
        Self::memory_with(DbConfig::new().source_name(source))
    }

    /// Creates an in-memory client with `config`.
    pub fn memory_with(config: DbConfig) -> Self {
        let fs: Arc<dyn FileSystem> = Arc::new(InMemoryFileSystem::new());
        Self::assemble(Database::open_in_memory(config), fs, None)
    }

    /// Creates a client persisted in a fresh temporary directory.
    pub async fn on_disk() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let (db, fs) = open_dir(temp_dir.path(), DbConfig::default()).await;
        Self::assemble(db, fs, Some(temp_dir))
    }

    /// Drops the database and opens it again from disk.
    ///
    /// # Panics
    ///
    /// Panics for in-memory clients, which have nothing to reopen.
    pub async fn reopen(self) -> Self {
        let temp_dir = self._temp_dir.expect("Only on-disk clients can be reopened");
        let config = self.db.config().clone();
        drop(self.db);
        let (db, fs) = open_dir(temp_dir.path(), config).await;
        Self::assemble(db, fs, Some(temp_dir))
    }

    /// Returns the data directory if on disk, None if in memory.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().to_path_buf())
    }

    /// Creates a memo, panicking on failure.
    pub async fn memo(&self, content: &str) -> Memo {
        self.memos
            .create_memo(&self.ctx, CreateMemo::new(content))
            .await
            .expect("Failed to create memo")
    }

    /// Borrows the controllers that apply remote entries.
    pub fn appliers(&self) -> Appliers<'_> {
        Appliers {
            memos: &self.memos,
            attachments: &self.attachments,
            settings: &self.settings,
        }
    }

    fn assemble(db: Database, fs: Arc<dyn FileSystem>, temp_dir: Option<TempDir>) -> Self {
        let changelog = ChangelogStore::new(db.clone());
        Self {
            ctx: Context::new(),
            memos: MemoController::new(changelog.clone()),
            attachments: AttachmentController::new(changelog.clone(), fs.clone()),
            settings: SettingsController::new(changelog.clone()),
            db,
            changelog,
            fs,
            _temp_dir: temp_dir,
        }
    }
}

impl std::fmt::Debug for TestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestClient")
            .field("source", &self.changelog.source())
            .field("path", &self.path())
            .finish()
    }
}

async fn open_dir(dir: &Path, config: DbConfig) -> (Database, Arc<dyn FileSystem>) {
    let fs: Arc<dyn FileSystem> = Arc::new(
        LocalFileSystem::open(dir)
            .await
            .expect("Failed to open data directory"),
    );
    let db = Database::open(&Context::new(), fs.clone(), config)
        .await
        .expect("Failed to open file database");
    (db, fs)
}

/// Runs `f` on a current-thread runtime.
///
/// Lets proptest bodies, which are synchronous, drive the async controllers.
pub fn block_on<F: Future>(f: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
        .block_on(f)
}

/// Runs a test with a temporary in-memory client.
///
/// # Example
///
/// ```rust,ignore
/// use memodb_testkit::with_temp_client;
///
/// #[test]
/// fn my_test() {
///     with_temp_client(|client| async move {
///         client.memo("hello").await;
///     });
/// }
/// ```
pub fn with_temp_client<F, Fut, R>(f: F) -> R
where
    F: FnOnce(TestClient) -> Fut,
    Fut: Future<Output = R>,
{
    block_on(f(TestClient::memory()))
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a client holding `count` memos, each tagged `#n<i % 3>`.
    pub async fn populated_client(count: usize) -> TestClient {
        let client = TestClient::memory();
        for i in 0..count {
            client.memo(&format!("memo {i} #n{}", i % 3)).await;
        }
        client
    }
}
