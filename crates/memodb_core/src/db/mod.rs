//! The embedded database.
//!
//! All tables live in memory behind a single-writer lock. Each commit
//! replaces the committed tables atomically and, when the database has a
//! filesystem, rewrites the snapshot file (see [`tables::encode_snapshot`]).
//! Readers outside a transaction always see the last committed state.

mod tables;
mod transaction;

pub use tables::{decode_snapshot, encode_snapshot, TableStats, Tables, FORMAT_VERSION};
pub use transaction::{Transaction, TxScope};

use crate::config::DbConfig;
use crate::context::Context;
use crate::error::{CoreError, CoreResult, ResultExt};
use memodb_storage::{path, FileSystem};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Commit and rollback counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DbStats {
    /// Committed transactions that wrote something.
    pub commits: u64,
    /// Rolled back transactions.
    pub rollbacks: u64,
    /// Snapshot files written.
    pub snapshots_written: u64,
}

pub(crate) struct DbInner {
    pub(crate) committed: RwLock<Tables>,
    writer: Arc<tokio::sync::Mutex<()>>,
    fs: Option<Arc<dyn FileSystem>>,
    config: DbConfig,
    next_txn_id: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    snapshots_written: AtomicU64,
}

/// Handle to an open database. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    pub(crate) inner: Arc<DbInner>,
}

impl Database {
    fn from_parts(tables: Tables, fs: Option<Arc<dyn FileSystem>>, config: DbConfig) -> Self {
        Self {
            inner: Arc::new(DbInner {
                committed: RwLock::new(tables),
                writer: Arc::new(tokio::sync::Mutex::new(())),
                fs,
                config,
                next_txn_id: AtomicU64::new(1),
                commits: AtomicU64::new(0),
                rollbacks: AtomicU64::new(0),
                snapshots_written: AtomicU64::new(0),
            }),
        }
    }

    /// Opens a database that lives only in memory.
    #[must_use]
    pub fn open_in_memory(config: DbConfig) -> Self {
        let tables = Tables::new(config.tokenizer.clone());
        Self::from_parts(tables, None, config)
    }

    /// Opens the database stored at `config.path` on `fs`, creating an
    /// empty one if the snapshot file does not exist yet.
    #[tracing::instrument(skip_all, fields(path = %config.path))]
    pub async fn open(
        ctx: &Context,
        fs: Arc<dyn FileSystem>,
        config: DbConfig,
    ) -> CoreResult<Self> {
        let db_path = path::normalize(&config.path)?;
        if let Some(parent) = path::parent(&db_path) {
            ctx.run(async { fs.mkdirp(parent).await.map_err(CoreError::from) })
                .await?;
        }

        let tables = load_tables(ctx, fs.as_ref(), &db_path, &config).await?;
        tracing::debug!(
            memos = tables.memos.len(),
            entries = tables.changelog.len(),
            "opened database"
        );
        Ok(Self::from_parts(tables, Some(fs), config))
    }

    /// Returns the configuration.
    pub fn config(&self) -> &DbConfig {
        &self.inner.config
    }

    /// Returns the filesystem, if the database is persistent.
    pub fn filesystem(&self) -> Option<&Arc<dyn FileSystem>> {
        self.inner.fs.as_ref()
    }

    /// Begins a transaction, waiting for the writer lock.
    pub async fn begin(&self, ctx: &Context) -> CoreResult<Transaction> {
        let writer = ctx
            .run(async {
                Ok::<_, CoreError>(Arc::clone(&self.inner.writer).lock_owned().await)
            })
            .await?;
        let id = self.inner.next_txn_id.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(txn = id, "begin transaction");
        Ok(Transaction::new(self.clone(), id, writer))
    }

    /// Reuses `tx` if given, otherwise begins a new transaction.
    pub async fn in_transaction<'a>(
        &self,
        ctx: &Context,
        tx: Option<&'a Transaction>,
    ) -> CoreResult<TxScope<'a>> {
        match tx {
            Some(tx) => Ok(TxScope::Borrowed(tx)),
            None => Ok(TxScope::Owned(self.begin(ctx).await?)),
        }
    }

    /// Reads the committed tables.
    pub fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        f(&self.inner.committed.read())
    }

    /// Row counts of the committed tables.
    pub fn table_stats(&self) -> TableStats {
        self.read(Tables::stats)
    }

    /// Commit and rollback counters.
    pub fn stats(&self) -> DbStats {
        DbStats {
            commits: self.inner.commits.load(Ordering::Relaxed),
            rollbacks: self.inner.rollbacks.load(Ordering::Relaxed),
            snapshots_written: self.inner.snapshots_written.load(Ordering::Relaxed),
        }
    }

    /// Returns the bytes of the whole database.
    ///
    /// This is the snapshot file when it exists, otherwise an encoding of
    /// the committed tables.
    pub async fn export(&self, ctx: &Context) -> CoreResult<Vec<u8>> {
        if let (Some(fs), true) = (&self.inner.fs, self.inner.config.persist_on_commit) {
            let db_path = path::normalize(&self.inner.config.path)?;
            match ctx.run(async { fs.read(&db_path).await.map_err(CoreError::from) }).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        self.read(encode_snapshot)
    }

    /// Replaces the whole database with `bytes` from [`export`](Self::export).
    ///
    /// The bytes are validated before anything is replaced.
    #[tracing::instrument(skip_all, fields(len = bytes.len()))]
    pub async fn import(&self, ctx: &Context, bytes: &[u8]) -> CoreResult<()> {
        let tables = decode_snapshot(bytes, self.inner.config.tokenizer.clone())
            .context("import database")?;
        let tx = self.begin(ctx).await?;
        tx.write(|t| *t = tables);
        tx.commit(ctx).await?;
        tracing::info!("imported database snapshot");
        Ok(())
    }

    /// Re-reads the snapshot file, discarding the in-memory state.
    pub async fn reload(&self, ctx: &Context) -> CoreResult<()> {
        let Some(fs) = &self.inner.fs else {
            return Ok(());
        };
        let _writer = ctx
            .run(async {
                Ok::<_, CoreError>(Arc::clone(&self.inner.writer).lock_owned().await)
            })
            .await?;
        let db_path = path::normalize(&self.inner.config.path)?;
        let tables = load_tables(ctx, fs.as_ref(), &db_path, &self.inner.config).await?;
        *self.inner.committed.write() = tables;
        Ok(())
    }

    pub(crate) async fn persist(&self, ctx: &Context, tables: &Tables) -> CoreResult<()> {
        let Some(fs) = &self.inner.fs else {
            return Ok(());
        };
        if !self.inner.config.persist_on_commit {
            return Ok(());
        }

        let bytes = encode_snapshot(tables)?;
        let db_path = path::normalize(&self.inner.config.path)?;
        ctx.run(async { fs.write(&db_path, &bytes).await.map_err(CoreError::from) })
            .await
            .context("write database snapshot")?;
        self.inner.snapshots_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub(crate) fn record_commit(&self, txn: u64) {
        self.inner.commits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(txn, "committed transaction");
    }

    pub(crate) fn record_rollback(&self, txn: u64) {
        self.inner.rollbacks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(txn, "rolled back transaction");
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.inner.config.path)
            .field("persistent", &self.inner.fs.is_some())
            .finish()
    }
}

async fn load_tables(
    ctx: &Context,
    fs: &dyn FileSystem,
    db_path: &str,
    config: &DbConfig,
) -> CoreResult<Tables> {
    match ctx.run(async { fs.read(db_path).await.map_err(CoreError::from) }).await {
        Ok(bytes) => decode_snapshot(&bytes, config.tokenizer.clone())
            .with_context(|| format!("load database {db_path}")),
        Err(e) if e.is_not_found() => Ok(Tables::new(config.tokenizer.clone())),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memodb_storage::InMemoryFileSystem;

    fn memo_count(db: &Database) -> usize {
        db.read(|t| t.memos.len())
    }

    fn insert_setting(tx: &Transaction, key: &str) {
        tx.write(|t| {
            t.settings
                .insert(key.to_string(), serde_json::json!(true));
        });
    }

    #[tokio::test]
    async fn commit_publishes_and_drop_rolls_back() {
        let ctx = Context::new();
        let db = Database::open_in_memory(DbConfig::default());

        let tx = db.begin(&ctx).await.unwrap();
        insert_setting(&tx, "a");
        assert_eq!(db.read(|t| t.settings.len()), 0);
        assert_eq!(tx.read(|t| t.settings.len()), 1);
        tx.commit(&ctx).await.unwrap();
        assert_eq!(db.read(|t| t.settings.len()), 1);

        {
            let tx = db.begin(&ctx).await.unwrap();
            insert_setting(&tx, "b");
        }
        assert_eq!(db.read(|t| t.settings.len()), 1);
        assert_eq!(memo_count(&db), 0);
    }

    #[tokio::test]
    async fn borrowed_scope_does_not_commit() {
        let ctx = Context::new();
        let db = Database::open_in_memory(DbConfig::default());
        let outer = db.begin(&ctx).await.unwrap();

        let scope = db.in_transaction(&ctx, Some(&outer)).await.unwrap();
        assert!(!scope.is_owned());
        insert_setting(&scope, "nested");
        scope.commit(&ctx).await.unwrap();
        assert_eq!(db.read(|t| t.settings.len()), 0);

        outer.commit(&ctx).await.unwrap();
        assert_eq!(db.read(|t| t.settings.len()), 1);
    }

    #[tokio::test]
    async fn cancelled_commit_rolls_back() {
        let ctx = Context::new();
        let db = Database::open_in_memory(DbConfig::default());
        let tx = db.begin(&ctx).await.unwrap();
        insert_setting(&tx, "a");

        ctx.cancel();
        let err = tx.commit(&ctx).await.unwrap_err();
        assert!(matches!(err, CoreError::Cancelled));
        assert_eq!(db.read(|t| t.settings.len()), 0);
        assert_eq!(db.stats().rollbacks, 1);
    }

    #[tokio::test]
    async fn persistent_database_survives_reopen() {
        let ctx = Context::new();
        let fs: Arc<dyn FileSystem> = Arc::new(InMemoryFileSystem::new());
        let config = DbConfig::new().path("/data/notes.db");

        let db = Database::open(&ctx, Arc::clone(&fs), config.clone()).await.unwrap();
        let tx = db.begin(&ctx).await.unwrap();
        insert_setting(&tx, "theme.mode");
        tx.commit(&ctx).await.unwrap();
        assert_eq!(db.stats().snapshots_written, 1);

        let reopened = Database::open(&ctx, fs, config).await.unwrap();
        assert!(reopened.read(|t| t.settings.contains_key("theme.mode")));
    }

    #[tokio::test]
    async fn import_replaces_everything() {
        let ctx = Context::new();
        let source = Database::open_in_memory(DbConfig::default());
        let tx = source.begin(&ctx).await.unwrap();
        insert_setting(&tx, "from-source");
        tx.commit(&ctx).await.unwrap();
        let bytes = source.export(&ctx).await.unwrap();

        let target = Database::open_in_memory(DbConfig::default());
        let tx = target.begin(&ctx).await.unwrap();
        insert_setting(&tx, "local-only");
        tx.commit(&ctx).await.unwrap();

        target.import(&ctx, &bytes).await.unwrap();
        let keys: Vec<String> = target.read(|t| t.settings.keys().cloned().collect());
        assert_eq!(keys, vec!["from-source"]);

        assert!(target.import(&ctx, b"nope").await.is_err());
    }

    #[tokio::test]
    async fn writers_are_serialized() {
        let ctx = Context::new();
        let db = Database::open_in_memory(DbConfig::default());
        let first = db.begin(&ctx).await.unwrap();

        let second = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            db.begin(&ctx),
        )
        .await;
        assert!(second.is_err());

        drop(first);
        assert!(db.begin(&ctx).await.is_ok());
    }
}
