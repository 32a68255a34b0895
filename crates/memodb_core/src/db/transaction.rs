//! Single-writer transactions.

use super::{Database, Tables};
use crate::context::Context;
use crate::error::CoreResult;
use parking_lot::Mutex;
use std::ops::Deref;
use tokio::sync::OwnedMutexGuard;

type CommitHook = Box<dyn FnOnce() + Send>;

/// A write transaction.
///
/// Holding a `Transaction` holds the database's writer lock, so at most one
/// exists at a time. The first write clones the committed tables into a
/// private working copy; [`commit`](Self::commit) persists and publishes
/// it. Dropping a transaction without committing rolls it back.
///
/// Nested operations share one transaction by passing `Some(&tx)` down; the
/// handle is `Sync` so concurrent passes of a sync cycle can use it at the
/// same time.
pub struct Transaction {
    db: Database,
    id: u64,
    working: Mutex<Option<Tables>>,
    hooks: Mutex<Vec<CommitHook>>,
    _writer: OwnedMutexGuard<()>,
}

impl Transaction {
    pub(super) fn new(db: Database, id: u64, writer: OwnedMutexGuard<()>) -> Self {
        Self {
            db,
            id,
            working: Mutex::new(None),
            hooks: Mutex::new(Vec::new()),
            _writer: writer,
        }
    }

    /// Returns the transaction id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the database this transaction belongs to.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Reads the tables as seen by this transaction.
    pub fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        let working = self.working.lock();
        match working.as_ref() {
            Some(tables) => f(tables),
            None => f(&self.db.inner.committed.read()),
        }
    }

    /// Mutates the tables, copying them on first write.
    pub fn write<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        let mut working = self.working.lock();
        let tables = working.get_or_insert_with(|| self.db.inner.committed.read().clone());
        f(tables)
    }

    /// Runs `hook` after this transaction commits. Hooks of a rolled back
    /// transaction never run.
    pub fn after_commit(&self, hook: impl FnOnce() + Send + 'static) {
        self.hooks.lock().push(Box::new(hook));
    }

    /// Returns true once the transaction has written anything.
    pub fn is_dirty(&self) -> bool {
        self.working.lock().is_some()
    }

    /// Persists and publishes the transaction's writes.
    ///
    /// A cancelled context rolls the transaction back instead. If writing
    /// the snapshot fails nothing is published.
    pub async fn commit(self, ctx: &Context) -> CoreResult<()> {
        let Transaction {
            db,
            id,
            working,
            hooks,
            _writer: writer,
        } = self;

        if let Err(e) = ctx.check() {
            db.record_rollback(id);
            return Err(e);
        }

        if let Some(tables) = working.into_inner() {
            if let Err(e) = db.persist(ctx, &tables).await {
                db.record_rollback(id);
                return Err(e);
            }
            *db.inner.committed.write() = tables;
            db.record_commit(id);
        } else {
            tracing::trace!(txn = id, "commit of read-only transaction");
        }

        drop(writer);
        for hook in hooks.into_inner() {
            hook();
        }
        Ok(())
    }

    /// Discards the transaction's writes.
    pub fn rollback(self) {
        self.db.record_rollback(self.id);
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

/// A transaction that is either borrowed from a caller or owned by the
/// current operation.
///
/// Obtained from [`Database::in_transaction`]. Committing a borrowed scope
/// is a no-op: the owner commits. Dropping an owned scope without
/// committing rolls back, so early `?` returns undo partial work.
#[derive(Debug)]
pub enum TxScope<'a> {
    /// The caller's transaction.
    Borrowed(&'a Transaction),
    /// A transaction opened for this operation.
    Owned(Transaction),
}

impl TxScope<'_> {
    /// Returns the transaction.
    pub fn tx(&self) -> &Transaction {
        match self {
            TxScope::Borrowed(tx) => tx,
            TxScope::Owned(tx) => tx,
        }
    }

    /// Returns true if this scope opened its own transaction.
    pub fn is_owned(&self) -> bool {
        matches!(self, TxScope::Owned(_))
    }

    /// Commits an owned transaction; does nothing for a borrowed one.
    pub async fn commit(self, ctx: &Context) -> CoreResult<()> {
        match self {
            TxScope::Borrowed(_) => Ok(()),
            TxScope::Owned(tx) => tx.commit(ctx).await,
        }
    }
}

impl Deref for TxScope<'_> {
    type Target = Transaction;

    fn deref(&self) -> &Transaction {
        self.tx()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::DbConfig;
    use crate::context::Context;
    use crate::db::Database;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn hooks_run_only_after_commit() {
        let ctx = Context::new();
        let db = Database::open_in_memory(DbConfig::default());
        let fired = Arc::new(AtomicUsize::new(0));

        let tx = db.begin(&ctx).await.unwrap();
        let counter = Arc::clone(&fired);
        tx.after_commit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tx.commit(&ctx).await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let tx = db.begin(&ctx).await.unwrap();
        let counter = Arc::clone(&fired);
        tx.after_commit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        tx.rollback();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
