//! The changelog store.
//!
//! Entries are kept in insertion order under a monotonically increasing
//! sequence number. The sequence is local: it is authoritative for
//! pagination and for replaying content patches, and it is never shared
//! with other clients.

use crate::db::{Database, Tables, Transaction};
use crate::error::{CoreError, CoreResult};
use crate::model::Page;
use chrono::Utc;
use memodb_sync_protocol::{ChangelogEntry, ChangelogValue};
use parking_lot::RwLock;
use std::sync::Arc;

/// Position of an entry in the store's insertion order.
pub type Sequence = u64;

/// Which entries a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFilter {
    /// Every entry.
    All,
    /// Entries not yet uploaded.
    Unsynced,
    /// Entries not yet materialized locally.
    Unapplied,
}

impl EntryFilter {
    fn accepts(self, entry: &ChangelogEntry) -> bool {
        match self {
            EntryFilter::All => true,
            EntryFilter::Unsynced => !entry.is_synced,
            EntryFilter::Unapplied => !entry.is_applied,
        }
    }
}

/// Durable, ordered log of mutations.
///
/// Every method that writes takes the caller's transaction so the entry
/// commits or rolls back together with the repository change it records.
#[derive(Clone)]
pub struct ChangelogStore {
    db: Database,
    source: Arc<RwLock<String>>,
}

impl ChangelogStore {
    /// Creates a store over `db`, stamping new entries with the configured
    /// source name.
    pub fn new(db: Database) -> Self {
        let source = db.config().source_name.clone();
        Self {
            db,
            source: Arc::new(RwLock::new(source)),
        }
    }

    /// Returns the database.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Returns the source name written to new entries.
    pub fn source(&self) -> String {
        self.source.read().clone()
    }

    /// Changes the source name, e.g. to the sync client id after setup.
    pub fn set_source(&self, source: impl Into<String>) {
        *self.source.write() = source.into();
    }

    /// Builds a local entry: not yet synced, already applied.
    pub fn new_entry(
        &self,
        revision: i64,
        target_id: impl Into<String>,
        value: impl Into<ChangelogValue>,
    ) -> ChangelogEntry {
        ChangelogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            source: self.source(),
            revision,
            target_id: target_id.into(),
            value: value.into(),
            is_synced: false,
            is_applied: true,
            timestamp: Utc::now(),
        }
    }

    /// Appends `entry`.
    ///
    /// # Errors
    ///
    /// A duplicate entry id is a storage error.
    pub fn create_entry(&self, tx: &Transaction, entry: ChangelogEntry) -> CoreResult<Sequence> {
        tx.write(|t| append(t, entry))
    }

    /// Appends entries received from the sync server.
    ///
    /// They are stored as synced and unapplied regardless of the flags they
    /// arrived with. Entries whose id is already present are skipped.
    /// Returns the number of entries inserted.
    pub fn insert_external(
        &self,
        tx: &Transaction,
        entries: impl IntoIterator<Item = ChangelogEntry>,
    ) -> CoreResult<usize> {
        tx.write(|t| {
            let mut inserted = 0;
            for mut entry in entries {
                if t.changelog_ids.contains_key(&entry.id) {
                    tracing::debug!(id = %entry.id, "skipping known changelog entry");
                    continue;
                }
                entry.is_synced = true;
                entry.is_applied = false;
                append(t, entry)?;
                inserted += 1;
            }
            Ok(inserted)
        })
    }

    /// Lists up to `page_size` entries not yet synced, after `after`.
    pub fn list_unsynced(
        &self,
        tx: Option<&Transaction>,
        page_size: usize,
        after: Option<Sequence>,
    ) -> Page<ChangelogEntry, Sequence> {
        self.list(tx, EntryFilter::Unsynced, page_size, after)
    }

    /// Lists up to `page_size` entries not yet applied, after `after`.
    pub fn list_unapplied(
        &self,
        tx: Option<&Transaction>,
        page_size: usize,
        after: Option<Sequence>,
    ) -> Page<ChangelogEntry, Sequence> {
        self.list(tx, EntryFilter::Unapplied, page_size, after)
    }

    /// Lists entries matching `filter` in insertion order.
    ///
    /// `next` is the sequence of the last returned entry, or `None` once no
    /// further matching entry exists.
    pub fn list(
        &self,
        tx: Option<&Transaction>,
        filter: EntryFilter,
        page_size: usize,
        after: Option<Sequence>,
    ) -> Page<ChangelogEntry, Sequence> {
        self.read(tx, |t| list_page(t, filter, page_size, after))
    }

    /// Marks entries as synced. Unknown ids are ignored.
    pub fn mark_synced(&self, tx: &Transaction, ids: &[String]) -> usize {
        tx.write(|t| mark(t, ids, |e| e.is_synced = true))
    }

    /// Marks entries as applied. Unknown ids are ignored.
    pub fn mark_applied(&self, tx: &Transaction, ids: &[String]) -> usize {
        tx.write(|t| mark(t, ids, |e| e.is_applied = true))
    }

    /// Lists every entry for one target, in insertion order.
    pub fn list_for_target(&self, tx: Option<&Transaction>, target_id: &str) -> Vec<ChangelogEntry> {
        self.read(tx, |t| entries_for_target(t, target_id).cloned().collect())
    }

    /// Looks up an entry by id.
    pub fn get(&self, tx: Option<&Transaction>, id: &str) -> Option<ChangelogEntry> {
        self.read(tx, |t| {
            t.changelog_ids
                .get(id)
                .and_then(|seq| t.changelog.get(seq))
                .cloned()
        })
    }

    /// Number of entries in the store.
    pub fn count(&self, tx: Option<&Transaction>) -> usize {
        self.read(tx, |t| t.changelog.len())
    }

    fn read<R>(&self, tx: Option<&Transaction>, f: impl FnOnce(&Tables) -> R) -> R {
        match tx {
            Some(tx) => tx.read(f),
            None => self.db.read(f),
        }
    }
}

impl std::fmt::Debug for ChangelogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangelogStore")
            .field("source", &*self.source.read())
            .finish()
    }
}

pub(crate) fn append(t: &mut Tables, entry: ChangelogEntry) -> CoreResult<Sequence> {
    if t.changelog_ids.contains_key(&entry.id) {
        return Err(CoreError::already_exists("changelog entry", entry.id));
    }
    t.next_sequence += 1;
    let seq = t.next_sequence;
    t.changelog_ids.insert(entry.id.clone(), seq);
    t.changelog.insert(seq, entry);
    Ok(seq)
}

pub(crate) fn entries_for_target<'a>(
    t: &'a Tables,
    target_id: &'a str,
) -> impl Iterator<Item = &'a ChangelogEntry> + 'a {
    t.changelog.values().filter(move |e| e.target_id == target_id)
}

fn list_page(
    t: &Tables,
    filter: EntryFilter,
    page_size: usize,
    after: Option<Sequence>,
) -> Page<ChangelogEntry, Sequence> {
    let start = after.map_or(0, |a| a.saturating_add(1));
    let mut matching = t
        .changelog
        .range(start..)
        .filter(|(_, e)| filter.accepts(e));

    let items: Vec<(Sequence, ChangelogEntry)> = matching
        .by_ref()
        .take(page_size)
        .map(|(seq, e)| (*seq, e.clone()))
        .collect();

    let next = match items.last() {
        Some((last, _)) if matching.next().is_some() => Some(*last),
        _ => None,
    };

    Page {
        items: items.into_iter().map(|(_, e)| e).collect(),
        next,
    }
}

fn mark(t: &mut Tables, ids: &[String], f: impl Fn(&mut ChangelogEntry)) -> usize {
    let mut marked = 0;
    for id in ids {
        let Some(seq) = t.changelog_ids.get(id) else {
            continue;
        };
        if let Some(entry) = t.changelog.get_mut(seq) {
            f(entry);
            marked += 1;
        }
    }
    marked
}
