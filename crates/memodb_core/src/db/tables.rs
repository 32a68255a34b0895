//! In-memory tables and the snapshot file format.

use crate::error::{CoreError, CoreResult};
use crate::model::{Attachment, Memo};
use crate::search::{SearchIndex, TokenizerConfig};
use memodb_sync_protocol::ChangelogEntry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Current snapshot format version.
pub const FORMAT_VERSION: u16 = 1;

/// Every table of a database.
///
/// Repositories operate on `&Tables` / `&mut Tables` handed out by a
/// [`Transaction`](super::Transaction). The `changelog_ids` and `search`
/// indexes are derived and rebuilt on load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tables {
    pub(crate) memos: BTreeMap<String, Memo>,
    /// Tag -> number of live memos carrying it.
    pub(crate) tags: BTreeMap<String, u64>,
    /// (memo id, tag)
    pub(crate) memo_tags: BTreeSet<(String, String)>,
    pub(crate) attachments: BTreeMap<String, Attachment>,
    /// (memo id, attachment id)
    pub(crate) memo_attachments: BTreeSet<(String, String)>,
    pub(crate) settings: BTreeMap<String, serde_json::Value>,
    /// Insertion sequence -> entry.
    pub(crate) changelog: BTreeMap<u64, ChangelogEntry>,
    pub(crate) next_sequence: u64,
    /// Single-item key/value store.
    pub(crate) kv: BTreeMap<String, serde_json::Value>,

    #[serde(skip)]
    pub(crate) changelog_ids: HashMap<String, u64>,
    #[serde(skip)]
    pub(crate) search: SearchIndex,
}

/// Row counts, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Memos, including deleted ones.
    pub memos: usize,
    /// Distinct tags.
    pub tags: usize,
    /// Attachment rows.
    pub attachments: usize,
    /// Stored settings.
    pub settings: usize,
    /// Changelog entries.
    pub changelog_entries: usize,
    /// Entries not yet synced.
    pub unsynced_entries: usize,
    /// Entries not yet applied.
    pub unapplied_entries: usize,
}

impl Tables {
    /// Creates empty tables with the given search tokenizer.
    pub fn new(tokenizer: TokenizerConfig) -> Self {
        Self {
            search: SearchIndex::new(tokenizer),
            ..Self::default()
        }
    }

    /// Rebuilds the derived indexes from the persisted tables.
    pub(crate) fn rebuild_indexes(&mut self, tokenizer: TokenizerConfig) {
        self.changelog_ids = self
            .changelog
            .iter()
            .map(|(seq, entry)| (entry.id.clone(), *seq))
            .collect();

        self.search = SearchIndex::new(tokenizer);
        for memo in self.memos.values() {
            self.search.index(&memo.id, &memo.content);
        }
    }

    /// Returns row counts.
    pub fn stats(&self) -> TableStats {
        TableStats {
            memos: self.memos.len(),
            tags: self.tags.len(),
            attachments: self.attachments.len(),
            settings: self.settings.len(),
            changelog_entries: self.changelog.len(),
            unsynced_entries: self.changelog.values().filter(|e| !e.is_synced).count(),
            unapplied_entries: self.changelog.values().filter(|e| !e.is_applied).count(),
        }
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    format_version: u16,
    tables: &'a Tables,
}

#[derive(Deserialize)]
struct Snapshot {
    format_version: u16,
    tables: Tables,
}

/// Encodes tables as a CBOR snapshot.
pub fn encode_snapshot(tables: &Tables) -> CoreResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(
        &SnapshotRef {
            format_version: FORMAT_VERSION,
            tables,
        },
        &mut buf,
    )
    .map_err(|e| CoreError::codec(format!("encode snapshot: {e}")))?;
    Ok(buf)
}

/// Decodes a CBOR snapshot and rebuilds its indexes.
pub fn decode_snapshot(bytes: &[u8], tokenizer: TokenizerConfig) -> CoreResult<Tables> {
    let snapshot: Snapshot = ciborium::from_reader(bytes)
        .map_err(|e| CoreError::codec(format!("decode snapshot: {e}")))?;

    if snapshot.format_version != FORMAT_VERSION {
        return Err(CoreError::codec(format!(
            "unsupported snapshot format version {}",
            snapshot.format_version
        )));
    }

    let mut tables = snapshot.tables;
    tables.rebuild_indexes(tokenizer);
    Ok(tables)
}
