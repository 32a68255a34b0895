//! Domain types.

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of generated memo and attachment ids.
pub const ID_LENGTH: usize = 21;

const ID_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Generates a random URL-safe entity id.
pub fn new_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LENGTH)
        .map(|_| char::from(ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())]))
        .collect()
}

/// A note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memo {
    /// Memo id.
    pub id: String,
    /// Markdown content.
    pub content: String,
    /// Archive flag.
    pub is_archived: bool,
    /// Soft-delete flag.
    pub is_deleted: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Metadata of a stored attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Attachment id, referenced from memo content as `attachment://<id>`.
    pub id: String,
    /// Filename as supplied by the user.
    pub original_filename: String,
    /// MIME type.
    pub content_type: String,
    /// Content-addressed path of the bytes.
    pub filepath: String,
    /// Base64 SHA-256 digest of the bytes.
    pub sha256: String,
    /// Size of the bytes.
    pub size_bytes: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A tag and the number of live memos carrying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag text without the leading `#`.
    pub tag: String,
    /// Number of non-deleted memos containing the tag.
    pub count: u64,
}

/// One page of a listing and the cursor for the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T, C> {
    /// Items of this page.
    pub items: Vec<T>,
    /// Cursor to pass as `after` for the next page; `None` once exhausted.
    pub next: Option<C>,
}

impl<T, C> Page<T, C> {
    /// An empty, exhausted page.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next: None,
        }
    }

    /// Number of items on the page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the page has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Position of a memo in the `createdAt` descending order.
///
/// The id breaks ties between memos created at the same instant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemoCursor {
    /// Creation time of the last memo on the previous page.
    pub created_at: DateTime<Utc>,
    /// Id of the last memo on the previous page.
    pub id: String,
}

impl MemoCursor {
    /// Cursor pointing at `memo`.
    pub fn of(memo: &Memo) -> Self {
        Self {
            created_at: memo.created_at,
            id: memo.id.clone(),
        }
    }
}

/// Filter for listing memos. `None` fields don't filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListMemosQuery {
    /// Only memos carrying this tag.
    pub tag: Option<String>,
    /// Full-text query; every token must match.
    pub query: Option<String>,
    /// Only memos created on this (UTC) day.
    pub exact_date: Option<NaiveDate>,
    /// Only memos created on or before this (UTC) day.
    pub start_date: Option<NaiveDate>,
    /// Only memos with this archive flag.
    pub is_archived: Option<bool>,
    /// Only memos with this delete flag.
    pub is_deleted: Option<bool>,
}

impl ListMemosQuery {
    /// Returns true if `memo` passes every flag and date filter.
    ///
    /// `tag` and `query` are index lookups and are applied by the caller.
    pub fn matches(&self, memo: &Memo) -> bool {
        let day = memo.created_at.date_naive();
        self.is_archived.is_none_or(|v| memo.is_archived == v)
            && self.is_deleted.is_none_or(|v| memo.is_deleted == v)
            && self.exact_date.is_none_or(|d| day == d)
            && self.start_date.is_none_or(|d| day <= d)
    }
}

/// Pagination for memo listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pagination {
    /// Maximum number of items; `0` means the database default.
    pub page_size: usize,
    /// Resume after this memo.
    pub page_after: Option<MemoCursor>,
}

impl Pagination {
    /// First page of `page_size` items.
    pub fn first(page_size: usize) -> Self {
        Self {
            page_size,
            page_after: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memo(created_at: &str) -> Memo {
        let created_at: DateTime<Utc> = created_at.parse().unwrap();
        Memo {
            id: "m".into(),
            content: String::new(),
            is_archived: false,
            is_deleted: false,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn date_filters() {
        let m = memo("2025-03-04T22:00:00Z");
        let on = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        let after = NaiveDate::from_ymd_opt(2025, 3, 5).unwrap();

        let exact = ListMemosQuery {
            exact_date: Some(on),
            ..Default::default()
        };
        assert!(exact.matches(&m));

        let older = ListMemosQuery {
            start_date: Some(after),
            ..Default::default()
        };
        assert!(older.matches(&m));

        let exact_other = ListMemosQuery {
            exact_date: Some(after),
            ..Default::default()
        };
        assert!(!exact_other.matches(&m));
    }

    #[test]
    fn ids_are_url_safe() {
        let id = new_id();
        assert_eq!(id.len(), ID_LENGTH);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
        assert_ne!(id, new_id());
    }

    #[test]
    fn flag_filters() {
        let mut m = memo("2025-03-04T10:00:00Z");
        m.is_deleted = true;
        let live = ListMemosQuery {
            is_deleted: Some(false),
            ..Default::default()
        };
        assert!(!live.matches(&m));
        assert!(ListMemosQuery::default().matches(&m));
    }
}
