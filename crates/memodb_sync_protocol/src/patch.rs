//! Patch format for memo content.
//!
//! A patch is an ordered list of operations walking the document from the
//! start. Offsets count Unicode scalar values (`char`s), never bytes.
//!
//! ```json
//! {"version": "1", "changes": [{"retain": 5}, {"insert": " world"}]}
//! ```

use serde::{Deserialize, Serialize};

/// Current patch format version.
pub const PATCH_VERSION: &str = "1";

/// A single patch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Change {
    /// Keep the next `n` characters.
    Retain(usize),
    /// Remove the next `n` characters.
    Delete(usize),
    /// Insert text at the current position.
    Insert(String),
}

impl Change {
    /// Number of characters of the input document this operation consumes.
    pub fn input_len(&self) -> usize {
        match self {
            Change::Retain(n) | Change::Delete(n) => *n,
            Change::Insert(_) => 0,
        }
    }

    /// Number of characters this operation contributes to the output.
    pub fn output_len(&self) -> usize {
        match self {
            Change::Retain(n) => *n,
            Change::Delete(_) => 0,
            Change::Insert(s) => s.chars().count(),
        }
    }

    /// Returns true if the operation has no effect.
    pub fn is_noop(&self) -> bool {
        match self {
            Change::Retain(n) | Change::Delete(n) => *n == 0,
            Change::Insert(s) => s.is_empty(),
        }
    }
}

/// A versioned set of content changes carried by a `content` changelog value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoContentChanges {
    /// Patch format version, currently always `"1"`.
    pub version: String,
    /// Ordered operations.
    pub changes: Vec<Change>,
}

impl MemoContentChanges {
    /// Creates a patch in the current format version.
    pub fn new(changes: Vec<Change>) -> Self {
        Self {
            version: PATCH_VERSION.to_string(),
            changes,
        }
    }

    /// A patch inserting `text` into an empty document.
    pub fn insert_all(text: impl Into<String>) -> Self {
        Self::new(vec![Change::Insert(text.into())])
    }

    /// A patch appending `text` to a document of `doc_len` characters.
    pub fn append(doc_len: usize, text: impl Into<String>) -> Self {
        Self::new(vec![Change::Retain(doc_len), Change::Insert(text.into())])
    }

    /// Length of the document this patch expects, counting only the explicit ops.
    pub fn base_len(&self) -> usize {
        self.changes.iter().map(Change::input_len).sum()
    }

    /// Returns true if the patch version is understood.
    pub fn is_supported(&self) -> bool {
        self.version == PATCH_VERSION
    }
}
