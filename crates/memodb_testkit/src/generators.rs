//! Property-based test generators using proptest.
//!
//! Content strategies mix plain words, tags, non-ASCII text and code fences
//! so that tag extraction and char-offset patches are both exercised.

use proptest::prelude::*;
use serde_json::Value;

/// Strategy for generating tag names, without the leading `#`.
pub fn tag_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_/-]{0,7}").expect("Invalid regex")
}

/// Strategy for generating one token of memo content.
pub fn content_token_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        6 => prop::string::string_regex("[a-zA-Z0-9]{1,8}").expect("Invalid regex"),
        2 => tag_strategy().prop_map(|t| format!("#{t}")),
        1 => prop::string::string_regex("[äöüéßæøå]{1,4}").expect("Invalid regex"),
        1 => Just("```".to_string()),
        1 => Just("\n".to_string()),
    ]
}

/// Strategy for generating memo content.
pub fn memo_content_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(content_token_strategy(), 0..24).prop_map(|tokens| tokens.join(" "))
}

/// Strategy for generating successive versions of one memo's content.
pub fn edit_sequence_strategy(max_edits: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(memo_content_strategy(), 1..max_edits.max(2))
}

/// An operation on the memos of one client.
///
/// Indices refer to memos in creation order and are taken modulo the
/// number of memos created so far.
#[derive(Debug, Clone)]
pub enum MemoOperation {
    /// Create a memo
    Create {
        /// Initial content
        content: String,
    },
    /// Replace a memo's content
    Edit {
        /// Memo index
        index: usize,
        /// New content
        content: String,
    },
    /// Set a memo's archive flag
    Archive {
        /// Memo index
        index: usize,
        /// New flag
        archived: bool,
    },
    /// Flag a memo as deleted
    Delete {
        /// Memo index
        index: usize,
    },
    /// Clear a memo's delete flag
    Undelete {
        /// Memo index
        index: usize,
    },
    /// Change a setting
    Setting {
        /// Dotted setting key
        key: String,
        /// New value
        value: Value,
    },
}

/// Strategy for generating setting keys and values.
pub fn setting_strategy() -> impl Strategy<Value = (String, Value)> {
    prop_oneof![
        prop::sample::select(vec!["auto", "light", "dark"])
            .prop_map(|v| ("theme.mode".to_string(), Value::from(v))),
        any::<bool>().prop_map(|v| ("controls.vim".to_string(), Value::from(v))),
        prop::string::string_regex("[a-z]{2}").expect("Invalid regex")
            .prop_map(|v| ("locale.language".to_string(), Value::from(v))),
    ]
}

/// Strategy for generating memo operations.
pub fn memo_operation_strategy() -> impl Strategy<Value = MemoOperation> {
    prop_oneof![
        3 => memo_content_strategy().prop_map(|content| MemoOperation::Create { content }),
        4 => (any::<usize>(), memo_content_strategy())
            .prop_map(|(index, content)| MemoOperation::Edit { index, content }),
        1 => (any::<usize>(), any::<bool>())
            .prop_map(|(index, archived)| MemoOperation::Archive { index, archived }),
        1 => any::<usize>().prop_map(|index| MemoOperation::Delete { index }),
        1 => any::<usize>().prop_map(|index| MemoOperation::Undelete { index }),
        1 => setting_strategy().prop_map(|(key, value)| MemoOperation::Setting { key, value }),
    ]
}

/// Strategy for generating a sequence of operations.
///
/// The first operation is always a create so that indexed operations have
/// a memo to act on.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<MemoOperation>> {
    (
        memo_content_strategy(),
        prop::collection::vec(memo_operation_strategy(), min_ops..max_ops.max(min_ops + 1)),
    )
        .prop_map(|(first, mut rest)| {
            rest.insert(0, MemoOperation::Create { content: first });
            rest
        })
}

/// Strategy for generating attachment bytes.
pub fn attachment_data_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..2048)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 128,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
