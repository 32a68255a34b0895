//! Full-text search over memo content.
//!
//! The `SearchIndex` provides token-based text search with support for:
//! - Tokenization (whitespace, punctuation splitting)
//! - Case-insensitive matching
//! - Prefix matching of every query token
//! - Multi-token queries (AND semantics)
//!
//! The index is derived state: it is not persisted and is rebuilt from the
//! memos table when a database is opened.

use std::collections::{BTreeSet, HashMap, HashSet};

/// Configuration for the search tokenizer.
#[derive(Debug, Clone)]
pub struct TokenizerConfig {
    /// Minimum token length to index.
    pub min_token_length: usize,
    /// Maximum token length to index.
    pub max_token_length: usize,
    /// Whether to perform case-insensitive matching.
    pub case_insensitive: bool,
    /// Additional characters to treat as separators.
    pub extra_separators: Vec<char>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            min_token_length: 1,
            max_token_length: 256,
            case_insensitive: true,
            extra_separators: vec![],
        }
    }
}

impl TokenizerConfig {
    /// Creates a new tokenizer configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets minimum token length.
    #[must_use]
    pub fn min_length(mut self, len: usize) -> Self {
        self.min_token_length = len;
        self
    }

    /// Sets maximum token length.
    #[must_use]
    pub fn max_length(mut self, len: usize) -> Self {
        self.max_token_length = len;
        self
    }

    /// Sets case sensitivity.
    #[must_use]
    pub fn case_sensitive(mut self) -> Self {
        self.case_insensitive = false;
        self
    }

    /// Adds extra separator characters.
    #[must_use]
    pub fn with_separators(mut self, chars: &[char]) -> Self {
        self.extra_separators.extend_from_slice(chars);
        self
    }

    /// Splits `text` into normalized tokens.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut current = String::new();

        for c in text.chars() {
            let is_separator =
                c.is_whitespace() || c.is_ascii_punctuation() || self.extra_separators.contains(&c);
            if is_separator {
                self.flush(&mut current, &mut tokens);
            } else {
                current.push(c);
            }
        }
        self.flush(&mut current, &mut tokens);

        tokens
    }

    fn flush(&self, current: &mut String, tokens: &mut Vec<String>) {
        if current.is_empty() {
            return;
        }
        let len = current.chars().count();
        if len >= self.min_token_length && len <= self.max_token_length {
            tokens.push(self.normalize(current));
        }
        current.clear();
    }

    fn normalize(&self, token: &str) -> String {
        if self.case_insensitive {
            token.to_lowercase()
        } else {
            token.to_string()
        }
    }
}

/// Inverted index from tokens to memo ids.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    tokenizer: TokenizerConfig,
    /// Token -> memo ids.
    inverted: HashMap<String, HashSet<String>>,
    /// Memo id -> tokens.
    forward: HashMap<String, HashSet<String>>,
}

impl SearchIndex {
    /// Creates an empty index.
    pub fn new(tokenizer: TokenizerConfig) -> Self {
        Self {
            tokenizer,
            inverted: HashMap::new(),
            forward: HashMap::new(),
        }
    }

    /// Indexes (or re-indexes) a memo.
    pub fn index(&mut self, memo_id: &str, content: &str) {
        self.remove(memo_id);

        let tokens: HashSet<String> = self.tokenizer.tokenize(content).into_iter().collect();
        for token in &tokens {
            self.inverted
                .entry(token.clone())
                .or_default()
                .insert(memo_id.to_string());
        }
        self.forward.insert(memo_id.to_string(), tokens);
    }

    /// Removes a memo from the index.
    pub fn remove(&mut self, memo_id: &str) {
        let Some(tokens) = self.forward.remove(memo_id) else {
            return;
        };
        for token in tokens {
            if let Some(ids) = self.inverted.get_mut(&token) {
                ids.remove(memo_id);
                if ids.is_empty() {
                    self.inverted.remove(&token);
                }
            }
        }
    }

    /// Returns the ids of memos matching every token of `query`.
    ///
    /// Each query token matches indexed tokens it is a prefix of. An empty
    /// query matches nothing.
    pub fn search(&self, query: &str) -> BTreeSet<String> {
        let query_tokens = self.tokenizer.tokenize(query);
        let mut results: Option<BTreeSet<String>> = None;

        for token in &query_tokens {
            let matches: BTreeSet<String> = self
                .inverted
                .iter()
                .filter(|(indexed, _)| indexed.starts_with(token.as_str()))
                .flat_map(|(_, ids)| ids.iter().cloned())
                .collect();

            let narrowed = match results {
                Some(current) => current.intersection(&matches).cloned().collect(),
                None => matches,
            };
            if narrowed.is_empty() {
                return BTreeSet::new();
            }
            results = Some(narrowed);
        }

        results.unwrap_or_default()
    }

    /// Number of distinct indexed tokens.
    pub fn token_count(&self) -> usize {
        self.inverted.len()
    }

    /// Number of indexed memos.
    pub fn memo_count(&self) -> usize {
        self.forward.len()
    }
}
