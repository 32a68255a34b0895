//! Text merge engine for memo content.
//!
//! A memo's content is reconstructed from its changelog: every `created`
//! entry resets the document, every `content` entry is a patch against the
//! document produced by the entries before it. Patches are folded into one
//! operation sequence by composition and the result is applied to the empty
//! string.
//!
//! Replay follows store insertion order. Two clients editing the same memo
//! offline therefore converge on a document that contains both edits when
//! they touch different regions, but the result depends on the order the
//! entries arrived in; there is no causal ordering.
//!
//! Composition and application are lenient. A retain or delete that runs
//! past the end of the document is clamped, and any part of the document a
//! patch does not reach is kept. Merging never fails.

use memodb_sync_protocol::{Change, ChangelogEntry, ChangelogValue, MemoChange};
use std::collections::VecDeque;

/// Applies `changes` to `text`.
pub fn apply(text: &str, changes: &[Change]) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut pos: usize = 0;

    for change in changes {
        match change {
            Change::Retain(n) => {
                let end = pos.saturating_add(*n).min(chars.len());
                out.extend(&chars[pos..end]);
                pos = end;
            }
            Change::Delete(n) => {
                pos = pos.saturating_add(*n).min(chars.len());
            }
            Change::Insert(s) => out.push_str(s),
        }
    }
    out.extend(&chars[pos..]);
    out
}

/// Composes two patches into one with the same effect as applying `first`
/// and then `second`.
///
/// The equivalence holds exactly when `second` fits the output of `first`;
/// otherwise the leniency rules of the module apply.
pub fn compose(first: &[Change], second: &[Change]) -> Vec<Change> {
    let mut a: VecDeque<Change> = first.iter().filter(|c| !c.is_noop()).cloned().collect();
    let mut b: VecDeque<Change> = second.iter().filter(|c| !c.is_noop()).cloned().collect();
    let mut out = Builder::default();

    loop {
        if let Some(Change::Insert(_)) = b.front() {
            if let Some(Change::Insert(s)) = b.pop_front() {
                out.insert(&s);
            }
            continue;
        }
        if let Some(Change::Delete(_)) = a.front() {
            if let Some(Change::Delete(n)) = a.pop_front() {
                out.delete(n);
            }
            continue;
        }

        match (a.pop_front(), b.pop_front()) {
            (None, None) => break,
            (Some(op), None) | (None, Some(op)) => out.push(op),
            (Some(Change::Retain(n)), Some(Change::Retain(m))) => {
                let k = n.min(m);
                out.retain(k);
                requeue(&mut a, Change::Retain(n - k));
                requeue(&mut b, Change::Retain(m - k));
            }
            (Some(Change::Retain(n)), Some(Change::Delete(m))) => {
                let k = n.min(m);
                out.delete(k);
                requeue(&mut a, Change::Retain(n - k));
                requeue(&mut b, Change::Delete(m - k));
            }
            (Some(Change::Insert(s)), Some(Change::Retain(m))) => {
                let (head, tail) = split_chars(&s, m);
                let k = head.chars().count();
                out.insert(head);
                requeue(&mut a, Change::Insert(tail.to_string()));
                requeue(&mut b, Change::Retain(m - k));
            }
            (Some(Change::Insert(s)), Some(Change::Delete(m))) => {
                let (head, tail) = split_chars(&s, m);
                let k = head.chars().count();
                requeue(&mut a, Change::Insert(tail.to_string()));
                requeue(&mut b, Change::Delete(m - k));
            }
            // Inserts in `second` and deletes in `first` are drained above.
            (Some(op), Some(other)) => {
                out.push(op);
                out.push(other);
            }
        }
    }

    out.finish()
}

/// Folds the content-carrying entries of one memo into a single operation
/// sequence, in the order given.
///
/// A `created` entry discards everything before it and starts over with
/// its content. Entries without content are ignored.
pub fn merge_changes<'a>(entries: impl IntoIterator<Item = &'a ChangelogEntry>) -> Vec<Change> {
    let mut merged: Vec<Change> = Vec::new();
    for entry in entries {
        match &entry.value {
            ChangelogValue::Memo(MemoChange::Created(created)) => {
                merged = vec![Change::Insert(created.content.clone())];
            }
            ChangelogValue::Memo(MemoChange::Content(patch)) => {
                merged = compose(&merged, &patch.changes);
            }
            _ => {}
        }
    }
    merged
}

/// Applies a merged operation sequence to the empty document.
pub fn resolve_changes(changes: &[Change]) -> String {
    apply("", changes)
}

/// Rebuilds a memo's content from its entries.
pub fn replay<'a>(entries: impl IntoIterator<Item = &'a ChangelogEntry>) -> String {
    resolve_changes(&merge_changes(entries))
}

/// Computes a patch turning `old` into `new`.
///
/// The patch keeps the common prefix and suffix and replaces the middle.
pub fn diff(old: &str, new: &str) -> Vec<Change> {
    let old: Vec<char> = old.chars().collect();
    let new: Vec<char> = new.chars().collect();

    let prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
    let max_suffix = old.len().min(new.len()) - prefix;
    let suffix = old
        .iter()
        .rev()
        .zip(new.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = Builder::default();
    out.retain(prefix);
    out.delete(old.len() - prefix - suffix);
    out.insert(&new[prefix..new.len() - suffix].iter().collect::<String>());
    out.retain(suffix);
    out.finish()
}

fn requeue(queue: &mut VecDeque<Change>, change: Change) {
    if !change.is_noop() {
        queue.push_front(change);
    }
}

fn split_chars(s: &str, n: usize) -> (&str, &str) {
    match s.char_indices().nth(n) {
        Some((i, _)) => s.split_at(i),
        None => (s, ""),
    }
}

/// Accumulates operations, merging neighbours of the same kind.
#[derive(Default)]
struct Builder {
    ops: Vec<Change>,
}

impl Builder {
    fn push(&mut self, change: Change) {
        match change {
            Change::Retain(n) => self.retain(n),
            Change::Delete(n) => self.delete(n),
            Change::Insert(s) => self.insert(&s),
        }
    }

    fn retain(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        match self.ops.last_mut() {
            Some(Change::Retain(m)) => *m += n,
            _ => self.ops.push(Change::Retain(n)),
        }
    }

    fn delete(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        match self.ops.last_mut() {
            Some(Change::Delete(m)) => *m += n,
            _ => self.ops.push(Change::Delete(n)),
        }
    }

    fn insert(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        match self.ops.last_mut() {
            Some(Change::Insert(existing)) => existing.push_str(s),
            _ => self.ops.push(Change::Insert(s.to_string())),
        }
    }

    fn finish(mut self) -> Vec<Change> {
        while matches!(self.ops.last(), Some(Change::Retain(_))) {
            self.ops.pop();
        }
        self.ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use memodb_sync_protocol::{MemoContentChanges, MemoCreated, REVISION_CREATE, REVISION_UPDATE};
    use proptest::prelude::*;

    fn entry(revision: i64, change: MemoChange) -> ChangelogEntry {
        ChangelogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            source: "test".into(),
            revision,
            target_id: "memo".into(),
            value: change.into(),
            is_synced: false,
            is_applied: true,
            timestamp: Utc::now(),
        }
    }

    fn created(content: &str) -> ChangelogEntry {
        let now = Utc::now();
        entry(
            REVISION_CREATE,
            MemoChange::Created(MemoCreated {
                content: content.into(),
                is_archived: false,
                is_deleted: false,
                created_at: now,
                updated_at: now,
            }),
        )
    }

    fn patch(changes: Vec<Change>) -> ChangelogEntry {
        entry(
            REVISION_UPDATE,
            MemoChange::Content(MemoContentChanges::new(changes)),
        )
    }

    #[test]
    fn appends_fold_in_order() {
        let entries = [
            created("A"),
            patch(vec![Change::Retain(1), Change::Insert("B".into())]),
            patch(vec![Change::Retain(2), Change::Insert("C".into())]),
        ];
        assert_eq!(replay(&entries), "ABC");
    }

    #[test]
    fn created_resets_history() {
        let entries = [
            created("old"),
            patch(vec![Change::Delete(3), Change::Insert("older".into())]),
            created("fresh"),
            patch(vec![Change::Retain(5), Change::Insert("!".into())]),
        ];
        assert_eq!(replay(&entries), "fresh!");
    }

    #[test]
    fn non_content_entries_are_ignored() {
        let entries = [created("x"), entry(REVISION_UPDATE, MemoChange::IsArchived(true))];
        assert_eq!(replay(&entries), "x");
    }

    #[test]
    fn apply_is_lenient() {
        assert_eq!(apply("abc", &[Change::Retain(10), Change::Insert("!".into())]), "abc!");
        assert_eq!(apply("abc", &[Change::Delete(10)]), "");
        assert_eq!(apply("abc", &[Change::Insert(">".into())]), ">abc");
    }

    #[test]
    fn counts_characters_not_bytes() {
        let entries = [
            created("héllo"),
            patch(vec![Change::Retain(1), Change::Delete(1), Change::Insert("e".into())]),
        ];
        assert_eq!(replay(&entries), "hello");
    }

    #[test]
    fn concurrent_appends_keep_both_edits() {
        // Two clients appended to "base" without seeing each other.
        let entries = [
            created("base"),
            patch(vec![Change::Retain(4), Change::Insert(" one".into())]),
            patch(vec![Change::Retain(4), Change::Insert(" two".into())]),
        ];
        let text = replay(&entries);
        assert!(text.contains("one"));
        assert!(text.contains("two"));
        assert!(text.starts_with("base"));
    }

    #[test]
    fn diff_produces_minimal_middle() {
        assert_eq!(
            diff("hello world", "hello brave world"),
            vec![Change::Retain(6), Change::Insert("brave ".into())]
        );
        assert_eq!(diff("same", "same"), Vec::<Change>::new());
        assert_eq!(
            diff("abc", ""),
            vec![Change::Delete(3)]
        );
    }

    /// A document and a patch that fits it.
    fn doc_and_patch() -> impl Strategy<Value = (String, Vec<Change>)> {
        "[a-zé ]{0,16}".prop_flat_map(|doc| {
            let len = doc.chars().count();
            let ops = proptest::collection::vec((0usize..3, 0usize..5, "[xyzü]{1,3}"), 0..6);
            (Just(doc), ops).prop_map(move |(doc, ops)| {
                let mut remaining = len;
                let mut changes = Vec::new();
                for (kind, n, text) in ops {
                    match kind {
                        0 => {
                            let n = n.min(remaining);
                            remaining -= n;
                            changes.push(Change::Retain(n));
                        }
                        1 => {
                            let n = n.min(remaining);
                            remaining -= n;
                            changes.push(Change::Delete(n));
                        }
                        _ => changes.push(Change::Insert(text)),
                    }
                }
                (doc, changes)
            })
        })
    }

    proptest! {
        #[test]
        fn compose_matches_sequential_apply(
            (doc, first) in doc_and_patch(),
            seed in proptest::collection::vec((0usize..3, 0usize..5, "[pq]{1,2}"), 0..6),
        ) {
            let intermediate = apply(&doc, &first);

            let mut remaining = intermediate.chars().count();
            let mut second = Vec::new();
            for (kind, n, text) in seed {
                match kind {
                    0 => { let n = n.min(remaining); remaining -= n; second.push(Change::Retain(n)); }
                    1 => { let n = n.min(remaining); remaining -= n; second.push(Change::Delete(n)); }
                    _ => second.push(Change::Insert(text)),
                }
            }

            let sequential = apply(&intermediate, &second);
            let composed = apply(&doc, &compose(&first, &second));
            prop_assert_eq!(sequential, composed);
        }

        #[test]
        fn diff_roundtrips(old in "[a-cé]{0,12}", new in "[a-cé]{0,12}") {
            prop_assert_eq!(apply(&old, &diff(&old, &new)), new);
        }
    }
}
