//! Tag extraction and the tag index.
//!
//! A tag is a `#` followed by letters, digits, `/`, `-` or `_`, at the start
//! of a line or after a space or tab. Fenced code blocks are ignored. The
//! index keeps one link per (memo, tag) and a count per tag; deleted memos
//! have no links and tags whose count drops to zero are removed.

use crate::db::Tables;
use crate::model::{Page, Tag};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static TAG_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)(?:^|[ \t])#([\p{L}\p{N}/\-_]+)").expect("tag pattern is valid")
});

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```\w*").expect("code fence pattern is valid"));

/// Returns the distinct tags in `content`.
pub fn extract_tags(content: &str) -> BTreeSet<String> {
    let stripped = strip_code_blocks(content);
    TAG_PATTERN
        .captures_iter(&stripped)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Removes fenced code blocks. An unclosed fence runs to the end.
fn strip_code_blocks(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut start = 0;
    let mut fences = CODE_FENCE.find_iter(content);

    while let Some(open) = fences.next() {
        out.push_str(&content[start..open.start()]);
        out.push('\n');
        match fences.next() {
            Some(close) => start = close.end(),
            None => return out,
        }
    }
    out.push_str(&content[start..]);
    out
}

/// Replaces the tag links of `memo_id` with `tags`, adjusting counts.
pub(crate) fn set_memo_tags(t: &mut Tables, memo_id: &str, tags: &BTreeSet<String>) {
    let current = memo_tags(t, memo_id);

    for removed in current.difference(tags) {
        t.memo_tags.remove(&(memo_id.to_string(), removed.clone()));
        decrement(t, removed);
    }
    for added in tags.difference(&current) {
        t.memo_tags.insert((memo_id.to_string(), added.clone()));
        *t.tags.entry(added.clone()).or_insert(0) += 1;
    }
}

/// Recomputes the tag links of a memo from its current state.
pub(crate) fn sync_memo_tags(t: &mut Tables, memo_id: &str) {
    let tags = match t.memos.get(memo_id) {
        Some(memo) if !memo.is_deleted => extract_tags(&memo.content),
        _ => BTreeSet::new(),
    };
    set_memo_tags(t, memo_id, &tags);
}

/// Tags currently linked to `memo_id`.
pub(crate) fn memo_tags(t: &Tables, memo_id: &str) -> BTreeSet<String> {
    t.memo_tags
        .range((memo_id.to_string(), String::new())..)
        .take_while(|(m, _)| m == memo_id)
        .map(|(_, tag)| tag.clone())
        .collect()
}

/// Ids of memos linked to `tag`.
pub(crate) fn memos_with_tag(t: &Tables, tag: &str) -> BTreeSet<String> {
    t.memo_tags
        .iter()
        .filter(|(_, linked)| linked == tag)
        .map(|(memo, _)| memo.clone())
        .collect()
}

/// Lists tags alphabetically, after `after`.
pub(crate) fn list_tags(t: &Tables, page_size: usize, after: Option<&str>) -> Page<Tag, String> {
    let mut iter = t
        .tags
        .iter()
        .filter(|(tag, _)| after.is_none_or(|a| tag.as_str() > a));

    let items: Vec<Tag> = iter
        .by_ref()
        .take(page_size)
        .map(|(tag, count)| Tag {
            tag: tag.clone(),
            count: *count,
        })
        .collect();

    let next = match items.last() {
        Some(last) if iter.next().is_some() => Some(last.tag.clone()),
        _ => None,
    };
    Page { items, next }
}

fn decrement(t: &mut Tables, tag: &str) {
    if let Some(count) = t.tags.get_mut(tag) {
        *count = count.saturating_sub(1);
        if *count == 0 {
            t.tags.remove(tag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(content: &str) -> Vec<String> {
        extract_tags(content).into_iter().collect()
    }

    #[test]
    fn extracts_inline_and_line_start_tags() {
        assert_eq!(tags(""), Vec::<String>::new());
        assert_eq!(tags("#tag-a"), vec!["tag-a"]);
        assert_eq!(tags("#täg-ü"), vec!["täg-ü"]);
        assert_eq!(tags("#Tag/Foo"), vec!["Tag/Foo"]);
        assert_eq!(
            tags("Testing inline #tag-b within a text #tag-c. This should be#ignored"),
            vec!["tag-b", "tag-c"]
        );
        assert_eq!(tags("#tag-23281311 #342312"), vec!["342312", "tag-23281311"]);
    }

    #[test]
    fn tags_on_indented_lines() {
        let content = "# Heading\n  First line\n  #tag-d #tag-e\n\n\t#tag-f\n";
        assert_eq!(tags(content), vec!["tag-d", "tag-e", "tag-f"]);
    }

    #[test]
    fn ignores_headings_and_url_fragments() {
        assert!(tags("# H1\n## H2\n### H3\n").is_empty());
        assert!(tags("https://www.w3.org/TR/json-ld11/#expanded-document-form").is_empty());
    }

    #[test]
    fn ignores_code_blocks() {
        let content = "#before\n```rust\n#not-a-tag\n```\n#after";
        assert_eq!(tags(content), vec!["after", "before"]);

        let unclosed = "#kept\n```\n#dropped";
        assert_eq!(tags(unclosed), vec!["kept"]);
    }

    #[test]
    fn counts_follow_links() {
        let mut t = Tables::default();
        let ab: BTreeSet<String> = ["a".to_string(), "b".to_string()].into();
        let b: BTreeSet<String> = ["b".to_string()].into();

        set_memo_tags(&mut t, "m1", &ab);
        set_memo_tags(&mut t, "m2", &b);
        assert_eq!(t.tags.get("b"), Some(&2));

        set_memo_tags(&mut t, "m1", &BTreeSet::new());
        assert_eq!(t.tags.get("a"), None);
        assert_eq!(t.tags.get("b"), Some(&1));
        assert_eq!(memo_tags(&t, "m2"), b);
        assert_eq!(memos_with_tag(&t, "b").len(), 1);
    }

    #[test]
    fn tag_pages() {
        let mut t = Tables::default();
        let all: BTreeSet<String> = ["x", "y", "z"].iter().map(|s| s.to_string()).collect();
        set_memo_tags(&mut t, "m1", &all);

        let first = list_tags(&t, 2, None);
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next.as_deref(), Some("y"));
        let second = list_tags(&t, 2, first.next.as_deref());
        assert_eq!(second.items[0].tag, "z");
        assert!(second.next.is_none());
    }
}
