//! Attachment rows and memo links.

use crate::db::Tables;
use crate::error::{CoreError, CoreResult};
use crate::model::Attachment;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static ATTACHMENT_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[.*?\]\(attachment://(?<id>[A-Za-z0-9_-]{21}).*?\)")
        .expect("attachment reference pattern is valid")
});

/// Returns the ids of attachments referenced from markdown links or images
/// in `content`. Bare `attachment://` URLs are not references.
pub fn extract_attachment_ids(content: &str) -> BTreeSet<String> {
    ATTACHMENT_REFERENCE
        .captures_iter(content)
        .filter_map(|c| c.name("id"))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Looks up an attachment.
pub fn get<'a>(t: &'a Tables, id: &str) -> CoreResult<&'a Attachment> {
    t.attachments
        .get(id)
        .ok_or_else(|| CoreError::not_found("attachment", id))
}

/// Inserts an attachment row.
///
/// # Errors
///
/// Fails with [`CoreError::AlreadyExists`] if the id is taken.
pub fn insert(t: &mut Tables, attachment: Attachment) -> CoreResult<()> {
    if t.attachments.contains_key(&attachment.id) {
        return Err(CoreError::already_exists("attachment", attachment.id));
    }
    t.attachments.insert(attachment.id.clone(), attachment);
    Ok(())
}

/// Ids of attachments linked to `memo_id`.
pub fn linked_ids(t: &Tables, memo_id: &str) -> BTreeSet<String> {
    t.memo_attachments
        .range((memo_id.to_string(), String::new())..)
        .take_while(|(m, _)| m == memo_id)
        .map(|(_, a)| a.clone())
        .collect()
}

/// Attachments linked to `memo_id` that have a row.
pub fn list_for_memo(t: &Tables, memo_id: &str) -> Vec<Attachment> {
    linked_ids(t, memo_id)
        .iter()
        .filter_map(|id| t.attachments.get(id))
        .cloned()
        .collect()
}

/// Replaces the links of `memo_id` with `ids`.
///
/// Links may point at attachments whose row hasn't arrived yet. Returns the
/// number of links (added, removed).
pub fn set_memo_links(t: &mut Tables, memo_id: &str, ids: &BTreeSet<String>) -> (usize, usize) {
    let current = linked_ids(t, memo_id);

    let removed: Vec<&String> = current.difference(ids).collect();
    for id in &removed {
        t.memo_attachments
            .remove(&(memo_id.to_string(), (*id).clone()));
    }
    let added: Vec<&String> = ids.difference(&current).collect();
    for id in &added {
        t.memo_attachments
            .insert((memo_id.to_string(), (*id).clone()));
    }
    (added.len(), removed.len())
}

/// Number of attachment rows whose bytes live at `filepath`.
pub fn count_by_filepath(t: &Tables, filepath: &str) -> usize {
    t.attachments
        .values()
        .filter(|a| a.filepath == filepath)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const ID_A: &str = "hT6XtCfBjyAukyiLqP9Th";
    const ID_B: &str = "V1StGXR8_Z5jdHi6B-myT";

    fn ids(content: &str) -> Vec<String> {
        extract_attachment_ids(content).into_iter().collect()
    }

    #[test]
    fn extracts_references() {
        assert!(ids("# Memo with no Attachments\nThis just some test content.").is_empty());
        assert!(ids(&format!("Memo with a plain URL: attachment://{ID_A}\n")).is_empty());

        assert_eq!(ids(&format!("![Image](attachment://{ID_A})")), vec![ID_A]);
        assert_eq!(
            ids(&format!(
                "![one](attachment://{ID_A}) and a [file](attachment://{ID_B}?name=notes.pdf)"
            )),
            vec![ID_B, ID_A]
        );
        assert_eq!(
            ids(&format!("[a](attachment://{ID_A}) [b](attachment://{ID_A})")),
            vec![ID_A]
        );
    }

    #[test]
    fn short_ids_are_ignored() {
        assert!(ids("[x](attachment://tooshort)").is_empty());
    }

    #[test]
    fn link_diffing() {
        let mut t = Tables::default();
        let ab: BTreeSet<String> = [ID_A.to_string(), ID_B.to_string()].into();
        let b: BTreeSet<String> = [ID_B.to_string()].into();

        assert_eq!(set_memo_links(&mut t, "m1", &ab), (2, 0));
        assert_eq!(set_memo_links(&mut t, "m1", &b), (0, 1));
        assert_eq!(set_memo_links(&mut t, "m1", &b), (0, 0));
        assert_eq!(linked_ids(&t, "m1"), b);
    }

    #[test]
    fn list_for_memo_skips_missing_rows() {
        let mut t = Tables::default();
        insert(
            &mut t,
            Attachment {
                id: ID_A.into(),
                original_filename: "cat.png".into(),
                content_type: "image/png".into(),
                filepath: "/ab/cd".into(),
                sha256: String::new(),
                size_bytes: 3,
                created_at: Utc::now(),
            },
        )
        .unwrap();
        let both: BTreeSet<String> = [ID_A.to_string(), ID_B.to_string()].into();
        set_memo_links(&mut t, "m1", &both);

        let listed = list_for_memo(&t, "m1");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, ID_A);
        assert_eq!(count_by_filepath(&t, "/ab/cd"), 1);
    }
}
