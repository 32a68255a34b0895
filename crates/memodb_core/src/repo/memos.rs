//! Memo rows, their search index entries and tag links.

use crate::db::Tables;
use crate::error::{CoreError, CoreResult};
use crate::model::{ListMemosQuery, Memo, MemoCursor, Page};
use crate::tags;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::collections::BTreeSet;

/// Looks up a memo.
pub fn get<'a>(t: &'a Tables, id: &str) -> CoreResult<&'a Memo> {
    t.memos.get(id).ok_or_else(|| CoreError::not_found("memo", id))
}

/// Inserts a new memo and indexes it.
///
/// # Errors
///
/// Fails with [`CoreError::AlreadyExists`] if the id is taken.
pub fn insert(t: &mut Tables, memo: Memo) -> CoreResult<()> {
    if t.memos.contains_key(&memo.id) {
        return Err(CoreError::already_exists("memo", memo.id));
    }
    let id = memo.id.clone();
    t.search.index(&id, &memo.content);
    t.memos.insert(id.clone(), memo);
    tags::sync_memo_tags(t, &id);
    Ok(())
}

/// Replaces a memo's content and re-derives its index entries.
pub fn update_content(
    t: &mut Tables,
    id: &str,
    content: String,
    updated_at: DateTime<Utc>,
) -> CoreResult<()> {
    let memo = get_mut(t, id)?;
    memo.content = content;
    memo.updated_at = updated_at;
    let content = memo.content.clone();
    t.search.index(id, &content);
    tags::sync_memo_tags(t, id);
    Ok(())
}

/// Sets the archive flag.
pub fn set_archived(
    t: &mut Tables,
    id: &str,
    is_archived: bool,
    updated_at: DateTime<Utc>,
) -> CoreResult<()> {
    let memo = get_mut(t, id)?;
    memo.is_archived = is_archived;
    memo.updated_at = updated_at;
    Ok(())
}

/// Sets the delete flag. Deleting unlinks the memo's tags, undeleting
/// recomputes them.
pub fn set_deleted(
    t: &mut Tables,
    id: &str,
    is_deleted: bool,
    updated_at: DateTime<Utc>,
) -> CoreResult<()> {
    let memo = get_mut(t, id)?;
    memo.is_deleted = is_deleted;
    memo.updated_at = updated_at;
    tags::sync_memo_tags(t, id);
    Ok(())
}

/// Removes a memo with all of its links. Returns false if it didn't exist.
pub fn purge(t: &mut Tables, id: &str) -> bool {
    if t.memos.remove(id).is_none() {
        return false;
    }
    t.search.remove(id);
    tags::set_memo_tags(t, id, &BTreeSet::new());
    t.memo_attachments.retain(|(memo, _)| memo != id);
    true
}

/// Ids of memos flagged deleted whose last update is before `cutoff`.
pub fn deleted_before(t: &Tables, cutoff: DateTime<Utc>) -> Vec<String> {
    t.memos
        .values()
        .filter(|m| m.is_deleted && m.updated_at < cutoff)
        .map(|m| m.id.clone())
        .collect()
}

/// Lists memos matching `query`, newest first.
///
/// Memos created at the same instant are ordered by id, descending. `after`
/// excludes everything up to and including that position.
pub fn list(
    t: &Tables,
    query: &ListMemosQuery,
    page_size: usize,
    after: Option<&MemoCursor>,
) -> Page<Memo, MemoCursor> {
    let tagged = query.tag.as_deref().map(|tag| tags::memos_with_tag(t, tag));
    let found = query
        .query
        .as_deref()
        .filter(|q| !q.trim().is_empty())
        .map(|q| t.search.search(q));

    let mut matching: Vec<&Memo> = t
        .memos
        .values()
        .filter(|m| tagged.as_ref().is_none_or(|ids| ids.contains(&m.id)))
        .filter(|m| found.as_ref().is_none_or(|ids| ids.contains(&m.id)))
        .filter(|m| query.matches(m))
        .filter(|m| after.is_none_or(|c| position(m) < (c.created_at, c.id.as_str())))
        .collect();
    matching.sort_by_key(|m| Reverse(position(m)));

    let has_more = matching.len() > page_size;
    let items: Vec<Memo> = matching.into_iter().take(page_size).cloned().collect();
    let next = match items.last() {
        Some(last) if has_more => Some(MemoCursor::of(last)),
        _ => None,
    };
    Page { items, next }
}

/// Number of memos, including deleted ones.
pub fn count(t: &Tables) -> usize {
    t.memos.len()
}

fn position(memo: &Memo) -> (DateTime<Utc>, &str) {
    (memo.created_at, memo.id.as_str())
}

fn get_mut<'a>(t: &'a mut Tables, id: &str) -> CoreResult<&'a mut Memo> {
    t.memos
        .get_mut(id)
        .ok_or_else(|| CoreError::not_found("memo", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn memo(id: &str, content: &str, minutes: i64) -> Memo {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes);
        Memo {
            id: id.into(),
            content: content.into(),
            is_archived: false,
            is_deleted: false,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn insert_rejects_duplicates() {
        let mut t = Tables::default();
        insert(&mut t, memo("m1", "a", 0)).unwrap();
        let err = insert(&mut t, memo("m1", "b", 1)).unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(get(&t, "m1").unwrap().content, "a");
    }

    #[test]
    fn missing_memo_is_not_found() {
        let mut t = Tables::default();
        assert!(get(&t, "nope").unwrap_err().is_not_found());
        assert!(set_archived(&mut t, "nope", true, Utc::now())
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn content_updates_follow_through_to_indexes() {
        let mut t = Tables::default();
        insert(&mut t, memo("m1", "apples #fruit", 0)).unwrap();
        assert_eq!(t.tags.get("fruit"), Some(&1));

        update_content(&mut t, "m1", "pears #veg".into(), Utc::now()).unwrap();
        assert_eq!(t.tags.get("fruit"), None);
        assert_eq!(t.tags.get("veg"), Some(&1));

        let q = ListMemosQuery {
            query: Some("apples".into()),
            ..Default::default()
        };
        assert!(list(&t, &q, 10, None).is_empty());
    }

    #[test]
    fn delete_and_undelete_adjust_tags() {
        let mut t = Tables::default();
        insert(&mut t, memo("m1", "#a", 0)).unwrap();
        set_deleted(&mut t, "m1", true, Utc::now()).unwrap();
        assert!(t.tags.is_empty());
        set_deleted(&mut t, "m1", false, Utc::now()).unwrap();
        assert_eq!(t.tags.get("a"), Some(&1));
    }

    #[test]
    fn list_is_newest_first_and_pages_strictly() {
        let mut t = Tables::default();
        for (i, id) in ["a", "b", "c", "d", "e"].iter().enumerate() {
            insert(&mut t, memo(id, "x", i as i64 / 2)).unwrap();
        }

        let mut seen = Vec::new();
        let mut after = None;
        loop {
            let page = list(&t, &ListMemosQuery::default(), 2, after.as_ref());
            seen.extend(page.items.iter().map(|m| m.id.clone()));
            match page.next {
                Some(next) => after = Some(next),
                None => break,
            }
        }
        assert_eq!(seen, vec!["e", "d", "c", "b", "a"]);
    }

    #[test]
    fn list_filters_by_tag_and_query() {
        let mut t = Tables::default();
        insert(&mut t, memo("m1", "oat milk #groceries", 0)).unwrap();
        insert(&mut t, memo("m2", "oat cookies #baking", 1)).unwrap();
        insert(&mut t, memo("m3", "flour #groceries", 2)).unwrap();

        let by_tag = ListMemosQuery {
            tag: Some("groceries".into()),
            ..Default::default()
        };
        let ids: Vec<_> = list(&t, &by_tag, 10, None).items.into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["m3", "m1"]);

        let both = ListMemosQuery {
            tag: Some("groceries".into()),
            query: Some("oat".into()),
            ..Default::default()
        };
        let ids: Vec<_> = list(&t, &both, 10, None).items.into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["m1"]);
    }

    #[test]
    fn purge_removes_links() {
        let mut t = Tables::default();
        insert(&mut t, memo("m1", "#a", 0)).unwrap();
        t.memo_attachments.insert(("m1".into(), "att".into()));

        assert!(purge(&mut t, "m1"));
        assert!(!purge(&mut t, "m1"));
        assert!(t.tags.is_empty());
        assert!(t.memo_attachments.is_empty());
        assert_eq!(t.search.memo_count(), 0);
    }

    #[test]
    fn deleted_before_uses_update_time() {
        let mut t = Tables::default();
        let old = memo("old", "", 0);
        let cutoff = old.updated_at + Duration::days(1);
        insert(&mut t, old).unwrap();
        insert(&mut t, memo("live", "", 0)).unwrap();
        set_deleted(&mut t, "old", true, cutoff - Duration::hours(1)).unwrap();

        assert_eq!(deleted_before(&t, cutoff), vec!["old".to_string()]);
        assert!(deleted_before(&t, cutoff - Duration::days(1)).is_empty());
    }
}
