//! Memo controller.

use super::notify_after_commit;
use crate::changelog::ChangelogStore;
use crate::context::Context;
use crate::db::{Database, Tables, Transaction};
use crate::error::{CoreError, CoreResult, ResultExt};
use crate::events::{EntityEvent, EventRegistry};
use crate::merge;
use crate::model::{new_id, ListMemosQuery, Memo, MemoCursor, Page, Pagination, Tag};
use crate::repo::{attachments, memos};
use crate::{changelog, tags};
use chrono::{DateTime, Utc};
use memodb_sync_protocol::{
    ChangelogEntry, ChangelogValue, MemoChange, MemoContentChanges, MemoCreated, REVISION_CREATE,
    REVISION_UPDATE,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// Request to create a memo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateMemo {
    /// Initial content.
    pub content: String,
    /// Creation time; defaults to now.
    pub created_at: Option<DateTime<Utc>>,
    /// Memo id; generated when absent.
    pub id: Option<String>,
}

impl CreateMemo {
    /// Creates a request for a memo with `content`.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Uses `id` instead of a generated one.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the creation time.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// Request to replace a memo's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateMemoContent {
    /// Memo id.
    pub id: String,
    /// The new content.
    pub content: String,
    /// Patch from the current content to `content`. Computed when absent.
    pub changes: Option<MemoContentChanges>,
}

impl UpdateMemoContent {
    /// Creates a request whose patch is computed from the stored content.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            changes: None,
        }
    }

    /// Records `changes` as the patch instead of computing one.
    #[must_use]
    pub fn with_changes(mut self, changes: MemoContentChanges) -> Self {
        self.changes = Some(changes);
        self
    }
}

/// Creates, edits and lists memos, and applies memo changelog entries.
#[derive(Clone)]
pub struct MemoController {
    db: Database,
    changelog: ChangelogStore,
    events: Arc<EventRegistry>,
}

impl MemoController {
    /// Creates a controller writing to `changelog`'s database.
    pub fn new(changelog: ChangelogStore) -> Self {
        Self {
            db: changelog.database().clone(),
            changelog,
            events: Arc::new(EventRegistry::new("memos")),
        }
    }

    /// Observer registry for memo events.
    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    /// Subscribes to memo events.
    pub fn subscribe(&self) -> UnboundedReceiver<EntityEvent> {
        self.events.subscribe()
    }

    /// Returns a memo.
    pub async fn get_memo(&self, ctx: &Context, id: &str) -> CoreResult<Memo> {
        ctx.check()?;
        self.db.read(|t| memos::get(t, id).cloned())
    }

    /// Lists memos newest first.
    pub async fn list_memos(
        &self,
        ctx: &Context,
        filter: &ListMemosQuery,
        pagination: &Pagination,
    ) -> CoreResult<Page<Memo, MemoCursor>> {
        ctx.check()?;
        let page_size = self.page_size(pagination.page_size);
        Ok(self
            .db
            .read(|t| memos::list(t, filter, page_size, pagination.page_after.as_ref())))
    }

    /// Lists tags alphabetically with their memo counts.
    pub async fn list_tags(
        &self,
        ctx: &Context,
        page_size: usize,
        page_after: Option<&str>,
    ) -> CoreResult<Page<Tag, String>> {
        ctx.check()?;
        let page_size = self.page_size(page_size);
        Ok(self.db.read(|t| tags::list_tags(t, page_size, page_after)))
    }

    /// Creates a memo.
    #[tracing::instrument(skip_all, fields(id))]
    pub async fn create_memo(&self, ctx: &Context, req: CreateMemo) -> CoreResult<Memo> {
        let created_at = req.created_at.unwrap_or_else(Utc::now);
        let memo = Memo {
            id: req.id.unwrap_or_else(new_id),
            content: req.content,
            is_archived: false,
            is_deleted: false,
            created_at,
            updated_at: created_at,
        };
        tracing::Span::current().record("id", memo.id.as_str());

        let scope = self.db.in_transaction(ctx, None).await?;
        scope
            .write(|t| {
                memos::insert(t, memo.clone())?;
                link_attachments(t, &memo.id, &memo.content);
                Ok::<_, CoreError>(())
            })
            .with_context(|| format!("create memo {}", memo.id))?;

        let entry = self.changelog.new_entry(
            REVISION_CREATE,
            &memo.id,
            MemoChange::Created(MemoCreated {
                content: memo.content.clone(),
                is_archived: memo.is_archived,
                is_deleted: memo.is_deleted,
                created_at: memo.created_at,
                updated_at: memo.updated_at,
            }),
        );
        self.changelog.create_entry(&scope, entry)?;

        notify_after_commit(&scope, &self.events, vec![EntityEvent::created(&memo.id)]);
        scope.commit(ctx).await?;
        tracing::debug!("created memo");
        Ok(memo)
    }

    /// Replaces a memo's content and records the patch.
    #[tracing::instrument(skip_all, fields(id = %req.id))]
    pub async fn update_memo_content(&self, ctx: &Context, req: UpdateMemoContent) -> CoreResult<()> {
        if let Some(changes) = &req.changes {
            if !changes.is_supported() {
                return Err(CoreError::validation(format!(
                    "unsupported patch version {}",
                    changes.version
                )));
            }
        }

        let scope = self.db.in_transaction(ctx, None).await?;
        let now = Utc::now();
        let changes = scope
            .write(|t| {
                let current = memos::get(t, &req.id)?;
                let changes = match req.changes {
                    Some(changes) => changes,
                    None => MemoContentChanges::new(merge::diff(&current.content, &req.content)),
                };
                memos::update_content(t, &req.id, req.content.clone(), now)?;
                link_attachments(t, &req.id, &req.content);
                Ok::<_, CoreError>(changes)
            })
            .with_context(|| format!("update memo {}", req.id))?;

        let entry = self
            .changelog
            .new_entry(REVISION_UPDATE, &req.id, MemoChange::Content(changes));
        self.changelog.create_entry(&scope, entry)?;

        notify_after_commit(&scope, &self.events, vec![EntityEvent::changed(&req.id)]);
        scope.commit(ctx).await
    }

    /// Archives or unarchives a memo.
    pub async fn update_memo_archive_status(
        &self,
        ctx: &Context,
        id: &str,
        is_archived: bool,
    ) -> CoreResult<()> {
        self.set_flag(ctx, id, MemoChange::IsArchived(is_archived))
            .await
            .with_context(|| format!("update archive status of memo {id}"))
    }

    /// Flags a memo as deleted and unlinks its tags.
    pub async fn delete_memo(&self, ctx: &Context, id: &str) -> CoreResult<()> {
        self.set_flag(ctx, id, MemoChange::IsDeleted(true))
            .await
            .with_context(|| format!("delete memo {id}"))
    }

    /// Clears a memo's delete flag and restores its tags.
    pub async fn undelete_memo(&self, ctx: &Context, id: &str) -> CoreResult<()> {
        self.set_flag(ctx, id, MemoChange::IsDeleted(false))
            .await
            .with_context(|| format!("undelete memo {id}"))
    }

    async fn set_flag(&self, ctx: &Context, id: &str, change: MemoChange) -> CoreResult<()> {
        let scope = self.db.in_transaction(ctx, None).await?;
        let now = Utc::now();
        scope.write(|t| apply_flag(t, id, &change, now))?;

        let entry = self.changelog.new_entry(REVISION_UPDATE, id, change);
        self.changelog.create_entry(&scope, entry)?;

        notify_after_commit(&scope, &self.events, vec![EntityEvent::changed(id)]);
        scope.commit(ctx).await
    }

    /// Removes memos that have been deleted for longer than the configured
    /// retention. Returns how many were removed.
    ///
    /// Removal is local housekeeping and writes no changelog entries.
    #[tracing::instrument(skip_all)]
    pub async fn cleanup_deleted_memos(&self, ctx: &Context) -> CoreResult<usize> {
        let retention = chrono::Duration::from_std(self.db.config().deleted_memo_retention)
            .map_err(|e| CoreError::validation(format!("invalid memo retention: {e}")))?;
        let cutoff = Utc::now() - retention;

        let scope = self.db.in_transaction(ctx, None).await?;
        let removed = scope.write(|t| {
            let ids = memos::deleted_before(t, cutoff);
            for id in &ids {
                memos::purge(t, id);
            }
            ids.len()
        });
        scope.commit(ctx).await?;

        if removed > 0 {
            tracing::info!(removed, "removed deleted memos");
        }
        Ok(removed)
    }

    /// Applies memo entries received from other clients, in order.
    ///
    /// The first content patch of a memo in `entries` rebuilds its content
    /// from every entry in the store, so later patches for the same memo in
    /// the same batch are already included and are skipped.
    #[tracing::instrument(skip_all, fields(entries = entries.len()))]
    pub async fn apply_changelog_entries(
        &self,
        ctx: &Context,
        tx: Option<&Transaction>,
        entries: &[ChangelogEntry],
    ) -> CoreResult<()> {
        let scope = self.db.in_transaction(ctx, tx).await?;
        let mut rebuilt: HashSet<&str> = HashSet::new();
        let mut events = Vec::with_capacity(entries.len());

        for entry in entries {
            ctx.check()?;
            let ChangelogValue::Memo(change) = &entry.value else {
                return Err(CoreError::validation(format!(
                    "changelog entry {} targets {}, not memos",
                    entry.id,
                    entry.target_type()
                )));
            };
            if matches!(change, MemoChange::Content(_)) && !rebuilt.insert(entry.target_id.as_str()) {
                continue;
            }

            let event = scope
                .write(|t| apply_entry(t, entry, change))
                .with_context(|| format!("apply changelog entry {} to memo {}", entry.id, entry.target_id))?;
            events.push(event);
        }

        notify_after_commit(&scope, &self.events, events);
        scope.commit(ctx).await
    }

    fn page_size(&self, requested: usize) -> usize {
        if requested == 0 {
            self.db.config().default_page_size
        } else {
            requested
        }
    }
}

impl std::fmt::Debug for MemoController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoController")
            .field("events", &self.events)
            .finish()
    }
}

fn apply_entry(t: &mut Tables, entry: &ChangelogEntry, change: &MemoChange) -> CoreResult<EntityEvent> {
    let id = entry.target_id.as_str();
    match change {
        MemoChange::Created(created) => {
            let memo = Memo {
                id: id.to_string(),
                content: created.content.clone(),
                is_archived: created.is_archived,
                is_deleted: created.is_deleted,
                created_at: created.created_at,
                updated_at: created.updated_at,
            };
            memos::insert(t, memo)?;
            link_attachments(t, id, &created.content);
            Ok(EntityEvent::created(id))
        }
        MemoChange::Content(_) => {
            memos::get(t, id)?;
            let content = merge::replay(changelog::entries_for_target(t, id));
            memos::update_content(t, id, content.clone(), entry.timestamp)?;
            link_attachments(t, id, &content);
            Ok(EntityEvent::changed(id))
        }
        flag => {
            apply_flag(t, id, flag, entry.timestamp)?;
            Ok(EntityEvent::changed(id))
        }
    }
}

fn apply_flag(t: &mut Tables, id: &str, change: &MemoChange, at: DateTime<Utc>) -> CoreResult<()> {
    match change {
        MemoChange::IsArchived(v) => memos::set_archived(t, id, *v, at),
        MemoChange::IsDeleted(v) => memos::set_deleted(t, id, *v, at),
        other => Err(CoreError::validation(format!(
            "not a memo flag change: {other:?}"
        ))),
    }
}

fn link_attachments(t: &mut Tables, memo_id: &str, content: &str) {
    let ids = attachments::extract_attachment_ids(content);
    let (added, removed) = attachments::set_memo_links(t, memo_id, &ids);
    if added + removed > 0 {
        tracing::trace!(memo = memo_id, added, removed, "updated attachment links");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;
    use memodb_sync_protocol::Change;

    fn controller() -> (MemoController, Context) {
        let db = Database::open_in_memory(DbConfig::default());
        (MemoController::new(ChangelogStore::new(db)), Context::new())
    }

    #[tokio::test]
    async fn create_writes_memo_and_entry() {
        let (memos, ctx) = controller();
        let memo = memos
            .create_memo(&ctx, CreateMemo::new("hello #world"))
            .await
            .unwrap();

        let entries = memos.changelog.list_for_target(None, &memo.id);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].revision, REVISION_CREATE);
        assert!(!entries[0].is_synced);
        assert!(entries[0].is_applied);

        let tags = memos.list_tags(&ctx, 0, None).await.unwrap();
        assert_eq!(tags.items[0].tag, "world");
    }

    #[tokio::test]
    async fn update_records_a_diff_that_replays() {
        let (memos, ctx) = controller();
        let memo = memos
            .create_memo(&ctx, CreateMemo::new("hello world"))
            .await
            .unwrap();
        memos
            .update_memo_content(&ctx, UpdateMemoContent::new(&memo.id, "hello brave world"))
            .await
            .unwrap();

        let entries = memos.changelog.list_for_target(None, &memo.id);
        assert_eq!(merge::replay(&entries), "hello brave world");
        assert_eq!(
            memos.get_memo(&ctx, &memo.id).await.unwrap().content,
            "hello brave world"
        );
    }

    #[tokio::test]
    async fn update_of_missing_memo_is_not_found() {
        let (memos, ctx) = controller();
        let err = memos
            .update_memo_content(&ctx, UpdateMemoContent::new("missing", "x"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(memos.changelog.count(None), 0);
    }

    #[tokio::test]
    async fn unsupported_patch_version_is_rejected() {
        let (memos, ctx) = controller();
        let mut changes = MemoContentChanges::insert_all("x");
        changes.version = "2".into();
        let err = memos
            .update_memo_content(&ctx, UpdateMemoContent::new("m", "x").with_changes(changes))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn events_fire_after_commit() {
        let (memos, ctx) = controller();
        let mut rx = memos.subscribe();
        let memo = memos.create_memo(&ctx, CreateMemo::new("a")).await.unwrap();
        memos.delete_memo(&ctx, &memo.id).await.unwrap();

        assert_eq!(rx.recv().await, Some(EntityEvent::created(&memo.id)));
        assert_eq!(rx.recv().await, Some(EntityEvent::changed(&memo.id)));
    }

    #[tokio::test]
    async fn apply_skips_later_patches_for_the_same_memo() {
        let (memos, ctx) = controller();
        let tx = memos.db.begin(&ctx).await.unwrap();

        let created = memos.changelog.new_entry(
            REVISION_CREATE,
            "m1",
            MemoChange::Created(MemoCreated {
                content: "A".into(),
                is_archived: false,
                is_deleted: false,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            }),
        );
        let b = memos.changelog.new_entry(
            REVISION_UPDATE,
            "m1",
            MemoChange::Content(MemoContentChanges::append(1, "B")),
        );
        let c = memos.changelog.new_entry(
            REVISION_UPDATE,
            "m1",
            MemoChange::Content(MemoContentChanges::new(vec![
                Change::Retain(2),
                Change::Insert("C".into()),
            ])),
        );
        let batch = vec![created, b, c];
        memos
            .changelog
            .insert_external(&tx, batch.clone())
            .unwrap();
        memos
            .apply_changelog_entries(&ctx, Some(&tx), &batch)
            .await
            .unwrap();
        tx.commit(&ctx).await.unwrap();

        assert_eq!(memos.get_memo(&ctx, "m1").await.unwrap().content, "ABC");
    }

    #[tokio::test]
    async fn applying_a_created_entry_twice_is_a_typed_error() {
        let (memos, ctx) = controller();
        let memo = memos.create_memo(&ctx, CreateMemo::new("x")).await.unwrap();
        let entries = memos.changelog.list_for_target(None, &memo.id);

        let err = memos
            .apply_changelog_entries(&ctx, None, &entries)
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn apply_rejects_foreign_target_types() {
        let (memos, ctx) = controller();
        let entry = memos.changelog.new_entry(
            REVISION_UPDATE,
            "theme.mode",
            memodb_sync_protocol::SettingChange::Value(serde_json::json!("dark")),
        );
        let err = memos
            .apply_changelog_entries(&ctx, None, &[entry])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn cleanup_respects_retention() {
        let db = Database::open_in_memory(
            DbConfig::default().deleted_memo_retention(std::time::Duration::ZERO),
        );
        let memos = MemoController::new(ChangelogStore::new(db));
        let ctx = Context::new();

        let keep = memos.create_memo(&ctx, CreateMemo::new("keep")).await.unwrap();
        let gone = memos.create_memo(&ctx, CreateMemo::new("gone")).await.unwrap();
        memos.delete_memo(&ctx, &gone.id).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        assert_eq!(memos.cleanup_deleted_memos(&ctx).await.unwrap(), 1);
        assert!(memos.get_memo(&ctx, &gone.id).await.unwrap_err().is_not_found());
        assert!(memos.get_memo(&ctx, &keep.id).await.is_ok());
    }
}
