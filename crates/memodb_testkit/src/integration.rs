//! Cross-crate integration test helpers.
//!
//! [`replicate`] moves changelog entries from one client to another the way
//! a sync cycle does, minus encryption and the server. [`MemoModel`] is a
//! plain in-memory oracle that tracks what a client should contain after a
//! sequence of [`MemoOperation`]s.

use crate::fixtures::TestClient;
use crate::generators::MemoOperation;
use async_trait::async_trait;
use memodb_core::tags::extract_tags;
use memodb_core::{
    apply_unapplied, AttachmentController, AttachmentFallback, Context, CoreResult, CreateMemo,
    EntryFilter, ListMemosQuery, Pagination, Transaction, UpdateMemoContent,
};
use memodb_sync_protocol::ChangelogEntry;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

const PAGE_SIZE: usize = 64;

/// Copies every entry of `from` into `to` as remote entries and applies
/// them. Returns how many entries were new to `to`.
pub async fn replicate(from: &TestClient, to: &TestClient) -> usize {
    let entries = all_entries(from);
    let tx = to.db.begin(&to.ctx).await.expect("Failed to begin transaction");
    let inserted = to
        .changelog
        .insert_external(&tx, entries)
        .expect("Failed to insert entries");
    apply_pending(to, &tx).await;
    tx.commit(&to.ctx).await.expect("Failed to commit replication");
    inserted
}

/// Applies every unapplied entry of `client` inside `tx` through the same
/// routine a sync cycle uses. Returns the number of entries applied.
pub async fn apply_pending(client: &TestClient, tx: &Transaction) -> usize {
    apply_unapplied(&client.ctx, tx, &client.changelog, client.appliers(), PAGE_SIZE)
        .await
        .expect("Failed to apply entries")
}

/// Every changelog entry of `client`, in insertion order.
pub fn all_entries(client: &TestClient) -> Vec<ChangelogEntry> {
    let mut entries = Vec::new();
    let mut after = None;
    loop {
        let page = client.changelog.list(None, EntryFilter::All, PAGE_SIZE, after);
        entries.extend(page.items);
        match page.next {
            Some(next) => after = Some(next),
            None => return entries,
        }
    }
}

/// Serves attachment bytes from another client's local files.
pub struct PeerAttachments {
    peer: AttachmentController,
}

impl PeerAttachments {
    /// Reads from `peer`'s attachment store.
    pub fn new(peer: &TestClient) -> Arc<Self> {
        Arc::new(Self {
            peer: peer.attachments.clone(),
        })
    }
}

#[async_trait]
impl AttachmentFallback for PeerAttachments {
    async fn get_attachment_data_by_filepath(
        &self,
        ctx: &Context,
        filepath: &str,
    ) -> CoreResult<Vec<u8>> {
        self.peer.read_by_filepath(ctx, filepath).await
    }
}

/// A memo as compared between clients.
///
/// `updated_at` is left out: applied entries stamp it with the entry time,
/// local writes with the wall clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoState {
    /// Content.
    pub content: String,
    /// Archive flag.
    pub is_archived: bool,
    /// Soft-delete flag.
    pub is_deleted: bool,
}

/// The user-visible state of a client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientState {
    /// Memos by id.
    pub memos: BTreeMap<String, MemoState>,
    /// Tag counts, alphabetical.
    pub tags: Vec<(String, u64)>,
    /// The loaded settings document.
    pub settings: Value,
}

impl ClientState {
    /// Reads the state of `client` through its controllers.
    pub async fn capture(client: &TestClient) -> Self {
        let ctx = &client.ctx;

        let mut memos = BTreeMap::new();
        let mut pagination = Pagination::first(PAGE_SIZE);
        loop {
            let page = client
                .memos
                .list_memos(ctx, &ListMemosQuery::default(), &pagination)
                .await
                .expect("Failed to list memos");
            for memo in page.items {
                memos.insert(
                    memo.id,
                    MemoState {
                        content: memo.content,
                        is_archived: memo.is_archived,
                        is_deleted: memo.is_deleted,
                    },
                );
            }
            match page.next {
                Some(next) => pagination.page_after = Some(next),
                None => break,
            }
        }

        let mut tags = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let page = client
                .memos
                .list_tags(ctx, PAGE_SIZE, after.as_deref())
                .await
                .expect("Failed to list tags");
            tags.extend(page.items.into_iter().map(|t| (t.tag, t.count)));
            match page.next {
                Some(next) => after = Some(next),
                None => break,
            }
        }

        let settings = client
            .settings
            .load_settings(ctx)
            .await
            .expect("Failed to load settings");

        Self {
            memos,
            tags,
            settings,
        }
    }
}

/// Expected state of a client after a sequence of operations.
#[derive(Debug, Default)]
pub struct MemoModel {
    ids: Vec<String>,
    memos: BTreeMap<String, MemoState>,
    settings: BTreeMap<String, Value>,
}

impl MemoModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `op` against `client` and records its effect.
    ///
    /// Operations that make no sense for the targeted memo (editing a
    /// deleted memo, deleting twice, undeleting a live memo) are skipped.
    /// Returns true if the operation ran.
    pub async fn run(&mut self, client: &TestClient, op: &MemoOperation) -> bool {
        let ctx = &client.ctx;
        match op {
            MemoOperation::Create { content } => {
                let memo = client
                    .memos
                    .create_memo(ctx, CreateMemo::new(content.clone()))
                    .await
                    .expect("Failed to create memo");
                self.ids.push(memo.id.clone());
                self.memos.insert(
                    memo.id,
                    MemoState {
                        content: content.clone(),
                        is_archived: false,
                        is_deleted: false,
                    },
                );
                true
            }
            MemoOperation::Edit { index, content } => {
                let Some(id) = self.pick(*index, |m| !m.is_deleted) else {
                    return false;
                };
                client
                    .memos
                    .update_memo_content(ctx, UpdateMemoContent::new(id.clone(), content.clone()))
                    .await
                    .expect("Failed to update memo");
                self.state_mut(&id).content = content.clone();
                true
            }
            MemoOperation::Archive { index, archived } => {
                let Some(id) = self.pick(*index, |_| true) else {
                    return false;
                };
                client
                    .memos
                    .update_memo_archive_status(ctx, &id, *archived)
                    .await
                    .expect("Failed to archive memo");
                self.state_mut(&id).is_archived = *archived;
                true
            }
            MemoOperation::Delete { index } => {
                let Some(id) = self.pick(*index, |m| !m.is_deleted) else {
                    return false;
                };
                client
                    .memos
                    .delete_memo(ctx, &id)
                    .await
                    .expect("Failed to delete memo");
                self.state_mut(&id).is_deleted = true;
                true
            }
            MemoOperation::Undelete { index } => {
                let Some(id) = self.pick(*index, |m| m.is_deleted) else {
                    return false;
                };
                client
                    .memos
                    .undelete_memo(ctx, &id)
                    .await
                    .expect("Failed to undelete memo");
                self.state_mut(&id).is_deleted = false;
                true
            }
            MemoOperation::Setting { key, value } => {
                client
                    .settings
                    .update_setting(ctx, key, value.clone())
                    .await
                    .expect("Failed to update setting");
                self.settings.insert(key.clone(), value.clone());
                true
            }
        }
    }

    /// Memos the client should hold.
    pub fn memos(&self) -> &BTreeMap<String, MemoState> {
        &self.memos
    }

    /// Tag counts the client should report: every tag of every live memo.
    pub fn expected_tags(&self) -> Vec<(String, u64)> {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for memo in self.memos.values().filter(|m| !m.is_deleted) {
            for tag in extract_tags(&memo.content) {
                *counts.entry(tag).or_insert(0) += 1;
            }
        }
        counts.into_iter().collect()
    }

    /// Settings values the client should return, by key.
    pub fn settings(&self) -> &BTreeMap<String, Value> {
        &self.settings
    }

    /// Asserts that `state` matches the model.
    pub fn assert_matches(&self, state: &ClientState) {
        assert_eq!(&state.memos, &self.memos, "memo mismatch");
        assert_eq!(state.tags, self.expected_tags(), "tag mismatch");
        for (key, expected) in &self.settings {
            let actual = key
                .split('.')
                .try_fold(&state.settings, |doc, part| doc.get(part));
            assert_eq!(actual, Some(expected), "setting mismatch for {key}");
        }
    }

    fn pick(&self, index: usize, eligible: impl Fn(&MemoState) -> bool) -> Option<String> {
        if self.ids.is_empty() {
            return None;
        }
        let id = &self.ids[index % self.ids.len()];
        self.memos
            .get(id)
            .filter(|m| eligible(m))
            .map(|_| id.clone())
    }

    fn state_mut(&mut self, id: &str) -> &mut MemoState {
        self.memos.get_mut(id).expect("Model tracks every created memo")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::block_on;
    use crate::generators::{operation_sequence_strategy, PropTestConfig};
    use memodb_core::CreateAttachment;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_replicate_is_idempotent() {
        let a = TestClient::named("a");
        let b = TestClient::named("b");
        let memo = a.memo("first #one").await;
        a.memos
            .update_memo_content(&a.ctx, UpdateMemoContent::new(&memo.id, "first #two"))
            .await
            .unwrap();

        assert_eq!(replicate(&a, &b).await, 2);
        assert_eq!(replicate(&a, &b).await, 0);

        let copy = b.memos.get_memo(&b.ctx, &memo.id).await.unwrap();
        assert_eq!(copy.content, "first #two");
        assert_eq!(ClientState::capture(&a).await, ClientState::capture(&b).await);
    }

    #[tokio::test]
    async fn test_replicated_entries_are_synced_and_applied() {
        let a = TestClient::named("a");
        let b = TestClient::named("b");
        a.memo("x").await;
        replicate(&a, &b).await;

        let entries = all_entries(&b);
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_synced);
        assert!(entries[0].is_applied);
        assert_eq!(entries[0].source, "a");
    }

    #[tokio::test]
    async fn test_peer_attachments_fill_missing_bytes() {
        let a = TestClient::named("a");
        let b = TestClient::named("b");
        let id = a
            .attachments
            .create_attachment(&a.ctx, CreateAttachment::new("note.txt", b"hello".to_vec()))
            .await
            .unwrap();
        replicate(&a, &b).await;

        assert!(b.attachments.verify_attachment(&b.ctx, &id).await.is_err());
        b.attachments.set_fallback(Some(PeerAttachments::new(&a)));
        let (_, data) = b.attachments.get_attachment_data(&b.ctx, &id).await.unwrap();
        assert_eq!(data, b"hello");
        assert!(b.attachments.verify_attachment(&b.ctx, &id).await.unwrap());
    }

    #[tokio::test]
    async fn test_model_skips_ineligible_operations() {
        let client = TestClient::memory();
        let mut model = MemoModel::new();
        assert!(!model.run(&client, &MemoOperation::Delete { index: 0 }).await);

        let create = MemoOperation::Create {
            content: "#a".into(),
        };
        assert!(model.run(&client, &create).await);
        assert!(!model.run(&client, &MemoOperation::Undelete { index: 0 }).await);
        assert!(model.run(&client, &MemoOperation::Delete { index: 0 }).await);
        assert!(!model.run(&client, &MemoOperation::Delete { index: 0 }).await);
        let edit = MemoOperation::Edit {
            index: 0,
            content: "#b".into(),
        };
        assert!(!model.run(&client, &edit).await);

        assert!(model.expected_tags().is_empty());
        model.assert_matches(&ClientState::capture(&client).await);
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn controllers_match_model(ops in operation_sequence_strategy(0, 24)) {
            block_on(async {
                let client = TestClient::memory();
                let mut model = MemoModel::new();
                for op in &ops {
                    model.run(&client, op).await;
                }
                model.assert_matches(&ClientState::capture(&client).await);
            });
        }

        #[test]
        fn replicas_converge(ops in operation_sequence_strategy(0, 24)) {
            block_on(async {
                let a = TestClient::named("a");
                let b = TestClient::named("b");
                let mut model = MemoModel::new();
                for op in &ops {
                    model.run(&a, op).await;
                }
                replicate(&a, &b).await;

                let state = ClientState::capture(&b).await;
                model.assert_matches(&state);
                assert_eq!(state, ClientState::capture(&a).await);
            });
        }

        #[test]
        fn replication_in_batches_converges(
            ops in operation_sequence_strategy(2, 24),
            split in any::<prop::sample::Index>(),
        ) {
            block_on(async {
                let a = TestClient::named("a");
                let b = TestClient::named("b");
                let mut model = MemoModel::new();
                let split = split.index(ops.len());
                for op in &ops[..split] {
                    model.run(&a, op).await;
                }
                replicate(&a, &b).await;
                for op in &ops[split..] {
                    model.run(&a, op).await;
                }
                replicate(&a, &b).await;

                model.assert_matches(&ClientState::capture(&b).await);
            });
        }
    }
}
