//! Remote sync API abstraction.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use memodb_core::{AttachmentFallback, Context, CoreError, CoreResult};
use memodb_sync_protocol::{
    AccountKey, AttachmentUpload, EncryptedChangelogEntry, ListChangesQuery,
    RegisterClientRequest,
};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// The operations the sync engine needs from the sync server.
///
/// Implementations must honour `ctx`: a cancelled context or a passed
/// deadline ends the call with `Cancelled` or `Timeout`.
#[async_trait]
pub trait SyncApi: Send + Sync {
    /// Registers this client with the account.
    async fn register_client(&self, ctx: &Context, request: &RegisterClientRequest)
        -> SyncResult<()>;

    /// Stores or replaces an account key.
    async fn upload_account_key(&self, ctx: &Context, key: &AccountKey) -> SyncResult<()>;

    /// Downloads the encrypted full-database blob.
    async fn get_full_sync(&self, ctx: &Context) -> SyncResult<Vec<u8>>;

    /// Replaces the encrypted full-database blob.
    async fn upload_full_sync_data(&self, ctx: &Context, data: Vec<u8>) -> SyncResult<()>;

    /// Lists encrypted entries received after `query.since`.
    async fn list_changelog_entries(
        &self,
        ctx: &Context,
        query: &ListChangesQuery,
    ) -> SyncResult<Vec<EncryptedChangelogEntry>>;

    /// Uploads encrypted entries.
    async fn upload_changelog_entries(
        &self,
        ctx: &Context,
        entries: Vec<EncryptedChangelogEntry>,
    ) -> SyncResult<()>;

    /// Uploads attachment bytes under their content-addressed path.
    async fn upload_attachment(&self, ctx: &Context, upload: AttachmentUpload) -> SyncResult<()>;

    /// Downloads attachment bytes by content-addressed path.
    async fn get_attachment_data_by_filepath(
        &self,
        ctx: &Context,
        filepath: &str,
    ) -> SyncResult<Vec<u8>>;
}

/// Serves missing attachment bytes from the sync server.
///
/// Installed on the attachment controller while sync is enabled.
pub struct RemoteAttachments<A: SyncApi + ?Sized> {
    api: Arc<A>,
}

impl<A: SyncApi + ?Sized> RemoteAttachments<A> {
    /// Wraps `api`.
    pub fn new(api: Arc<A>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl<A: SyncApi + ?Sized + 'static> AttachmentFallback for RemoteAttachments<A> {
    async fn get_attachment_data_by_filepath(
        &self,
        ctx: &Context,
        filepath: &str,
    ) -> CoreResult<Vec<u8>> {
        match self.api.get_attachment_data_by_filepath(ctx, filepath).await {
            Ok(data) => Ok(data),
            Err(e) if e.is_not_found() => Err(CoreError::not_found("remote attachment", filepath)),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    clients: BTreeSet<String>,
    keys: HashMap<String, AccountKey>,
    entries: Vec<EncryptedChangelogEntry>,
    blobs: HashMap<String, Vec<u8>>,
    full_sync: Option<Vec<u8>>,
    failure: Option<(u16, String)>,
    calls: Vec<&'static str>,
}

/// An in-memory [`SyncApi`] for tests.
///
/// Uploaded entries are stamped with the receive time and returned by later
/// listings, so two engines sharing one mock see each other's changes.
#[derive(Debug, Default)]
pub struct MockSyncApi {
    state: Mutex<MockState>,
}

impl MockSyncApi {
    /// Creates an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following call fail with `status` until cleared.
    pub fn set_failure(&self, failure: Option<(u16, &str)>) {
        self.state.lock().failure = failure.map(|(status, msg)| (status, msg.to_string()));
    }

    /// Adds entries as if another client had uploaded them.
    pub fn push_remote(&self, entries: impl IntoIterator<Item = EncryptedChangelogEntry>) {
        self.state.lock().entries.extend(entries);
    }

    /// Entries stored so far.
    pub fn entries(&self) -> Vec<EncryptedChangelogEntry> {
        self.state.lock().entries.clone()
    }

    /// Registered client ids.
    pub fn clients(&self) -> Vec<String> {
        self.state.lock().clients.iter().cloned().collect()
    }

    /// Returns the account key stored under `name`.
    pub fn account_key(&self, name: &str) -> Option<AccountKey> {
        self.state.lock().keys.get(name).cloned()
    }

    /// Returns the blob stored under `filepath`.
    pub fn blob(&self, filepath: &str) -> Option<Vec<u8>> {
        self.state.lock().blobs.get(filepath).cloned()
    }

    /// Names of the calls made so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    fn call(&self, ctx: &Context, name: &'static str) -> SyncResult<parking_lot::MutexGuard<'_, MockState>> {
        ctx.check()?;
        let mut state = self.state.lock();
        state.calls.push(name);
        if let Some((status, message)) = state.failure.clone() {
            return Err(SyncError::Server { status, message });
        }
        Ok(state)
    }
}

#[async_trait]
impl SyncApi for MockSyncApi {
    async fn register_client(
        &self,
        ctx: &Context,
        request: &RegisterClientRequest,
    ) -> SyncResult<()> {
        self.call(ctx, "register_client")?
            .clients
            .insert(request.client_id.clone());
        Ok(())
    }

    async fn upload_account_key(&self, ctx: &Context, key: &AccountKey) -> SyncResult<()> {
        self.call(ctx, "upload_account_key")?
            .keys
            .insert(key.name.clone(), key.clone());
        Ok(())
    }

    async fn get_full_sync(&self, ctx: &Context) -> SyncResult<Vec<u8>> {
        self.call(ctx, "get_full_sync")?
            .full_sync
            .clone()
            .ok_or_else(|| SyncError::Server {
                status: 404,
                message: "no full sync data".into(),
            })
    }

    async fn upload_full_sync_data(&self, ctx: &Context, data: Vec<u8>) -> SyncResult<()> {
        self.call(ctx, "upload_full_sync_data")?.full_sync = Some(data);
        Ok(())
    }

    async fn list_changelog_entries(
        &self,
        ctx: &Context,
        query: &ListChangesQuery,
    ) -> SyncResult<Vec<EncryptedChangelogEntry>> {
        let state = self.call(ctx, "list_changelog_entries")?;
        Ok(state
            .entries
            .iter()
            .filter(|e| query.since.is_none_or(|since| e.timestamp > since))
            .cloned()
            .collect())
    }

    async fn upload_changelog_entries(
        &self,
        ctx: &Context,
        entries: Vec<EncryptedChangelogEntry>,
    ) -> SyncResult<()> {
        let mut state = self.call(ctx, "upload_changelog_entries")?;
        let received = Utc::now().trunc_subsecs(6);
        state
            .entries
            .extend(entries.into_iter().map(|e| EncryptedChangelogEntry {
                timestamp: received,
                ..e
            }));
        Ok(())
    }

    async fn upload_attachment(&self, ctx: &Context, upload: AttachmentUpload) -> SyncResult<()> {
        self.call(ctx, "upload_attachment")?
            .blobs
            .insert(upload.filepath, upload.data);
        Ok(())
    }

    async fn get_attachment_data_by_filepath(
        &self,
        ctx: &Context,
        filepath: &str,
    ) -> SyncResult<Vec<u8>> {
        self.call(ctx, "get_attachment_data_by_filepath")?
            .blobs
            .get(filepath)
            .cloned()
            .ok_or_else(|| SyncError::Server {
                status: 404,
                message: format!("blob not found: {filepath}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_failure_injection() {
        let api = MockSyncApi::new();
        let ctx = Context::new();
        let request = RegisterClientRequest {
            client_id: "c1".into(),
        };

        api.set_failure(Some((503, "maintenance")));
        let err = api.register_client(&ctx, &request).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(api.clients().is_empty());

        api.set_failure(None);
        api.register_client(&ctx, &request).await.unwrap();
        assert_eq!(api.clients(), vec!["c1".to_string()]);
        assert_eq!(api.calls(), vec!["register_client", "register_client"]);
    }

    #[tokio::test]
    async fn mock_lists_since() {
        let api = MockSyncApi::new();
        let ctx = Context::new();
        let entry = |ts: &str| EncryptedChangelogEntry {
            sync_client_id: "other".into(),
            data: String::new(),
            timestamp: ts.parse().unwrap(),
        };
        api.push_remote([entry("2025-01-01T00:00:00Z"), entry("2025-01-02T00:00:00Z")]);

        let all = api
            .list_changelog_entries(&ctx, &ListChangesQuery::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let query = ListChangesQuery {
            since: Some("2025-01-01T00:00:00Z".parse().unwrap()),
        };
        let later = api.list_changelog_entries(&ctx, &query).await.unwrap();
        assert_eq!(later.len(), 1);
    }

    #[tokio::test]
    async fn remote_attachments_map_missing_blobs_to_not_found() {
        let api = Arc::new(MockSyncApi::new());
        let ctx = Context::new();
        let remote = RemoteAttachments::new(api.clone());

        let err = remote
            .get_attachment_data_by_filepath(&ctx, "/aa/bb")
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        api.upload_attachment(
            &ctx,
            AttachmentUpload {
                filepath: "/aa/bb".into(),
                data: vec![1, 2, 3],
            },
        )
        .await
        .unwrap();
        assert_eq!(
            remote.get_attachment_data_by_filepath(&ctx, "/aa/bb").await.unwrap(),
            vec![1, 2, 3]
        );
    }
}
