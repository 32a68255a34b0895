//! The sync engine.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::info::{self, SetupSync, SyncInfo};
use crate::state::{SyncCycleResult, SyncState, SyncStats};
use crate::transport::{RemoteAttachments, SyncApi};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, SubsecRound, Utc};
use memodb_core::db::decode_snapshot;
use memodb_core::{
    apply_unapplied, Appliers, AttachmentController, ChangelogStore, Context, CryptoManager,
    Database, EncryptionKey, MemoController, ResultExt, SettingsController, Transaction,
};
use memodb_sync_protocol::{
    AccountKey, AttachmentChange, AttachmentUpload, ChangelogEntry, ChangelogValue,
    EncryptedChangelogEntry, ListChangesQuery, RegisterClientRequest,
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Instant;

/// The controllers remote entries are applied through.
///
/// They should be the same instances the application uses, so observers
/// registered on them see remote changes too.
#[derive(Clone)]
pub struct SyncTargets {
    /// Applies memo entries.
    pub memos: MemoController,
    /// Applies attachment entries and reads bytes for upload.
    pub attachments: AttachmentController,
    /// Applies settings entries.
    pub settings: SettingsController,
}

impl SyncTargets {
    /// Borrows the controllers for [`apply_unapplied`].
    pub fn appliers(&self) -> Appliers<'_> {
        Appliers {
            memos: &self.memos,
            attachments: &self.attachments,
            settings: &self.settings,
        }
    }
}

/// Synchronizes the local changelog with a sync server.
///
/// A cycle runs under one database transaction:
/// 1. Upload the account key fingerprint
/// 2. Fetch entries received since the last cycle, decrypt them and insert
///    them as synced and unapplied
/// 3. Apply unapplied entries and upload unsynced ones, concurrently
/// 4. Record the cycle's start time as `lastSyncedAt` and commit
///
/// Any failure rolls the whole cycle back and leaves `lastSyncedAt`
/// unchanged.
pub struct SyncEngine<A: SyncApi + 'static> {
    config: SyncConfig,
    api: Arc<A>,
    crypto: CryptoManager,
    db: Database,
    changelog: ChangelogStore,
    targets: SyncTargets,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    running: Mutex<Option<Context>>,
}

impl<A: SyncApi + 'static> SyncEngine<A> {
    /// Creates an engine.
    ///
    /// If sync was set up earlier, new changelog entries are stamped with
    /// the stored client id and missing attachment bytes are fetched from
    /// the server.
    pub fn new(
        config: SyncConfig,
        api: Arc<A>,
        key: &EncryptionKey,
        changelog: ChangelogStore,
        targets: SyncTargets,
    ) -> SyncResult<Self> {
        let engine = Self {
            config,
            api,
            crypto: CryptoManager::new(key),
            db: changelog.database().clone(),
            changelog,
            targets,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            running: Mutex::new(None),
        };
        if let Some(info) = info::load(&engine.db)?.filter(|i| i.is_enabled) {
            engine.activate(&info);
        }
        Ok(engine)
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the stored sync info.
    pub fn info(&self) -> SyncResult<Option<SyncInfo>> {
        info::load(&self.db)
    }

    /// Cancels the running cycle, if any. It fails with `Cancelled` and
    /// rolls back.
    pub fn cancel(&self) {
        if let Some(ctx) = self.running.lock().as_ref() {
            tracing::info!("cancelling sync");
            ctx.cancel();
        }
    }

    /// Registers this client with the server and enables sync.
    #[tracing::instrument(skip_all, fields(server = %req.server, username = %req.username))]
    pub async fn setup(&self, ctx: &Context, req: SetupSync) -> SyncResult<SyncInfo> {
        self.ensure_not_running("setup")?;
        let client_id = req
            .client_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        self.api
            .register_client(
                &self.request_ctx(ctx),
                &RegisterClientRequest {
                    client_id: client_id.clone(),
                },
            )
            .await?;

        let info = SyncInfo {
            is_enabled: true,
            server: req.server,
            username: req.username,
            client_id,
            last_synced_at: None,
        };
        info::save(ctx, &self.db, &info).await?;
        self.activate(&info);
        tracing::info!(client_id = %info.client_id, "sync set up");
        Ok(info)
    }

    /// Disables sync and forgets the stored sync info.
    #[tracing::instrument(skip_all)]
    pub async fn reset(&self, ctx: &Context) -> SyncResult<()> {
        self.ensure_not_running("reset")?;
        info::clear(ctx, &self.db).await?;
        self.changelog
            .set_source(self.db.config().source_name.clone());
        self.targets.attachments.set_fallback(None);
        *self.state.write() = SyncState::Idle;
        tracing::info!("sync reset");
        Ok(())
    }

    /// Runs one sync cycle.
    ///
    /// # Errors
    ///
    /// `NotEnabled` before [`setup`](Self::setup); `InvalidStateTransition`
    /// while another cycle runs; otherwise the first failure of the cycle.
    #[tracing::instrument(skip_all)]
    pub async fn sync(&self, ctx: &Context) -> SyncResult<SyncCycleResult> {
        let info = self.enabled_info()?;
        self.begin_cycle()?;

        let started = Instant::now();
        let cycle_start = Utc::now().trunc_subsecs(6);
        let run_ctx = ctx.child();
        *self.running.lock() = Some(run_ctx.clone());

        let outcome = self.run_cycle(&run_ctx, &info, cycle_start).await;
        *self.running.lock() = None;

        match outcome {
            Ok(mut result) => {
                result.duration = started.elapsed();
                *self.state.write() = SyncState::Idle;
                let mut stats = self.stats.write();
                stats.cycles_completed += 1;
                stats.entries_fetched += result.fetched;
                stats.entries_applied += result.applied;
                stats.entries_uploaded += result.uploaded;
                stats.attachments_uploaded += result.attachments_uploaded;
                stats.last_sync_time = Some(cycle_start);
                stats.last_error = None;
                tracing::info!(
                    fetched = result.fetched,
                    applied = result.applied,
                    uploaded = result.uploaded,
                    attachments = result.attachments_uploaded,
                    elapsed_ms = result.duration.as_millis() as u64,
                    "sync cycle completed"
                );
                Ok(result)
            }
            Err(e) => {
                *self.state.write() = SyncState::Error;
                self.stats.write().last_error = Some(e.to_string());
                tracing::error!(error = %e, "sync cycle failed");
                Err(e)
            }
        }
    }

    /// Replaces the local database with the encrypted copy on the server.
    ///
    /// This client's sync info survives the import; `lastSyncedAt` is
    /// cleared so the next cycle fetches every entry, known ids being
    /// skipped.
    #[tracing::instrument(skip_all)]
    pub async fn fetch_full_db(&self, ctx: &Context) -> SyncResult<()> {
        let local = self.enabled_info()?;
        self.ensure_not_running("fetch full database")?;

        let data = self.api.get_full_sync(&self.request_ctx(ctx)).await?;
        let plain = self
            .crypto
            .decrypt(&data)
            .context("fetch full database: decrypt")?;
        let tables = decode_snapshot(&plain, self.db.config().tokenizer.clone())
            .context("fetch full database: decode")?;

        let tx = self.db.begin(ctx).await?;
        tx.write(|t| *t = tables);
        info::store(
            &tx,
            &SyncInfo {
                last_synced_at: None,
                ..local
            },
        )?;
        tx.commit(ctx).await?;
        tracing::info!(len = plain.len(), "fetched full database");
        Ok(())
    }

    /// Uploads an encrypted copy of the whole local database.
    #[tracing::instrument(skip_all)]
    pub async fn upload_full_db(&self, ctx: &Context) -> SyncResult<()> {
        self.enabled_info()?;
        let data = self.db.export(ctx).await?;
        let encrypted = self
            .crypto
            .encrypt(&data)
            .context("upload full database: encrypt")?;
        self.api
            .upload_full_sync_data(&self.request_ctx(ctx), encrypted)
            .await?;
        tracing::info!(len = data.len(), "uploaded full database");
        Ok(())
    }

    async fn run_cycle(
        &self,
        ctx: &Context,
        info: &SyncInfo,
        cycle_start: DateTime<Utc>,
    ) -> SyncResult<SyncCycleResult> {
        let mut result = SyncCycleResult::default();

        self.upload_account_key(ctx).await?;

        self.set_state(SyncState::FetchingRemote);
        let tx = self.db.begin(ctx).await?;
        let (fetched, skipped) = self.fetch_remote(ctx, &tx, info).await?;
        result.fetched = fetched;
        result.skipped = skipped;

        self.set_state(SyncState::Applying);
        let (applied, (uploaded, attachments)) =
            tokio::try_join!(self.apply_pass(ctx, &tx), self.upload_pass(ctx, &tx, info))?;
        result.applied = applied;
        result.uploaded = uploaded;
        result.attachments_uploaded = attachments;

        info::store(
            &tx,
            &SyncInfo {
                last_synced_at: Some(cycle_start),
                ..info.clone()
            },
        )?;
        tx.commit(ctx).await?;
        Ok(result)
    }

    async fn upload_account_key(&self, ctx: &Context) -> SyncResult<()> {
        let key = AccountKey {
            name: self.config.account_key_name.clone(),
            key_type: self.config.account_key_type.clone(),
            data: STANDARD.encode(self.crypto.key_fingerprint()),
        };
        self.api
            .upload_account_key(&self.request_ctx(ctx), &key)
            .await
    }

    /// Returns (inserted, skipped).
    async fn fetch_remote(
        &self,
        ctx: &Context,
        tx: &Transaction,
        info: &SyncInfo,
    ) -> SyncResult<(u64, u64)> {
        let query = ListChangesQuery {
            since: info.last_synced_at,
        };
        let remote = self
            .api
            .list_changelog_entries(&self.request_ctx(ctx), &query)
            .await?;

        let mut skipped = 0u64;
        let mut entries = Vec::with_capacity(remote.len());
        for envelope in &remote {
            if envelope.sync_client_id == info.client_id {
                skipped += 1;
                continue;
            }
            entries.push(self.decrypt_entry(envelope)?);
        }

        let decrypted = entries.len();
        let inserted = self.changelog.insert_external(tx, entries)?;
        skipped += (decrypted - inserted) as u64;
        tracing::debug!(received = remote.len(), inserted, skipped, "fetched remote entries");
        Ok((inserted as u64, skipped))
    }

    async fn apply_pass(&self, ctx: &Context, tx: &Transaction) -> SyncResult<u64> {
        let applied = apply_unapplied(
            ctx,
            tx,
            &self.changelog,
            self.targets.appliers(),
            self.config.page_size,
        )
        .await?;

        let mut state = self.state.write();
        if *state == SyncState::Applying {
            *state = SyncState::UploadingLocal;
        }
        Ok(applied as u64)
    }

    /// Returns (entries uploaded, attachment files uploaded).
    async fn upload_pass(
        &self,
        ctx: &Context,
        tx: &Transaction,
        info: &SyncInfo,
    ) -> SyncResult<(u64, u64)> {
        let mut uploaded = 0u64;
        let mut attachments = 0u64;
        let mut after = None;

        loop {
            ctx.check()?;
            let page = self
                .changelog
                .list_unsynced(Some(tx), self.config.page_size, after);
            if page.items.is_empty() {
                break;
            }

            let ids: Vec<String> = page.items.iter().map(|e| e.id.clone()).collect();
            self.changelog.mark_synced(tx, &ids);

            let encrypted = page
                .items
                .iter()
                .map(|e| self.encrypt_entry(info, e))
                .collect::<SyncResult<Vec<_>>>()?;
            self.api
                .upload_changelog_entries(&self.request_ctx(ctx), encrypted)
                .await?;
            uploaded += ids.len() as u64;

            for entry in &page.items {
                let ChangelogValue::Attachment(AttachmentChange::Created(created)) = &entry.value
                else {
                    continue;
                };
                let data = match self
                    .targets
                    .attachments
                    .read_by_filepath(ctx, &created.filepath)
                    .await
                {
                    Ok(data) => data,
                    Err(e) if e.is_not_found() => {
                        tracing::warn!(
                            attachment = %entry.target_id,
                            filepath = %created.filepath,
                            "local attachment bytes missing, skipping upload"
                        );
                        continue;
                    }
                    Err(e) => {
                        return Err(e
                            .context(format!("upload attachment {}", entry.target_id))
                            .into())
                    }
                };
                self.api
                    .upload_attachment(
                        &self.request_ctx(ctx),
                        AttachmentUpload {
                            filepath: created.filepath.clone(),
                            data,
                        },
                    )
                    .await?;
                attachments += 1;
            }
            tracing::debug!(entries = ids.len(), "uploaded changelog page");

            match page.next {
                Some(next) => after = Some(next),
                None => break,
            }
        }

        Ok((uploaded, attachments))
    }

    fn encrypt_entry(
        &self,
        info: &SyncInfo,
        entry: &ChangelogEntry,
    ) -> SyncResult<EncryptedChangelogEntry> {
        let plain = entry.to_json()?;
        let sealed = self
            .crypto
            .encrypt(&plain)
            .with_context(|| format!("encrypt changelog entry {}", entry.id))?;
        Ok(EncryptedChangelogEntry {
            sync_client_id: info.client_id.clone(),
            data: STANDARD.encode(sealed),
            timestamp: entry.timestamp,
        })
    }

    fn decrypt_entry(&self, envelope: &EncryptedChangelogEntry) -> SyncResult<ChangelogEntry> {
        let sealed = STANDARD.decode(&envelope.data).map_err(|e| {
            SyncError::Protocol(format!(
                "invalid ciphertext from client {}: {e}",
                envelope.sync_client_id
            ))
        })?;
        let plain = self.crypto.decrypt(&sealed).with_context(|| {
            format!("decrypt changelog entry from client {}", envelope.sync_client_id)
        })?;
        Ok(ChangelogEntry::from_json(&plain)?)
    }

    fn activate(&self, info: &SyncInfo) {
        self.changelog.set_source(info.client_id.clone());
        self.targets
            .attachments
            .set_fallback(Some(Arc::new(RemoteAttachments::new(Arc::clone(&self.api)))));
    }

    fn enabled_info(&self) -> SyncResult<SyncInfo> {
        info::load(&self.db)?
            .filter(|i| i.is_enabled)
            .ok_or(SyncError::NotEnabled)
    }

    fn begin_cycle(&self) -> SyncResult<()> {
        let mut state = self.state.write();
        if !state.can_start_sync() {
            return Err(SyncError::InvalidStateTransition {
                from: state.to_string(),
                to: SyncState::UploadingAccountKey.to_string(),
            });
        }
        *state = SyncState::UploadingAccountKey;
        Ok(())
    }

    fn ensure_not_running(&self, operation: &str) -> SyncResult<()> {
        let state = self.state();
        if state.is_active() {
            return Err(SyncError::InvalidStateTransition {
                from: state.to_string(),
                to: operation.to_string(),
            });
        }
        Ok(())
    }

    fn set_state(&self, state: SyncState) {
        tracing::trace!(%state, "sync state");
        *self.state.write() = state;
    }

    fn request_ctx(&self, ctx: &Context) -> Context {
        ctx.clone().with_timeout(self.config.request_timeout)
    }
}

impl<A: SyncApi + 'static> std::fmt::Debug for SyncEngine<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}
