//! Content-addressed attachment storage.
//!
//! Attachment bytes are stored once per SHA-256 digest under a path made of
//! the digest's 32 bytes as two-digit hex segments, below the configured
//! attachments root. Every upload still gets its own attachment row and id;
//! rows with equal content share the file.

use super::notify_after_commit;
use crate::changelog::ChangelogStore;
use crate::context::Context;
use crate::crypto::{Hasher, Sha256Hasher};
use crate::db::{Database, Transaction};
use crate::error::{CoreError, CoreResult, ResultExt};
use crate::events::{EntityEvent, EventRegistry};
use crate::model::{new_id, Attachment};
use crate::repo::attachments;
use async_trait::async_trait;
use chrono::Utc;
use memodb_storage::{path, FileSystem};
use memodb_sync_protocol::{
    AttachmentChange, AttachmentCreated, ChangelogEntry, ChangelogValue, REVISION_CREATE,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// Remote source for attachment bytes missing locally.
#[async_trait]
pub trait AttachmentFallback: Send + Sync {
    /// Fetches the bytes stored at `filepath`, a digest path as recorded in
    /// the attachment row.
    async fn get_attachment_data_by_filepath(
        &self,
        ctx: &Context,
        filepath: &str,
    ) -> CoreResult<Vec<u8>>;
}

/// Request to store an attachment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateAttachment {
    /// Attachment id; generated when absent.
    pub id: Option<String>,
    /// Filename as supplied by the user.
    pub filename: String,
    /// MIME type; derived from the filename when absent.
    pub content_type: Option<String>,
    /// The bytes.
    pub data: Vec<u8>,
}

impl CreateAttachment {
    /// Creates a request for `data` named `filename`.
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
            ..Self::default()
        }
    }

    /// Uses `id` instead of a generated one.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the MIME type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Stores and retrieves attachments and applies attachment entries.
#[derive(Clone)]
pub struct AttachmentController {
    db: Database,
    changelog: ChangelogStore,
    fs: Arc<dyn FileSystem>,
    hasher: Arc<dyn Hasher>,
    fallback: Arc<RwLock<Option<Arc<dyn AttachmentFallback>>>>,
    events: Arc<EventRegistry>,
}

impl AttachmentController {
    /// Creates a controller storing bytes on `fs`, hashed with SHA-256.
    pub fn new(changelog: ChangelogStore, fs: Arc<dyn FileSystem>) -> Self {
        Self::with_hasher(changelog, fs, Arc::new(Sha256Hasher))
    }

    /// Creates a controller with a custom hasher.
    pub fn with_hasher(
        changelog: ChangelogStore,
        fs: Arc<dyn FileSystem>,
        hasher: Arc<dyn Hasher>,
    ) -> Self {
        Self {
            db: changelog.database().clone(),
            changelog,
            fs,
            hasher,
            fallback: Arc::new(RwLock::new(None)),
            events: Arc::new(EventRegistry::new("attachments")),
        }
    }

    /// Sets or clears the remote fallback used when bytes are missing.
    pub fn set_fallback(&self, fallback: Option<Arc<dyn AttachmentFallback>>) {
        *self.fallback.write() = fallback;
    }

    /// Returns true if a remote fallback is configured.
    pub fn has_fallback(&self) -> bool {
        self.fallback.read().is_some()
    }

    /// Returns the filesystem holding the bytes.
    pub fn filesystem(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Observer registry for attachment events.
    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    /// Subscribes to attachment events.
    pub fn subscribe(&self) -> UnboundedReceiver<EntityEvent> {
        self.events.subscribe()
    }

    /// Stores `req.data` and records a new attachment. Returns its id.
    ///
    /// The bytes are written only if no file with the same digest exists.
    #[tracing::instrument(skip_all, fields(filename = %req.filename, size = req.data.len()))]
    pub async fn create_attachment(&self, ctx: &Context, req: CreateAttachment) -> CoreResult<String> {
        let digest = self.hasher.sum(&req.data).context("hash attachment")?;
        let filepath = digest_filepath(&digest);
        self.write_bytes(ctx, &filepath, &req.data).await?;

        let content_type = req
            .content_type
            .unwrap_or_else(|| content_type_for_filename(&req.filename).to_string());
        let attachment = Attachment {
            id: req.id.unwrap_or_else(new_id),
            original_filename: req.filename,
            content_type,
            filepath,
            sha256: AttachmentCreated::encode_digest(&digest),
            size_bytes: req.data.len() as u64,
            created_at: Utc::now(),
        };

        let scope = self.db.in_transaction(ctx, None).await?;
        scope.write(|t| attachments::insert(t, attachment.clone()))?;
        let entry = self.changelog.new_entry(
            REVISION_CREATE,
            &attachment.id,
            AttachmentChange::Created(AttachmentCreated {
                original_filename: attachment.original_filename.clone(),
                content_type: attachment.content_type.clone(),
                filepath: attachment.filepath.clone(),
                sha256: attachment.sha256.clone(),
                size_bytes: attachment.size_bytes,
            }),
        );
        self.changelog.create_entry(&scope, entry)?;

        notify_after_commit(&scope, &self.events, vec![EntityEvent::created(&attachment.id)]);
        scope.commit(ctx).await?;
        tracing::debug!(id = %attachment.id, "created attachment");
        Ok(attachment.id)
    }

    /// Returns an attachment row.
    pub async fn get_attachment(&self, ctx: &Context, id: &str) -> CoreResult<Attachment> {
        ctx.check()?;
        self.db.read(|t| attachments::get(t, id).cloned())
    }

    /// Attachments referenced by a memo.
    pub async fn list_attachments_for_memo(
        &self,
        ctx: &Context,
        memo_id: &str,
    ) -> CoreResult<Vec<Attachment>> {
        ctx.check()?;
        Ok(self.db.read(|t| attachments::list_for_memo(t, memo_id)))
    }

    /// Returns an attachment and its bytes.
    ///
    /// Bytes missing locally are fetched from the remote fallback, if one
    /// is set, and written back so later reads are local.
    #[tracing::instrument(skip_all, fields(id = %id))]
    pub async fn get_attachment_data(
        &self,
        ctx: &Context,
        id: &str,
    ) -> CoreResult<(Attachment, Vec<u8>)> {
        let attachment = self
            .get_attachment(ctx, id)
            .await
            .with_context(|| format!("get attachment {id}"))?;
        let local = self.local_path(&attachment.filepath);

        let read = ctx
            .run(async { self.fs.read(&local).await.map_err(CoreError::from) })
            .await;
        let err = match read {
            Ok(data) => return Ok((attachment, data)),
            Err(e) => e,
        };

        let fallback = self.fallback.read().clone();
        let Some(fallback) = fallback.filter(|_| err.is_not_found()) else {
            return Err(err.context(format!("read attachment {id}")));
        };

        tracing::debug!(filepath = %attachment.filepath, "attachment missing locally, fetching from remote");
        let data = fallback
            .get_attachment_data_by_filepath(ctx, &attachment.filepath)
            .await
            .with_context(|| format!("fetch attachment {id} from remote"))?;
        let digest = self.hasher.sum(&data).context("hash fetched attachment")?;
        if AttachmentCreated::encode_digest(&digest) != attachment.sha256 {
            return Err(CoreError::crypto(format!(
                "fetched bytes of attachment {id} do not match its sha256 digest"
            )));
        }
        self.write_bytes(ctx, &attachment.filepath, &data)
            .await
            .with_context(|| format!("store fetched attachment {id}"))?;
        Ok((attachment, data))
    }

    /// Reads the bytes stored at a digest path, without fallback.
    pub async fn read_by_filepath(&self, ctx: &Context, filepath: &str) -> CoreResult<Vec<u8>> {
        let local = self.local_path(filepath);
        ctx.run(async { self.fs.read(&local).await.map_err(CoreError::from) })
            .await
    }

    /// Recomputes the digest of an attachment's local bytes and compares
    /// it with the recorded one.
    pub async fn verify_attachment(&self, ctx: &Context, id: &str) -> CoreResult<bool> {
        let attachment = self.get_attachment(ctx, id).await?;
        let data = self
            .read_by_filepath(ctx, &attachment.filepath)
            .await
            .with_context(|| format!("verify attachment {id}"))?;
        let digest = self.hasher.sum(&data)?;
        Ok(AttachmentCreated::encode_digest(&digest) == attachment.sha256)
    }

    /// Recomputes the attachment links of a memo from its content.
    pub async fn update_memo_attachments(
        &self,
        ctx: &Context,
        tx: Option<&Transaction>,
        memo_id: &str,
        content: &str,
    ) -> CoreResult<()> {
        let scope = self.db.in_transaction(ctx, tx).await?;
        let ids = attachments::extract_attachment_ids(content);
        let (added, removed) = scope.write(|t| attachments::set_memo_links(t, memo_id, &ids));
        tracing::trace!(memo = memo_id, added, removed, "updated attachment links");
        scope.commit(ctx).await
    }

    /// Applies attachment entries received from other clients.
    ///
    /// Only rows are created; bytes are fetched lazily through the fallback.
    #[tracing::instrument(skip_all, fields(entries = entries.len()))]
    pub async fn apply_changelog_entries(
        &self,
        ctx: &Context,
        tx: Option<&Transaction>,
        entries: &[ChangelogEntry],
    ) -> CoreResult<()> {
        let scope = self.db.in_transaction(ctx, tx).await?;
        let mut events = Vec::with_capacity(entries.len());

        for entry in entries {
            ctx.check()?;
            let ChangelogValue::Attachment(AttachmentChange::Created(created)) = &entry.value else {
                return Err(CoreError::validation(format!(
                    "changelog entry {} targets {}, not attachments",
                    entry.id,
                    entry.target_type()
                )));
            };
            let digest = created.digest().context("decode attachment digest")?;
            let filepath = digest_filepath(&digest);
            if created.filepath != filepath {
                return Err(CoreError::validation(format!(
                    "changelog entry {} stores attachment {} at {}, expected {filepath}",
                    entry.id, entry.target_id, created.filepath
                )));
            }

            let attachment = Attachment {
                id: entry.target_id.clone(),
                original_filename: created.original_filename.clone(),
                content_type: created.content_type.clone(),
                filepath,
                sha256: created.sha256.clone(),
                size_bytes: created.size_bytes,
                created_at: entry.timestamp,
            };
            scope
                .write(|t| attachments::insert(t, attachment))
                .with_context(|| format!("apply changelog entry {} to attachment {}", entry.id, entry.target_id))?;
            events.push(EntityEvent::created(&entry.target_id));
        }

        notify_after_commit(&scope, &self.events, events);
        scope.commit(ctx).await
    }

    async fn write_bytes(&self, ctx: &Context, filepath: &str, data: &[u8]) -> CoreResult<()> {
        let local = path::normalize(&self.local_path(filepath))?;
        ctx.run(async {
            if self.fs.exists(&local).await? {
                tracing::trace!(path = %local, "attachment bytes already stored");
                return Ok(());
            }
            if let Some(parent) = path::parent(&local) {
                self.fs.mkdirp(parent).await?;
            }
            self.fs.write(&local, data).await?;
            Ok::<_, CoreError>(())
        })
        .await
        .with_context(|| format!("write attachment {filepath}"))
    }

    fn local_path(&self, filepath: &str) -> String {
        path::join(&self.db.config().attachments_root, filepath)
    }
}

impl std::fmt::Debug for AttachmentController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentController")
            .field("root", &self.db.config().attachments_root)
            .field("fallback", &self.has_fallback())
            .finish()
    }
}

/// Returns the digest path for `digest`: `/aa/bb/...`, one segment per byte.
pub fn digest_filepath(digest: &[u8; 32]) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(digest.len() * 3);
    for b in digest {
        let _ = write!(out, "/{b:02x}");
    }
    out
}

/// Guesses a MIME type from a filename's extension.
pub fn content_type_for_filename(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "avif" => "image/avif",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        "ico" => "image/vnd.microsoft.icon",
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "svg" => "image/svg+xml",
        "tif" | "tiff" => "image/tiff",
        "webp" => "image/webp",
        "aac" => "audio/aac",
        "mp3" => "audio/mpeg",
        "oga" => "audio/ogg",
        "opus" => "audio/opus",
        "wav" => "audio/wav",
        "weba" => "audio/webm",
        "mp4" => "video/mp4",
        "mpeg" => "video/mpeg",
        "ogv" => "video/ogg",
        "webm" => "video/webm",
        "css" => "text/css",
        "csv" => "text/csv",
        "htm" | "html" => "text/html",
        "ics" => "text/calendar",
        "md" => "text/markdown",
        "txt" => "text/plain",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "7z" => "application/x-7z-compressed",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "odt" => "application/vnd.oasis.opendocument.text",
        "rtf" => "application/rtf",
        "xml" => "application/xml",
        _ => "application/octet-stream",
    }
}
