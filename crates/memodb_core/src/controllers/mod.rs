//! Entity controllers.
//!
//! Controllers are the write path of the database. Every mutation runs in
//! one transaction that holds both the repository change and the changelog
//! entry recording it, and every controller can apply entries received from
//! other clients. Observers are notified once the transaction commits.

mod apply;
mod attachment;
mod memo;
mod settings;

pub use apply::{apply_unapplied, Appliers};
pub use attachment::{
    content_type_for_filename, digest_filepath, AttachmentController, AttachmentFallback,
    CreateAttachment,
};
pub use memo::{CreateMemo, MemoController, UpdateMemoContent};
pub use settings::{default_settings, SettingsController};

use crate::db::Transaction;
use crate::events::{EntityEvent, EventRegistry};
use std::sync::Arc;

/// Queues `events` for delivery once `tx` commits.
pub(crate) fn notify_after_commit(
    tx: &Transaction,
    registry: &Arc<EventRegistry>,
    events: Vec<EntityEvent>,
) {
    if events.is_empty() {
        return;
    }
    let registry = Arc::clone(registry);
    tx.after_commit(move || registry.emit_all(events));
}
