//! Applying entries received from other clients.

use super::{AttachmentController, MemoController, SettingsController};
use crate::changelog::ChangelogStore;
use crate::context::Context;
use crate::db::Transaction;
use crate::error::{CoreResult, ResultExt};
use memodb_sync_protocol::{ChangelogEntry, TargetType};

/// The controllers that apply entries of each target type.
#[derive(Clone, Copy)]
pub struct Appliers<'a> {
    /// Applies memo entries.
    pub memos: &'a MemoController,
    /// Applies attachment entries.
    pub attachments: &'a AttachmentController,
    /// Applies settings entries.
    pub settings: &'a SettingsController,
}

impl Appliers<'_> {
    async fn apply(
        &self,
        ctx: &Context,
        tx: &Transaction,
        target: TargetType,
        entries: &[ChangelogEntry],
    ) -> CoreResult<()> {
        match target {
            TargetType::Attachments => {
                self.attachments
                    .apply_changelog_entries(ctx, Some(tx), entries)
                    .await
            }
            TargetType::Memos => {
                self.memos
                    .apply_changelog_entries(ctx, Some(tx), entries)
                    .await
            }
            TargetType::Settings => {
                self.settings
                    .apply_changelog_entries(ctx, Some(tx), entries)
                    .await
            }
        }
    }
}

/// Applies every unapplied entry of `changelog` inside `tx` and marks it
/// applied.
///
/// Entries are read in pages of `page_size`. Within a page they are applied
/// grouped by target type in [`TargetType::ALL`] order, so attachment rows
/// exist before the memos that link them. Returns the number of entries
/// marked applied.
pub async fn apply_unapplied(
    ctx: &Context,
    tx: &Transaction,
    changelog: &ChangelogStore,
    appliers: Appliers<'_>,
    page_size: usize,
) -> CoreResult<usize> {
    let mut applied = 0;
    let mut after = None;

    loop {
        ctx.check()?;
        let page = changelog.list_unapplied(Some(tx), page_size, after);
        if page.items.is_empty() {
            break;
        }

        for target in TargetType::ALL {
            let group: Vec<ChangelogEntry> = page
                .items
                .iter()
                .filter(|e| e.target_type() == target)
                .cloned()
                .collect();
            if group.is_empty() {
                continue;
            }
            appliers
                .apply(ctx, tx, target, &group)
                .await
                .with_context(|| format!("apply {} {target} entries", group.len()))?;
        }

        let ids: Vec<String> = page.items.iter().map(|e| e.id.clone()).collect();
        applied += changelog.mark_applied(tx, &ids);
        tracing::debug!(entries = ids.len(), "applied changelog page");

        match page.next {
            Some(next) => after = Some(next),
            None => break,
        }
    }

    Ok(applied)
}
