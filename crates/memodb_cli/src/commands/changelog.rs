//! Changelog listing.

use super::{line, write_json, OutputFormat};
use crate::error::CliResult;
use crate::session::Session;
use memodb_core::EntryFilter;
use memodb_sync_protocol::ChangelogEntry;
use std::io::Write;

/// Which entries to list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangelogArgs {
    /// Only entries not yet uploaded.
    pub unsynced: bool,
    /// Only entries not yet applied.
    pub unapplied: bool,
    /// Only entries for this target id (all of them, in order).
    pub target: Option<String>,
    /// Maximum number of entries.
    pub limit: usize,
}

/// Runs the changelog command.
pub fn run(
    session: &Session,
    args: ChangelogArgs,
    format: OutputFormat,
    out: &mut dyn Write,
) -> CliResult<()> {
    let entries = match &args.target {
        Some(target) => session.changelog.list_for_target(None, target),
        None => {
            let filter = match (args.unsynced, args.unapplied) {
                (true, _) => EntryFilter::Unsynced,
                (false, true) => EntryFilter::Unapplied,
                (false, false) => EntryFilter::All,
            };
            session.changelog.list(None, filter, args.limit, None).items
        }
    };

    match format {
        OutputFormat::Json => write_json(out, &entries),
        OutputFormat::Text => {
            for entry in &entries {
                line(out, &describe(entry))?;
            }
            line(
                out,
                &format!("{} of {} entries", entries.len(), session.changelog.count(None)),
            )
        }
    }
}

fn describe(entry: &ChangelogEntry) -> String {
    let flags = format!(
        "{}{}",
        if entry.is_synced { 'S' } else { '-' },
        if entry.is_applied { 'A' } else { '-' }
    );
    format!(
        "{}  {}  {}  {}/{}  rev={}  {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
        flags,
        entry.id,
        entry.target_type(),
        entry.target_id,
        entry.revision,
        entry.source
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{session, text};
    use memodb_core::{CreateMemo, UpdateMemoContent};

    #[tokio::test]
    async fn lists_entries_with_flags() {
        let (_dir, s) = session().await;
        let memo = s
            .memos
            .create_memo(&s.ctx, CreateMemo::new("one"))
            .await
            .unwrap();
        s.memos
            .update_memo_content(&s.ctx, UpdateMemoContent::new(&memo.id, "one two"))
            .await
            .unwrap();
        s.settings
            .update_setting(&s.ctx, "theme.mode", serde_json::json!("dark"))
            .await
            .unwrap();

        let mut out = Vec::new();
        let args = ChangelogArgs {
            limit: 50,
            ..Default::default()
        };
        run(&s, args, OutputFormat::Text, &mut out).unwrap();
        let listed = text(&out);
        assert_eq!(listed.lines().count(), 4);
        assert!(listed.contains(&format!("memos/{}  rev=1  local", memo.id)));
        assert!(listed.contains("-A"));
        assert!(listed.ends_with("3 of 3 entries\n"));

        let mut out = Vec::new();
        let args = ChangelogArgs {
            target: Some(memo.id.clone()),
            ..Default::default()
        };
        run(&s, args, OutputFormat::Json, &mut out).unwrap();
        let entries: Vec<serde_json::Value> = serde_json::from_slice(&out).unwrap();
        assert_eq!(entries.len(), 2);
    }
}
