//! Inspect command implementation.

use super::{line, write_json, OutputFormat};
use crate::error::CliResult;
use crate::session::{Session, DB_FILE};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Data directory.
    pub path: String,
    /// Size of the snapshot file in bytes.
    pub snapshot_size: u64,
    /// Memos, including deleted ones.
    pub memos: usize,
    /// Distinct tags.
    pub tags: usize,
    /// Attachment rows.
    pub attachments: usize,
    /// Stored settings.
    pub settings: usize,
    /// Changelog entries.
    pub changelog_entries: usize,
    /// Entries not yet uploaded.
    pub unsynced_entries: usize,
    /// Entries not yet applied.
    pub unapplied_entries: usize,
    /// Sync settings, when sync is set up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncSummary>,
}

/// Stored sync settings.
#[derive(Debug, Serialize)]
pub struct SyncSummary {
    /// Whether sync is enabled.
    pub enabled: bool,
    /// Server URL.
    pub server: String,
    /// Account name.
    pub username: String,
    /// This client's id.
    pub client_id: String,
    /// Start of the last successful cycle.
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Runs the inspect command.
pub fn run(
    session: &Session,
    dir: &Path,
    format: OutputFormat,
    out: &mut dyn Write,
) -> CliResult<()> {
    let stats = session.db.table_stats();
    let snapshot = dir.join(DB_FILE.trim_start_matches('/'));
    let result = InspectResult {
        path: dir.display().to_string(),
        snapshot_size: std::fs::metadata(&snapshot).map(|m| m.len()).unwrap_or(0),
        memos: stats.memos,
        tags: stats.tags,
        attachments: stats.attachments,
        settings: stats.settings,
        changelog_entries: stats.changelog_entries,
        unsynced_entries: stats.unsynced_entries,
        unapplied_entries: stats.unapplied_entries,
        sync: session.sync_info.as_ref().map(|info| SyncSummary {
            enabled: info.is_enabled,
            server: info.server.clone(),
            username: info.username.clone(),
            client_id: info.client_id.clone(),
            last_synced_at: info.last_synced_at,
        }),
    };

    match format {
        OutputFormat::Json => write_json(out, &result),
        OutputFormat::Text => print_text_output(&result, out),
    }
}

fn print_text_output(result: &InspectResult, out: &mut dyn Write) -> CliResult<()> {
    line(out, &format!("memodb at {}", result.path))?;
    line(out, &format!("  snapshot:  {} bytes", result.snapshot_size))?;
    line(out, &format!("  memos:     {}", result.memos))?;
    line(out, &format!("  tags:      {}", result.tags))?;
    line(out, &format!("  attachments: {}", result.attachments))?;
    line(out, &format!("  settings:  {}", result.settings))?;
    line(
        out,
        &format!(
            "  changelog: {} entries ({} unsynced, {} unapplied)",
            result.changelog_entries, result.unsynced_entries, result.unapplied_entries
        ),
    )?;
    match &result.sync {
        Some(sync) => {
            let last = sync
                .last_synced_at
                .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
            line(
                out,
                &format!(
                    "  sync:      {} as {}@{} (client {}), last synced {}",
                    if sync.enabled { "enabled" } else { "disabled" },
                    sync.username,
                    sync.server,
                    sync.client_id,
                    last
                ),
            )
        }
        None => line(out, "  sync:      not set up"),
    }
}
