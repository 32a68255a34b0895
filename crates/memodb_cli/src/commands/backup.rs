//! Database export and import.

use super::line;
use crate::error::{CliError, CliResult};
use crate::session::Session;
use std::io::Write;
use std::path::Path;

/// Writes a snapshot of the whole database to `output`.
pub async fn export(session: &Session, output: &Path, out: &mut dyn Write) -> CliResult<()> {
    let bytes = session.db.export(&session.ctx).await?;
    std::fs::write(output, &bytes).map_err(|e| CliError::io(output.display().to_string(), e))?;
    tracing::info!(path = %output.display(), bytes = bytes.len(), "database exported");
    line(out, &format!("exported {} bytes", bytes.len()))
}

/// Replaces the database with the snapshot in `input`.
///
/// The snapshot is validated before anything is replaced.
pub async fn import(session: &Session, input: &Path, out: &mut dyn Write) -> CliResult<()> {
    let bytes = std::fs::read(input).map_err(|e| CliError::io(input.display().to_string(), e))?;
    session.db.import(&session.ctx, &bytes).await?;
    let stats = session.db.table_stats();
    line(
        out,
        &format!(
            "imported {} memos and {} changelog entries",
            stats.memos, stats.changelog_entries
        ),
    )
}
