//! CLI command implementations.

pub mod attachments;
pub mod backup;
pub mod changelog;
pub mod inspect;
pub mod memos;
pub mod settings;

use crate::error::{CliError, CliResult};
use serde::Serialize;
use std::io::Write;

/// How a command prints its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Writes `value` as pretty JSON followed by a newline.
pub fn write_json<T: Serialize>(out: &mut dyn Write, value: &T) -> CliResult<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    line(out, "")
}

/// Writes one line of text.
pub fn line(out: &mut dyn Write, text: &str) -> CliResult<()> {
    writeln!(out, "{text}").map_err(|e| CliError::io("stdout", e))
}

/// First line of `content`, cut to `width` characters.
pub fn preview(content: &str, width: usize) -> String {
    let first = content.lines().next().unwrap_or("");
    if first.chars().count() <= width {
        return first.to_string();
    }
    let mut cut: String = first.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_cuts_long_lines() {
        assert_eq!(preview("short\nsecond", 10), "short");
        assert_eq!(preview("abcdefghij", 5), "abcd…");
        assert_eq!(preview("", 5), "");
    }
}
