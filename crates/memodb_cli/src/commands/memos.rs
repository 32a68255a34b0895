//! Memo and tag commands.

use super::{line, preview, write_json, OutputFormat};
use crate::error::CliResult;
use crate::session::Session;
use clap::Subcommand;
use memodb_core::{CreateMemo, ListMemosQuery, Pagination, UpdateMemoContent};
use std::io::Write;

/// Memo subcommands.
#[derive(Debug, Subcommand)]
pub enum MemoCommand {
    /// List memos, newest first
    List {
        /// Only memos with this tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Full-text search; every word must match
        #[arg(short, long)]
        query: Option<String>,

        /// List archived memos instead of active ones
        #[arg(long)]
        archived: bool,

        /// List deleted memos instead of live ones
        #[arg(long)]
        deleted: bool,

        /// Maximum number of memos
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show one memo with its attachments
    Show {
        /// Memo id
        id: String,
    },

    /// Create a memo
    Create {
        /// Markdown content
        content: String,
    },

    /// Replace a memo's content
    Edit {
        /// Memo id
        id: String,
        /// New markdown content
        content: String,
    },

    /// Archive a memo
    Archive {
        /// Memo id
        id: String,
        /// Unarchive instead
        #[arg(long)]
        undo: bool,
    },

    /// Mark a memo deleted
    Delete {
        /// Memo id
        id: String,
    },

    /// Clear a memo's delete flag
    Restore {
        /// Memo id
        id: String,
    },

    /// Permanently remove memos deleted longer than the retention period
    Cleanup,
}

/// Runs a memo subcommand.
pub async fn run(
    session: &Session,
    command: MemoCommand,
    format: OutputFormat,
    out: &mut dyn Write,
) -> CliResult<()> {
    let ctx = &session.ctx;
    let memos = &session.memos;

    match command {
        MemoCommand::List {
            tag,
            query,
            archived,
            deleted,
            limit,
        } => {
            let filter = ListMemosQuery {
                tag,
                query,
                is_archived: Some(archived),
                is_deleted: Some(deleted),
                ..Default::default()
            };
            let page = memos
                .list_memos(ctx, &filter, &Pagination::first(limit))
                .await?;
            match format {
                OutputFormat::Json => write_json(out, &page.items)?,
                OutputFormat::Text => {
                    for memo in &page.items {
                        line(
                            out,
                            &format!(
                                "{}  {}  {}",
                                memo.id,
                                memo.created_at.format("%Y-%m-%d %H:%M"),
                                preview(&memo.content, 60)
                            ),
                        )?;
                    }
                    if page.next.is_some() {
                        line(out, "(more)")?;
                    }
                }
            }
        }
        MemoCommand::Show { id } => {
            let memo = memos.get_memo(ctx, &id).await?;
            let attachments = session
                .attachments
                .list_attachments_for_memo(ctx, &id)
                .await?;
            match format {
                OutputFormat::Json => write_json(
                    out,
                    &serde_json::json!({ "memo": memo, "attachments": attachments }),
                )?,
                OutputFormat::Text => {
                    line(out, &format!("id:       {}", memo.id))?;
                    line(out, &format!("created:  {}", memo.created_at.to_rfc3339()))?;
                    line(out, &format!("updated:  {}", memo.updated_at.to_rfc3339()))?;
                    line(out, &format!("archived: {}", memo.is_archived))?;
                    line(out, &format!("deleted:  {}", memo.is_deleted))?;
                    for a in &attachments {
                        line(out, &format!("attachment: {} {} ({} bytes)", a.id, a.original_filename, a.size_bytes))?;
                    }
                    line(out, "")?;
                    line(out, &memo.content)?;
                }
            }
        }
        MemoCommand::Create { content } => {
            let memo = memos.create_memo(ctx, CreateMemo::new(content)).await?;
            tracing::info!(id = %memo.id, "memo created");
            line(out, &memo.id)?;
        }
        MemoCommand::Edit { id, content } => {
            memos
                .update_memo_content(ctx, UpdateMemoContent::new(&id, content))
                .await?;
            tracing::info!(%id, "memo updated");
        }
        MemoCommand::Archive { id, undo } => {
            memos.update_memo_archive_status(ctx, &id, !undo).await?;
        }
        MemoCommand::Delete { id } => memos.delete_memo(ctx, &id).await?,
        MemoCommand::Restore { id } => memos.undelete_memo(ctx, &id).await?,
        MemoCommand::Cleanup => {
            let removed = memos.cleanup_deleted_memos(ctx).await?;
            tracing::info!(removed, "cleaned up deleted memos");
            line(out, &format!("removed {removed} memos"))?;
        }
    }
    Ok(())
}

/// Lists tags with their memo counts.
pub async fn tags(
    session: &Session,
    limit: usize,
    format: OutputFormat,
    out: &mut dyn Write,
) -> CliResult<()> {
    let page = session.memos.list_tags(&session.ctx, limit, None).await?;
    match format {
        OutputFormat::Json => write_json(out, &page.items),
        OutputFormat::Text => {
            for tag in &page.items {
                line(out, &format!("#{}  {}", tag.tag, tag.count))?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{session, text};

    #[tokio::test]
    async fn create_list_and_tags() {
        let (_dir, s) = session().await;
        let mut out = Vec::new();
        run(&s, MemoCommand::Create { content: "first #cli".into() }, OutputFormat::Text, &mut out)
            .await
            .unwrap();
        let id = text(&out).trim().to_string();

        let mut out = Vec::new();
        let list = MemoCommand::List {
            tag: Some("cli".into()),
            query: None,
            archived: false,
            deleted: false,
            limit: 20,
        };
        run(&s, list, OutputFormat::Text, &mut out).await.unwrap();
        let listed = text(&out);
        assert!(listed.starts_with(&id));
        assert!(listed.contains("first #cli"));

        let mut out = Vec::new();
        tags(&s, 10, OutputFormat::Text, &mut out).await.unwrap();
        assert_eq!(text(&out), "#cli  1\n");
    }

    #[tokio::test]
    async fn edit_archive_delete() {
        let (_dir, s) = session().await;
        let memo = s
            .memos
            .create_memo(&s.ctx, CreateMemo::new("draft #a"))
            .await
            .unwrap();
        let mut sink = Vec::new();

        run(
            &s,
            MemoCommand::Edit {
                id: memo.id.clone(),
                content: "final #b".into(),
            },
            OutputFormat::Text,
            &mut sink,
        )
        .await
        .unwrap();
        run(&s, MemoCommand::Archive { id: memo.id.clone(), undo: false }, OutputFormat::Text, &mut sink)
            .await
            .unwrap();

        let stored = s.memos.get_memo(&s.ctx, &memo.id).await.unwrap();
        assert_eq!(stored.content, "final #b");
        assert!(stored.is_archived);

        run(&s, MemoCommand::Delete { id: memo.id.clone() }, OutputFormat::Text, &mut sink)
            .await
            .unwrap();
        let mut out = Vec::new();
        tags(&s, 10, OutputFormat::Json, &mut out).await.unwrap();
        let tags: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(tags, serde_json::json!([]));
    }

    #[tokio::test]
    async fn show_missing_memo_fails() {
        let (_dir, s) = session().await;
        let err = run(&s, MemoCommand::Show { id: "nope".into() }, OutputFormat::Text, &mut Vec::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }
}
