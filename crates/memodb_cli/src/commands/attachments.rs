//! Attachment commands.

use super::{line, write_json, OutputFormat};
use crate::error::{CliError, CliResult};
use crate::session::Session;
use clap::Subcommand;
use memodb_core::CreateAttachment;
use std::io::Write;
use std::path::PathBuf;

/// Attachment subcommands.
#[derive(Debug, Subcommand)]
pub enum AttachmentCommand {
    /// Store a file as an attachment and print its id
    Add {
        /// File to store
        file: PathBuf,

        /// MIME type; guessed from the file extension when absent
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Show attachment metadata
    Show {
        /// Attachment id
        id: String,
    },

    /// Write attachment bytes to a file
    Get {
        /// Attachment id
        id: String,
        /// Output file
        output: PathBuf,
    },

    /// Check stored bytes against the recorded digest
    Verify {
        /// Attachment id
        id: String,
    },
}

/// Runs an attachment subcommand.
pub async fn run(
    session: &Session,
    command: AttachmentCommand,
    format: OutputFormat,
    out: &mut dyn Write,
) -> CliResult<()> {
    let ctx = &session.ctx;
    let attachments = &session.attachments;

    match command {
        AttachmentCommand::Add { file, content_type } => {
            let data =
                std::fs::read(&file).map_err(|e| CliError::io(file.display().to_string(), e))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| CliError::Usage(format!("{} is not a file", file.display())))?;

            let mut req = CreateAttachment::new(filename, data);
            if let Some(content_type) = content_type {
                req = req.with_content_type(content_type);
            }
            let id = attachments.create_attachment(ctx, req).await?;
            line(out, &id)
        }
        AttachmentCommand::Show { id } => {
            let attachment = attachments.get_attachment(ctx, &id).await?;
            match format {
                OutputFormat::Json => write_json(out, &attachment),
                OutputFormat::Text => {
                    line(out, &format!("id:       {}", attachment.id))?;
                    line(out, &format!("filename: {}", attachment.original_filename))?;
                    line(out, &format!("type:     {}", attachment.content_type))?;
                    line(out, &format!("size:     {}", attachment.size_bytes))?;
                    line(out, &format!("sha256:   {}", attachment.sha256))?;
                    line(out, &format!("path:     {}", attachment.filepath))
                }
            }
        }
        AttachmentCommand::Get { id, output } => {
            let (_, data) = attachments.get_attachment_data(ctx, &id).await?;
            std::fs::write(&output, &data)
                .map_err(|e| CliError::io(output.display().to_string(), e))?;
            tracing::info!(%id, bytes = data.len(), "attachment written");
            Ok(())
        }
        AttachmentCommand::Verify { id } => {
            if attachments.verify_attachment(ctx, &id).await? {
                line(out, "ok")
            } else {
                Err(CliError::Verification(format!(
                    "attachment {id} does not match its digest"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{session, text};

    #[tokio::test]
    async fn add_get_verify() {
        let (dir, s) = session().await;
        let input = dir.path().join("photo.png");
        std::fs::write(&input, b"\x89PNG fake").unwrap();

        let mut out = Vec::new();
        let add = AttachmentCommand::Add {
            file: input,
            content_type: None,
        };
        run(&s, add, OutputFormat::Text, &mut out).await.unwrap();
        let id = text(&out).trim().to_string();

        let attachment = s.attachments.get_attachment(&s.ctx, &id).await.unwrap();
        assert_eq!(attachment.content_type, "image/png");
        assert_eq!(attachment.original_filename, "photo.png");

        let output = dir.path().join("copy.png");
        let get = AttachmentCommand::Get {
            id: id.clone(),
            output: output.clone(),
        };
        run(&s, get, OutputFormat::Text, &mut Vec::new()).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"\x89PNG fake");

        let mut out = Vec::new();
        run(&s, AttachmentCommand::Verify { id }, OutputFormat::Text, &mut out)
            .await
            .unwrap();
        assert_eq!(text(&out), "ok\n");
    }

    #[tokio::test]
    async fn missing_input_file() {
        let (dir, s) = session().await;
        let add = AttachmentCommand::Add {
            file: dir.path().join("absent.txt"),
            content_type: None,
        };
        let err = run(&s, add, OutputFormat::Text, &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Io { .. }));
    }
}
