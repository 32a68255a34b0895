//! memodb CLI
//!
//! Command-line tools for a memodb data directory.
//!
//! # Commands
//!
//! - `inspect` - Display table counts and sync settings
//! - `memos` - List, show, create and edit memos
//! - `tags` - List tags with memo counts
//! - `changelog` - List changelog entries
//! - `settings` - Read and write settings
//! - `attachments` - Store, read and verify attachments
//! - `export` / `import` - Copy the whole database to or from a file

mod commands;
mod error;
mod session;

use clap::{Parser, Subcommand};
use commands::attachments::AttachmentCommand;
use commands::changelog::ChangelogArgs;
use commands::memos::MemoCommand;
use commands::settings::SettingsCommand;
use commands::OutputFormat;
use session::Session;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// memodb command-line tools.
#[derive(Parser)]
#[command(name = "memodb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display table counts and sync settings
    Inspect,

    /// Work with memos
    Memos {
        #[command(subcommand)]
        command: MemoCommand,
    },

    /// List tags with their memo counts
    Tags {
        /// Maximum number of tags
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },

    /// List changelog entries
    Changelog {
        /// Only entries not yet uploaded
        #[arg(long)]
        unsynced: bool,

        /// Only entries not yet applied
        #[arg(long)]
        unapplied: bool,

        /// Only entries for this memo, attachment or setting
        #[arg(short, long)]
        target: Option<String>,

        /// Maximum number of entries
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Read and write settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },

    /// Store and read attachments
    Attachments {
        #[command(subcommand)]
        command: AttachmentCommand,
    },

    /// Write a snapshot of the database to a file
    Export {
        /// Output file
        output: PathBuf,
    },

    /// Replace the database with a snapshot file
    Import {
        /// Snapshot file
        input: PathBuf,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("memodb CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("memodb core v{}", memodb_core::VERSION);
        return Ok(());
    }

    let path = cli.path.ok_or("Data directory required (--path)")?;
    let session = Session::open(&path).await?;
    let stdout = std::io::stdout();
    let out = &mut stdout.lock();
    let format = cli.format;

    match cli.command {
        Commands::Inspect => commands::inspect::run(&session, &path, format, out)?,
        Commands::Memos { command } => commands::memos::run(&session, command, format, out).await?,
        Commands::Tags { limit } => commands::memos::tags(&session, limit, format, out).await?,
        Commands::Changelog {
            unsynced,
            unapplied,
            target,
            limit,
        } => {
            let args = ChangelogArgs {
                unsynced,
                unapplied,
                target,
                limit,
            };
            commands::changelog::run(&session, args, format, out)?;
        }
        Commands::Settings { command } => {
            commands::settings::run(&session, command, format, out).await?;
        }
        Commands::Attachments { command } => {
            commands::attachments::run(&session, command, format, out).await?;
        }
        Commands::Export { output } => commands::backup::export(&session, &output, out).await?,
        Commands::Import { input } => commands::backup::import(&session, &input, out).await?,
        Commands::Version => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_nested_commands() {
        let cli = Cli::try_parse_from([
            "memodb", "--path", "/tmp/notes", "--format", "json", "memos", "list", "--tag", "todo",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(
            cli.command,
            Commands::Memos {
                command: MemoCommand::List { tag: Some(ref t), .. }
            } if t == "todo"
        ));
    }
}
