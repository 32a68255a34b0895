//! Settings commands.

use super::{line, write_json, OutputFormat};
use crate::error::CliResult;
use crate::session::Session;
use clap::Subcommand;
use serde_json::Value;
use std::io::Write;

/// Settings subcommands.
#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Print one setting, or all of them merged with the defaults
    Get {
        /// Dotted key, e.g. `theme.mode`
        key: Option<String>,
    },

    /// Store a setting
    Set {
        /// Dotted key, e.g. `theme.mode`
        key: String,
        /// JSON value; anything that is not valid JSON is stored as a string
        value: String,
    },
}

/// Runs a settings subcommand.
pub async fn run(
    session: &Session,
    command: SettingsCommand,
    format: OutputFormat,
    out: &mut dyn Write,
) -> CliResult<()> {
    match command {
        SettingsCommand::Get { key } => {
            let value = match key {
                Some(key) => session.settings.get_setting(&session.ctx, &key).await?,
                None => session.settings.load_settings(&session.ctx).await?,
            };
            match (format, &value) {
                (OutputFormat::Text, Value::String(s)) => line(out, s),
                _ => write_json(out, &value),
            }
        }
        SettingsCommand::Set { key, value } => {
            let value = parse_value(&value);
            session
                .settings
                .update_setting(&session.ctx, &key, value)
                .await?;
            tracing::info!(%key, "setting updated");
            Ok(())
        }
    }
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{session, text};

    #[test]
    fn values_fall_back_to_strings() {
        assert_eq!(parse_value("true"), Value::Bool(true));
        assert_eq!(parse_value("12"), serde_json::json!(12));
        assert_eq!(parse_value("dark"), Value::String("dark".into()));
        assert_eq!(parse_value("\"dark\""), Value::String("dark".into()));
    }

    #[tokio::test]
    async fn set_then_get() {
        let (_dir, s) = session().await;
        let set = SettingsCommand::Set {
            key: "theme.mode".into(),
            value: "dark".into(),
        };
        run(&s, set, OutputFormat::Text, &mut Vec::new()).await.unwrap();

        let mut out = Vec::new();
        let get = SettingsCommand::Get {
            key: Some("theme.mode".into()),
        };
        run(&s, get, OutputFormat::Text, &mut out).await.unwrap();
        assert_eq!(text(&out), "dark\n");

        let mut out = Vec::new();
        run(&s, SettingsCommand::Get { key: None }, OutputFormat::Json, &mut out)
            .await
            .unwrap();
        let all: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(all["theme"]["mode"], "dark");
    }
}
