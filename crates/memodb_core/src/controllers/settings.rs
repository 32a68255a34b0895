//! Settings controller.
//!
//! Settings are stored flat, one row per dotted key path such as
//! `theme.mode`, and loaded as one nested JSON document with the defaults
//! filled in.

use super::notify_after_commit;
use crate::changelog::ChangelogStore;
use crate::context::Context;
use crate::db::{Database, Transaction};
use crate::error::{CoreError, CoreResult, ResultExt};
use crate::events::{EntityEvent, EventRegistry};
use crate::repo::settings;
use memodb_sync_protocol::{ChangelogEntry, ChangelogValue, SettingChange, REVISION_UPDATE};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// The settings document before anything is stored.
pub fn default_settings() -> Value {
    json!({
        "locale": {
            "language": "en",
            "region": "US",
        },
        "theme": {
            "colourScheme": "default",
            "mode": "auto",
            "icon": "default",
            "fontSans": "Atkinson Hyperlegible",
            "fontMono": "Fira Code",
        },
        "controls": {
            "vim": false,
            "doubleClickToEdit": true,
        },
    })
}

/// Loads and updates settings and applies settings entries.
#[derive(Clone)]
pub struct SettingsController {
    db: Database,
    changelog: ChangelogStore,
    events: Arc<EventRegistry>,
}

impl SettingsController {
    /// Creates a controller writing to `changelog`'s database.
    pub fn new(changelog: ChangelogStore) -> Self {
        Self {
            db: changelog.database().clone(),
            changelog,
            events: Arc::new(EventRegistry::new("settings")),
        }
    }

    /// Observer registry for settings events. Event ids are key paths.
    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    /// Subscribes to settings events.
    pub fn subscribe(&self) -> UnboundedReceiver<EntityEvent> {
        self.events.subscribe()
    }

    /// Returns the defaults overlaid with every stored setting.
    pub async fn load_settings(&self, ctx: &Context) -> CoreResult<Value> {
        ctx.check()?;
        let mut doc = default_settings();
        self.db.read(|t| {
            for (key, value) in settings::all(t) {
                set_path(&mut doc, key, value.clone());
            }
        });
        Ok(doc)
    }

    /// Returns the value at `key`, stored or default.
    pub async fn get_setting(&self, ctx: &Context, key: &str) -> CoreResult<Value> {
        ctx.check()?;
        if let Some(value) = self.db.read(|t| settings::get(t, key).cloned()) {
            return Ok(value);
        }
        get_path(&default_settings(), key)
            .cloned()
            .ok_or_else(|| CoreError::not_found("setting", key))
    }

    /// Stores `value` under `key` and records the change.
    #[tracing::instrument(skip_all, fields(key = %key))]
    pub async fn update_setting(&self, ctx: &Context, key: &str, value: Value) -> CoreResult<()> {
        validate_key(key)?;
        let scope = self.db.in_transaction(ctx, None).await?;
        scope.write(|t| settings::set(t, key, value.clone()));

        let entry = self
            .changelog
            .new_entry(REVISION_UPDATE, key, SettingChange::Value(value));
        self.changelog.create_entry(&scope, entry)?;

        notify_after_commit(&scope, &self.events, vec![EntityEvent::changed(key)]);
        scope.commit(ctx).await
    }

    /// Applies settings entries received from other clients. The last entry
    /// for a key wins.
    #[tracing::instrument(skip_all, fields(entries = entries.len()))]
    pub async fn apply_changelog_entries(
        &self,
        ctx: &Context,
        tx: Option<&Transaction>,
        entries: &[ChangelogEntry],
    ) -> CoreResult<()> {
        let scope = self.db.in_transaction(ctx, tx).await?;
        let mut events = Vec::with_capacity(entries.len());

        for entry in entries {
            let ChangelogValue::Setting(SettingChange::Value(value)) = &entry.value else {
                return Err(CoreError::validation(format!(
                    "changelog entry {} targets {}, not settings",
                    entry.id,
                    entry.target_type()
                )));
            };
            validate_key(&entry.target_id)
                .with_context(|| format!("apply changelog entry {}", entry.id))?;
            scope.write(|t| settings::set(t, &entry.target_id, value.clone()));
            events.push(EntityEvent::changed(&entry.target_id));
        }

        notify_after_commit(&scope, &self.events, events);
        scope.commit(ctx).await
    }
}

impl std::fmt::Debug for SettingsController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsController")
            .field("events", &self.events)
            .finish()
    }
}

fn validate_key(key: &str) -> CoreResult<()> {
    if key.is_empty() || key.split('.').any(str::is_empty) {
        return Err(CoreError::validation(format!("invalid setting key {key:?}")));
    }
    Ok(())
}

fn get_path<'a>(doc: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(doc, |node, segment| node.get(segment))
}

/// Sets `value` at a dotted path, replacing non-object nodes on the way.
fn set_path(doc: &mut Value, key: &str, value: Value) {
    if !doc.is_object() {
        *doc = Value::Object(Map::new());
    }
    let Value::Object(map) = doc else {
        return;
    };
    match key.split_once('.') {
        None => {
            map.insert(key.to_string(), value);
        }
        Some((head, rest)) => {
            let child = map.entry(head.to_string()).or_insert(Value::Null);
            set_path(child, rest, value);
        }
    }
}
