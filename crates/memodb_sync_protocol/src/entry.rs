//! Changelog entries.

use crate::error::{ProtocolError, ProtocolResult};
use crate::value::ChangelogValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Revision of an entry that creates its target.
pub const REVISION_CREATE: i64 = 1;
/// Revision of an entry that partially updates its target.
pub const REVISION_UPDATE: i64 = 0;

/// The kind of entity a changelog entry targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    /// Memos.
    Memos,
    /// Attachments.
    Attachments,
    /// Settings.
    Settings,
}

impl TargetType {
    /// All target types, in the order the apply pass dispatches them.
    pub const ALL: [TargetType; 3] = [
        TargetType::Attachments,
        TargetType::Memos,
        TargetType::Settings,
    ];

    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Memos => "memos",
            TargetType::Attachments => "attachments",
            TargetType::Settings => "settings",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memos" => Ok(TargetType::Memos),
            "attachments" => Ok(TargetType::Attachments),
            "settings" => Ok(TargetType::Settings),
            other => Err(ProtocolError::validation(format!(
                "unknown target type {other:?}"
            ))),
        }
    }
}

/// An immutable record describing one mutation of one entity.
///
/// Only `is_synced` and `is_applied` ever change after creation. The target
/// type is implied by the variant of `value`, so an entry can never carry a
/// payload that doesn't match its target.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawChangelogEntry")]
pub struct ChangelogEntry {
    /// Globally unique id.
    pub id: String,
    /// Name of the client that produced the entry.
    pub source: String,
    /// `1` for creations, anything else for partial updates.
    pub revision: i64,
    /// Memo id, attachment id or settings key.
    pub target_id: String,
    /// Typed payload.
    pub value: ChangelogValue,
    /// Whether the entry has reached the sync server.
    pub is_synced: bool,
    /// Whether the entry's effect is materialized locally.
    pub is_applied: bool,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl ChangelogEntry {
    /// Returns the target type.
    pub fn target_type(&self) -> TargetType {
        self.value.target_type()
    }

    /// Returns true if this entry creates its target.
    pub fn is_creation(&self) -> bool {
        self.revision == REVISION_CREATE
    }

    /// Encodes the entry as JSON bytes.
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes an entry from JSON bytes.
    ///
    /// # Errors
    ///
    /// Malformed JSON yields [`ProtocolError::Json`]; a well-formed document
    /// with an unknown target type or value kind yields
    /// [`ProtocolError::Validation`].
    pub fn from_json(bytes: &[u8]) -> ProtocolResult<Self> {
        let raw: RawChangelogEntry = serde_json::from_slice(bytes)?;
        Self::try_from(raw)
    }
}

/// Untyped form used at the deserialization boundary.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChangelogEntry {
    id: String,
    source: String,
    revision: i64,
    target_type: String,
    #[serde(rename = "targetID")]
    target_id: String,
    value: serde_json::Value,
    #[serde(default)]
    is_synced: bool,
    #[serde(default)]
    is_applied: bool,
    timestamp: DateTime<Utc>,
}

impl TryFrom<RawChangelogEntry> for ChangelogEntry {
    type Error = ProtocolError;

    fn try_from(raw: RawChangelogEntry) -> Result<Self, Self::Error> {
        let value = ChangelogValue::decode(&raw.target_type, raw.value)?;

        if value.is_creation() != (raw.revision == REVISION_CREATE)
            && value.target_type() != TargetType::Settings
        {
            return Err(ProtocolError::validation(format!(
                "entry {}: revision {} does not match its {} payload",
                raw.id,
                raw.revision,
                if value.is_creation() { "creation" } else { "update" },
            )));
        }

        Ok(Self {
            id: raw.id,
            source: raw.source,
            revision: raw.revision,
            target_id: raw.target_id,
            value,
            is_synced: raw.is_synced,
            is_applied: raw.is_applied,
            timestamp: raw.timestamp,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EntryRef<'a> {
    id: &'a str,
    source: &'a str,
    revision: i64,
    target_type: TargetType,
    #[serde(rename = "targetID")]
    target_id: &'a str,
    value: &'a ChangelogValue,
    is_synced: bool,
    is_applied: bool,
    timestamp: &'a DateTime<Utc>,
}

impl Serialize for ChangelogEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        EntryRef {
            id: &self.id,
            source: &self.source,
            revision: self.revision,
            target_type: self.target_type(),
            target_id: &self.target_id,
            value: &self.value,
            is_synced: self.is_synced,
            is_applied: self.is_applied,
            timestamp: &self.timestamp,
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::{Change, MemoContentChanges};
    use crate::value::{MemoChange, SettingChange};
    use serde_json::json;

    fn sample_json() -> serde_json::Value {
        json!({
            "id": "e-1",
            "source": "web",
            "revision": 0,
            "targetType": "memos",
            "targetID": "memo-1",
            "value": {"content": {"version": "1", "changes": [{"retain": 48}, {"insert": "\n\nA new line."}]}},
            "isSynced": false,
            "isApplied": true,
            "timestamp": "2025-03-01T10:00:00Z"
        })
    }

    #[test]
    fn decode_content_entry() {
        let entry: ChangelogEntry = serde_json::from_value(sample_json()).unwrap();
        assert_eq!(entry.target_type(), TargetType::Memos);
        assert_eq!(entry.target_id, "memo-1");
        assert!(!entry.is_creation());
        assert_eq!(
            entry.value,
            ChangelogValue::Memo(MemoChange::Content(MemoContentChanges::new(vec![
                Change::Retain(48),
                Change::Insert("\n\nA new line.".into()),
            ])))
        );
    }

    #[test]
    fn encode_keeps_wire_field_names() {
        let entry: ChangelogEntry = serde_json::from_value(sample_json()).unwrap();
        let encoded = serde_json::to_value(&entry).unwrap();
        assert_eq!(encoded["targetType"], "memos");
        assert_eq!(encoded["targetID"], "memo-1");
        assert_eq!(encoded["isApplied"], true);
        assert_eq!(encoded["value"]["content"]["version"], "1");
    }

    #[test]
    fn from_json_rejects_unknown_target_as_validation() {
        let mut doc = sample_json();
        doc["targetType"] = json!("notebooks");
        let bytes = serde_json::to_vec(&doc).unwrap();
        let err = ChangelogEntry::from_json(&bytes).unwrap_err();
        assert!(matches!(err, ProtocolError::Validation(_)));
    }

    #[test]
    fn from_json_rejects_garbage_as_json_error() {
        let err = ChangelogEntry::from_json(b"{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)));
    }

    #[test]
    fn creation_revision_must_match_payload() {
        let mut doc = sample_json();
        doc["revision"] = json!(1);
        let bytes = serde_json::to_vec(&doc).unwrap();
        assert!(matches!(
            ChangelogEntry::from_json(&bytes),
            Err(ProtocolError::Validation(_))
        ));
    }

    #[test]
    fn settings_entries_accept_any_revision() {
        let doc = json!({
            "id": "e-2",
            "source": "web",
            "revision": 0,
            "targetType": "settings",
            "targetID": "theme.mode",
            "value": {"value": "dark"},
            "timestamp": "2025-03-01T10:00:00Z"
        });
        let entry: ChangelogEntry = serde_json::from_value(doc).unwrap();
        assert_eq!(
            entry.value,
            ChangelogValue::Setting(SettingChange::Value(json!("dark")))
        );
        assert!(!entry.is_synced);
        assert!(!entry.is_applied);
    }

    #[test]
    fn target_type_parsing() {
        assert_eq!("attachments".parse::<TargetType>().unwrap(), TargetType::Attachments);
        assert!("Memos".parse::<TargetType>().is_err());
        assert_eq!(TargetType::Settings.to_string(), "settings");
    }
}
