//! Typed changelog payloads.

use crate::entry::TargetType;
use crate::error::{ProtocolError, ProtocolResult};
use crate::patch::MemoContentChanges;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Full state of a memo at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoCreated {
    /// Initial content.
    pub content: String,
    /// Initial archive flag.
    #[serde(default)]
    pub is_archived: bool,
    /// Initial delete flag.
    #[serde(default)]
    pub is_deleted: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// A change to a memo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemoChange {
    /// The memo was created.
    Created(MemoCreated),
    /// The memo content was patched.
    Content(MemoContentChanges),
    /// The archive flag changed.
    IsArchived(bool),
    /// The delete flag changed.
    IsDeleted(bool),
}

/// Metadata of an attachment at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentCreated {
    /// Filename as supplied by the user.
    pub original_filename: String,
    /// MIME type.
    pub content_type: String,
    /// Content-addressed path of the bytes.
    pub filepath: String,
    /// Base64 encoded SHA-256 digest of the bytes.
    pub sha256: String,
    /// Size of the bytes.
    pub size_bytes: u64,
}

impl AttachmentCreated {
    /// Decodes the base64 digest.
    pub fn digest(&self) -> ProtocolResult<[u8; 32]> {
        let bytes = BASE64.decode(&self.sha256)?;
        bytes.try_into().map_err(|b: Vec<u8>| {
            ProtocolError::validation(format!("sha256 digest has {} bytes, expected 32", b.len()))
        })
    }

    /// Encodes a digest the way it travels in `sha256`.
    pub fn encode_digest(digest: &[u8; 32]) -> String {
        BASE64.encode(digest)
    }
}

/// A change to an attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttachmentChange {
    /// The attachment was created.
    Created(AttachmentCreated),
}

/// A change to a single setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SettingChange {
    /// New value of the setting.
    Value(serde_json::Value),
}

/// The payload of a changelog entry, tagged by its target type.
///
/// Serializes as the inner change only; the target type travels next to it
/// in the entry's `targetType` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChangelogValue {
    /// Payload for `memos` entries.
    Memo(MemoChange),
    /// Payload for `attachments` entries.
    Attachment(AttachmentChange),
    /// Payload for `settings` entries.
    Setting(SettingChange),
}

impl ChangelogValue {
    /// Returns the target type this payload belongs to.
    pub fn target_type(&self) -> TargetType {
        match self {
            ChangelogValue::Memo(_) => TargetType::Memos,
            ChangelogValue::Attachment(_) => TargetType::Attachments,
            ChangelogValue::Setting(_) => TargetType::Settings,
        }
    }

    /// Returns true for payloads that create their target.
    pub fn is_creation(&self) -> bool {
        matches!(
            self,
            ChangelogValue::Memo(MemoChange::Created(_))
                | ChangelogValue::Attachment(AttachmentChange::Created(_))
        )
    }

    /// Returns true for memo payloads that carry content (creation or patch).
    pub fn carries_content(&self) -> bool {
        matches!(
            self,
            ChangelogValue::Memo(MemoChange::Created(_) | MemoChange::Content(_))
        )
    }

    /// Decodes a raw JSON value for the given target type.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Validation`] for unknown target types, unknown
    /// value kinds and unsupported patch versions.
    pub fn decode(target_type: &str, value: serde_json::Value) -> ProtocolResult<Self> {
        let target: TargetType = target_type.parse()?;
        let invalid = |e: serde_json::Error| {
            ProtocolError::validation(format!("invalid {target} value: {e}"))
        };

        let decoded = match target {
            TargetType::Memos => {
                ChangelogValue::Memo(serde_json::from_value(value).map_err(invalid)?)
            }
            TargetType::Attachments => {
                ChangelogValue::Attachment(serde_json::from_value(value).map_err(invalid)?)
            }
            TargetType::Settings => {
                ChangelogValue::Setting(serde_json::from_value(value).map_err(invalid)?)
            }
        };

        if let ChangelogValue::Memo(MemoChange::Content(patch)) = &decoded {
            if !patch.is_supported() {
                return Err(ProtocolError::validation(format!(
                    "unsupported content patch version {:?}",
                    patch.version
                )));
            }
        }

        Ok(decoded)
    }
}

impl From<MemoChange> for ChangelogValue {
    fn from(change: MemoChange) -> Self {
        ChangelogValue::Memo(change)
    }
}

impl From<AttachmentChange> for ChangelogValue {
    fn from(change: AttachmentChange) -> Self {
        ChangelogValue::Attachment(change)
    }
}

impl From<SettingChange> for ChangelogValue {
    fn from(change: SettingChange) -> Self {
        ChangelogValue::Setting(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_memo_flags() {
        let value = ChangelogValue::decode("memos", json!({"isArchived": true})).unwrap();
        assert_eq!(value, ChangelogValue::Memo(MemoChange::IsArchived(true)));

        let value = ChangelogValue::decode("memos", json!({"isDeleted": false})).unwrap();
        assert_eq!(value, ChangelogValue::Memo(MemoChange::IsDeleted(false)));
    }

    #[test]
    fn decode_setting_value() {
        let value = ChangelogValue::decode("settings", json!({"value": "dark"})).unwrap();
        assert_eq!(
            value,
            ChangelogValue::Setting(SettingChange::Value(json!("dark")))
        );
        assert!(!value.is_creation());
    }

    #[test]
    fn decode_rejects_unknown_kind() {
        let err = ChangelogValue::decode("memos", json!({"pinned": true})).unwrap_err();
        assert!(matches!(err, ProtocolError::Validation(_)));
    }

    #[test]
    fn decode_rejects_unknown_target() {
        let err = ChangelogValue::decode("folders", json!({"created": {}})).unwrap_err();
        assert!(matches!(err, ProtocolError::Validation(_)));
    }

    #[test]
    fn decode_rejects_future_patch_version() {
        let err = ChangelogValue::decode(
            "memos",
            json!({"content": {"version": "2", "changes": []}}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn value_serializes_without_target_wrapper() {
        let value = ChangelogValue::Memo(MemoChange::IsDeleted(true));
        assert_eq!(serde_json::to_value(&value).unwrap(), json!({"isDeleted": true}));
    }

    #[test]
    fn attachment_digest_roundtrip_validates_length() {
        let digest = [7u8; 32];
        let created = AttachmentCreated {
            original_filename: "a.png".into(),
            content_type: "image/png".into(),
            filepath: "/07/07".into(),
            sha256: AttachmentCreated::encode_digest(&digest),
            size_bytes: 3,
        };
        assert_eq!(created.digest().unwrap(), digest);

        let short = AttachmentCreated {
            sha256: BASE64.encode([1u8; 4]),
            ..created
        };
        assert!(matches!(short.digest(), Err(ProtocolError::Validation(_))));
    }

    #[test]
    fn content_payload_detection() {
        let patch = ChangelogValue::Memo(MemoChange::Content(MemoContentChanges::insert_all("x")));
        assert!(patch.carries_content());
        assert!(!ChangelogValue::Memo(MemoChange::IsArchived(true)).carries_content());
    }
}
