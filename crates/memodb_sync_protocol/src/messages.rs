//! Messages exchanged with the sync server.

use crate::envelope::EncryptedChangelogEntry;
use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Prefix of the versioned API routes.
pub const API_PREFIX: &str = "/api/sync/v1";

/// Prefix under which attachment blobs are served.
pub const BLOB_PREFIX: &str = "/blobs";

/// Header carrying the content-addressed path of an uploaded attachment.
pub const FILEPATH_HEADER: &str = "X-Filepath";

/// Header naming the account when the server runs without authentication.
pub const USERNAME_HEADER: &str = "X-Username";

/// JSON encoding shared by all request and response bodies.
pub trait WireMessage: Sized {
    /// Encodes to JSON bytes.
    fn encode(&self) -> ProtocolResult<Vec<u8>>;

    /// Decodes from JSON bytes.
    fn decode(bytes: &[u8]) -> ProtocolResult<Self>;
}

impl<T: Serialize + DeserializeOwned> WireMessage for T {
    fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Registers a sync client with the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterClientRequest {
    /// The client id to register.
    #[serde(rename = "clientID")]
    pub client_id: String,
}

/// A list of encrypted changelog entries.
///
/// Used both as the body of an upload and as the response to a listing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChangelogEntryList {
    /// The entries.
    pub items: Vec<EncryptedChangelogEntry>,
}

impl ChangelogEntryList {
    /// Creates a list from entries.
    pub fn new(items: Vec<EncryptedChangelogEntry>) -> Self {
        Self { items }
    }
}

/// Query for listing changelog entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListChangesQuery {
    /// Only entries received strictly after this time.
    pub since: Option<DateTime<Utc>>,
}

impl ListChangesQuery {
    /// Renders the query string, including the leading `?` when non-empty.
    pub fn to_query_string(&self) -> String {
        match self.since {
            Some(since) => format!(
                "?since={}",
                since
                    .to_rfc3339_opts(SecondsFormat::Micros, true)
                    .replace('+', "%2B")
            ),
            None => String::new(),
        }
    }

    /// Parses a raw query string (with or without the leading `?`).
    pub fn parse(query: &str) -> ProtocolResult<Self> {
        let query = query.trim_start_matches('?');
        let mut since = None;
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if key == "since" && !value.is_empty() {
                let value = value.replace("%2B", "+").replace("%3A", ":");
                let parsed = DateTime::parse_from_rfc3339(&value).map_err(|e| {
                    ProtocolError::validation(format!("invalid since {value:?}: {e}"))
                })?;
                since = Some(parsed.with_timezone(&Utc));
            }
        }
        Ok(Self { since })
    }
}

/// Attachment bytes uploaded under their content-addressed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentUpload {
    /// Content-addressed path.
    pub filepath: String,
    /// Raw bytes.
    pub data: Vec<u8>,
}

/// The account key registered with the server.
///
/// Only a fingerprint of the symmetric key ever leaves the client; other
/// clients compare it with their own to detect a mismatched passphrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountKey {
    /// Key name, `"primary"` for the account key.
    pub name: String,
    /// Key type, e.g. `"aes256gcm-v1"`.
    #[serde(rename = "type")]
    pub key_type: String,
    /// Base64 key fingerprint.
    pub data: String,
}

/// Error body returned by the server for non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// HTTP status code.
    pub code: u16,
    /// Human readable message.
    pub error: String,
}
