//! Encrypted envelope for changelog entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A changelog entry as it is stored on, and exchanged with, the sync server.
///
/// `data` is the base64 encoding of the AEAD ciphertext of the entry's JSON
/// form. The server never sees plaintext; `timestamp` is the server's own
/// receive time and drives `since` queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedChangelogEntry {
    /// Client that uploaded the entry.
    #[serde(rename = "syncClientID")]
    pub sync_client_id: String,
    /// Base64 ciphertext.
    pub data: String,
    /// Server receive time (client send time before upload).
    pub timestamp: DateTime<Utc>,
}
