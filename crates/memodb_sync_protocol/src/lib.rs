//! # memodb sync protocol
//!
//! Changelog model and wire types for memodb.
//!
//! This crate provides:
//! - [`ChangelogEntry`], the unit of replication
//! - [`ChangelogValue`], the typed payload decoded once at the boundary
//! - [`MemoContentChanges`], the patch format for memo content
//! - [`EncryptedChangelogEntry`], the at-rest and on-the-wire envelope
//! - Messages exchanged with the sync server
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Wire format
//!
//! Entries are JSON documents with camelCase keys. The `value` object has a
//! single key naming the kind of change:
//!
//! ```json
//! {
//!   "id": "5b0e...", "source": "web", "revision": 0,
//!   "targetType": "memos", "targetID": "memo-1",
//!   "value": {"isArchived": true},
//!   "isSynced": false, "isApplied": true,
//!   "timestamp": "2025-01-01T00:00:00Z"
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entry;
mod envelope;
mod error;
mod messages;
mod patch;
mod value;

pub use entry::{ChangelogEntry, TargetType, REVISION_CREATE, REVISION_UPDATE};
pub use envelope::EncryptedChangelogEntry;
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    AccountKey, ApiError, AttachmentUpload, ChangelogEntryList, ListChangesQuery, RegisterClientRequest,
    WireMessage, API_PREFIX, BLOB_PREFIX, FILEPATH_HEADER, USERNAME_HEADER,
};
pub use patch::{Change, MemoContentChanges, PATCH_VERSION};
pub use value::{
    AttachmentChange, AttachmentCreated, ChangelogValue, MemoChange, MemoCreated, SettingChange,
};
