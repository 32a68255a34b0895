//! # memodb sync engine
//!
//! Synchronizes a memodb database with a sync server.
//!
//! This crate provides:
//! - The sync state machine (idle → uploading account key → fetching remote
//!   → applying / uploading local → idle)
//! - The [`SyncApi`] abstraction over the server, with an HTTP mapping and
//!   an in-process loopback client
//! - Persisted [`SyncInfo`] (server, account, client id, last sync time)
//! - Full-database fetch and upload
//!
//! ## Architecture
//!
//! The server only ever stores ciphertext. Every changelog entry is
//! serialized to JSON and sealed with the account key before upload;
//! fetched entries are opened with the same key and inserted into the local
//! changelog as synced but unapplied. The apply pass then materializes them
//! through the same controllers local edits go through, so observers fire
//! for remote changes exactly as for local ones.
//!
//! ## Key Invariants
//!
//! - A cycle commits atomically: fetched entries, applied state, upload
//!   flags and `lastSyncedAt` land together or not at all
//! - Entries uploaded by this client are never re-applied
//! - Entry ids already present locally are skipped, so refetching is safe
//! - Attachment bytes are uploaded together with their `created` entry

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod http;
mod info;
mod state;
mod transport;

pub use config::SyncConfig;
pub use engine::{SyncEngine, SyncTargets};
pub use error::{SyncError, SyncResult};
pub use http::{
    HttpClient, HttpRequest, HttpResponse, HttpTransport, LoopbackClient, LoopbackServer, Method,
};
pub use info::{SetupSync, SyncInfo, SYNC_INFO_KEY};
pub use state::{SyncCycleResult, SyncState, SyncStats};
pub use transport::{MockSyncApi, RemoteAttachments, SyncApi};
