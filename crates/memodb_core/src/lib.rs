//! # memodb core
//!
//! Local database and entity logic for memodb.
//!
//! This crate provides:
//! - An embedded database with single-writer transactions and a CBOR
//!   snapshot file
//! - The changelog store, the unit of replication between clients
//! - Repositories for memos, attachments, settings and small runtime state
//! - The text merge engine that rebuilds memo content from patches
//! - Controllers that tie repository writes to changelog entries and notify
//!   observers
//! - Account key handling and AES-256-GCM encryption
//! - [`Context`], carrying cancellation and deadlines through every call
//!
//! ## Example
//!
//! ```rust
//! use memodb_core::{ChangelogStore, Context, CreateMemo, Database, DbConfig, MemoController};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let db = Database::open_in_memory(DbConfig::default());
//! let memos = MemoController::new(ChangelogStore::new(db));
//! let ctx = Context::new();
//!
//! let memo = memos.create_memo(&ctx, CreateMemo::new("buy oat milk #groceries")).await.unwrap();
//! let tags = memos.list_tags(&ctx, 10, None).await.unwrap();
//! assert_eq!(tags.items[0].tag, "groceries");
//! # let _ = memo;
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod changelog;
mod config;
mod context;
pub mod controllers;
pub mod crypto;
pub mod db;
mod error;
pub mod events;
pub mod merge;
pub mod model;
pub mod repo;
pub mod search;
pub mod tags;

pub use changelog::{ChangelogStore, EntryFilter, Sequence};
pub use config::DbConfig;
pub use context::Context;
pub use controllers::{
    apply_unapplied, Appliers, AttachmentController, AttachmentFallback, CreateAttachment,
    CreateMemo, MemoController, SettingsController, UpdateMemoContent,
};
pub use crypto::{CryptoManager, EncryptionKey, Hasher, Sha256Hasher};
pub use db::{Database, DbStats, TableStats, Transaction, TxScope};
pub use error::{CoreError, CoreResult, ErrorKind, ResultExt};
pub use events::{EntityEvent, EventRegistry};
pub use model::{Attachment, ListMemosQuery, Memo, MemoCursor, Page, Pagination, Tag};
pub use search::TokenizerConfig;

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
