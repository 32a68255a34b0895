//! # memodb testkit
//!
//! Test utilities for memodb.
//!
//! This crate provides:
//! - Test clients bundling a database with its controllers
//! - Property-based generators for memo content, edits and settings
//! - Changelog replication between clients without a server
//!
//! ## Usage
//!
//! ```rust,ignore
//! use memodb_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn edits_replicate() {
//!     let a = TestClient::named("a");
//!     let b = TestClient::named("b");
//!     a.memos.create_memo(&a.ctx, CreateMemo::new("#todo milk")).await.unwrap();
//!
//!     replicate(&a, &b).await;
//!     assert_eq!(ClientState::capture(&a).await, ClientState::capture(&b).await);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use memodb_core::{CreateAttachment, CreateMemo, UpdateMemoContent};
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
