//! # memodb storage
//!
//! Filesystem abstraction for memodb.
//!
//! Everything memodb persists outside the database rows goes through the
//! [`FileSystem`] trait: attachment bytes under their content-addressed
//! paths and the database snapshot file itself.
//!
//! ## Design Principles
//!
//! - Paths are logical, `/`-separated and always absolute (`/a/b/c`)
//! - Backends are opaque byte stores; they never interpret file contents
//! - A missing file is reported as [`StorageError::NotFound`], distinct from
//!   every other I/O failure, so callers can decide to fall back
//! - Backends must be `Send + Sync` and every operation is async
//!
//! ## Available Backends
//!
//! - [`InMemoryFileSystem`] - For testing and ephemeral clients
//! - [`LocalFileSystem`] - Files under a root directory on the local disk
//!
//! ## Example
//!
//! ```rust
//! use memodb_storage::{FileSystem, InMemoryFileSystem};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let fs = InMemoryFileSystem::new();
//! fs.mkdirp("/notes").await.unwrap();
//! fs.write("/notes/a.txt", b"hello").await.unwrap();
//! assert_eq!(fs.read("/notes/a.txt").await.unwrap(), b"hello");
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
pub mod path;

pub use backend::FileSystem;
pub use error::{StorageError, StorageResult};
pub use file::LocalFileSystem;
pub use memory::InMemoryFileSystem;
