//! # memodb sync server
//!
//! Reference sync server for memodb.
//!
//! This crate provides:
//! - The sync API routes (clients, account keys, changes, attachments,
//!   full-database snapshots) over a transport-agnostic request type
//! - Per-account storage of ciphertext and content-addressed blobs
//! - Authentication middleware (HMAC-SHA256 bearer tokens)
//!
//! # Architecture
//!
//! The server never sees plaintext. Clients seal every changelog entry with
//! their account key; the server only restamps each entry with its receive
//! time so that `since` queries give every client a consistent cursor.
//!
//! # Authentication
//!
//! Without authentication the account is named by the `X-Username` header.
//! With it, each client holds a token bound to its account and client id:
//!
//! ```rust
//! use memodb_sync_server::{ServerConfig, SyncServer};
//!
//! let secret = b"my-secure-secret-32-bytes-long!".to_vec();
//! let server = SyncServer::new(ServerConfig::default().with_auth(secret));
//! let token = server.create_token("ada", "laptop").unwrap();
//! assert!(token.is_some());
//! ```
//!
//! # Routes
//!
//! | Method | Path | Body |
//! |--------|------|------|
//! | POST | `/api/sync/v1/clients` | `{"clientID": ...}` |
//! | POST | `/api/sync/v1/keys` | account key |
//! | GET / POST | `/api/sync/v1/full` | encrypted snapshot bytes |
//! | GET | `/api/sync/v1/changes?since=` | entry list |
//! | POST | `/api/sync/v1/changes` | entry list |
//! | POST | `/api/sync/v1/attachments` | bytes, path in `X-Filepath` |
//! | GET | `/blobs/{path}` | bytes |

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod server;
mod store;

pub use auth::{AuthConfig, TokenClaims, TokenValidator};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{ApiRequest, ApiResponse, HandlerContext, RequestHandler};
pub use server::SyncServer;
pub use store::ServerStore;
