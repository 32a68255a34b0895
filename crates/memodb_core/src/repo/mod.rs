//! Repositories: queries and mutations over [`Tables`](crate::db::Tables).
//!
//! Repository functions are plain functions on borrowed tables. They never
//! open transactions or write changelog entries; controllers do that and
//! call into these through [`Transaction::read`](crate::db::Transaction::read)
//! and [`Transaction::write`](crate::db::Transaction::write).

pub mod attachments;
pub mod kv;
pub mod memos;
pub mod settings;
