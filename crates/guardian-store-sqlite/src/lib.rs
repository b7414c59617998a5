//! SQLite backend for the Guardian record store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Implements the `guardian-core` store
//! traits: relation-embedding selects, raw row ingestion, and a change feed.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
