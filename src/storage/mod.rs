//! Storage layer for sqlorm.
//!
//! The [`Storage`] engine binds one [`Table`](crate::core::Table) to one data
//! source and turns CRUD calls into SQL. Each call opens its own session
//! through a [`Backend`] and releases it before returning. `SQLite` via
//! `rusqlite` is the bundled backend.

pub mod engine;
pub mod query;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use engine::{IntoKey, Key, Storage, make_storage};
pub use sqlite::{JournalMode, OpenOptions, SqliteBackend, SqliteSession};
pub use traits::{Backend, Session};

/// Default busy timeout applied to `SQLite` sessions, in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
