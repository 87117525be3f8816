//! # sqlorm
//!
//! Typed object-relational mapping for `SQLite`.
//!
//! Describe a record's columns once, as accessor pairs plus constraints, and
//! get CRUD operations without writing SQL. Every statement is synthesized
//! from the column list and every value is bound as a parameter.
//!
//! ## Features
//!
//! - **Column descriptors**: name, field accessors and constraints per column
//! - **Table schema**: ordered traversal filtered by constraint
//! - **Value conversion**: one [`Field`] impl per supported field type
//! - **Storage engine**: insert, get, update, remove, count and friends
//!
//! ## Example
//!
//! ```no_run
//! use sqlorm::{column, make_storage, Table};
//!
//! #[derive(Debug, Default)]
//! struct User {
//!     id: i64,
//!     name: String,
//!     age: i32,
//! }
//!
//! # fn main() -> sqlorm::Result<()> {
//! let table = Table::new("users")
//!     .column(column!(User, id).primary_key().autoincrement())
//!     .column(column!(User, name).not_null())
//!     .column(column!(User, age));
//! let storage = make_storage("app.db", table)?;
//! storage.create_table()?;
//!
//! let id = storage.insert(&User { id: 0, name: "Ann".into(), age: 30 })?;
//! let mut user = storage.get(id)?;
//! user.age += 1;
//! storage.update(&user)?;
//! assert_eq!(storage.count()?, 1);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod core;
pub mod error;
pub mod storage;

// Re-export commonly used types at crate root
pub use error::{ConversionError, Error, Result, SchemaError, StorageError};

// Re-export schema types
pub use core::{Column, Constraint, Field, SqlType, Table, Value, make_table};

// Re-export storage types
pub use storage::{Backend, IntoKey, Key, OpenOptions, Session, SqliteBackend, Storage, make_storage};
