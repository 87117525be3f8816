//! Store handle traits.
//!
//! Defines the interface the storage engine drives, enabling pluggable
//! store implementations. [`SqliteBackend`](crate::storage::SqliteBackend)
//! is the production one.

use crate::core::Value;
use crate::error::Result;

/// Opens sessions against a data source.
///
/// One session is opened per engine operation and dropped before the
/// operation returns.
pub trait Backend: Send + Sync {
    /// Session type produced by [`Backend::open`].
    type Session: Session;

    /// Opens a session on `data_source`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Open`](crate::error::StorageError::Open) if the
    /// data source cannot be opened.
    fn open(&self, data_source: &str) -> Result<Self::Session>;
}

/// An open store handle.
///
/// Dropping the session closes it. Implementations must release every
/// prepared statement before a method returns, on success and on error.
pub trait Session {
    /// Prepares `sql`, binds `params` to positions `1..=n` in order, steps
    /// the statement to completion and finalizes it.
    ///
    /// Returns the number of rows changed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Statement`](crate::error::StorageError::Statement)
    /// if prepare, bind or step fails.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize>;

    /// Prepares `sql`, binds `params`, and calls `on_row` once per result row
    /// with the row's cells in select order.
    ///
    /// An error returned by `on_row` stops iteration and is propagated.
    ///
    /// # Errors
    ///
    /// Returns a statement error if prepare, bind or step fails.
    fn query(
        &mut self,
        sql: &str,
        params: &[Value],
        on_row: &mut dyn FnMut(Vec<Value>) -> Result<()>,
    ) -> Result<()>;

    /// Row id of the most recent successful insert on this session.
    fn last_insert_rowid(&self) -> i64;
}
