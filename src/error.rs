//! Error types for sqlorm operations.
//!
//! This module provides the error hierarchy using `thiserror` for schema
//! definition, value conversion, and storage operations.

use crate::core::SqlType;
use thiserror::Error;

/// Result type alias for sqlorm operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Storage-related errors (opening the store, running statements).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Schema definition errors, detected before the store is touched.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Value conversion errors.
    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// Conversion failed while filling a specific column of a record.
    #[error("column `{column}`: {source}")]
    Column {
        /// Column being extracted.
        column: String,
        /// Underlying conversion failure.
        #[source]
        source: ConversionError,
    },
}

impl Error {
    /// Returns true if this is a `NotFound` storage error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Storage(StorageError::NotFound { .. }))
    }
}

/// Storage-specific errors for database operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The data source could not be opened.
    #[error("failed to open {data_source}: {reason}")]
    Open {
        /// Path or connection string that failed.
        data_source: String,
        /// Store-reported reason.
        reason: String,
    },

    /// Prepare, bind, step or query reported a failure.
    #[error("statement failed: {message}")]
    Statement {
        /// Store error text.
        message: String,
    },

    /// No row matched the requested key.
    #[error("not found in table {table}")]
    NotFound {
        /// Table that was queried.
        table: String,
    },

    /// A result row did not have the number of cells the schema expects.
    #[error("row has {actual} columns, schema expects {expected}")]
    ColumnCount {
        /// Columns declared by the schema.
        expected: usize,
        /// Cells returned by the store.
        actual: usize,
    },

    /// Schema validation against the live database is not implemented.
    #[error("schema check is not supported")]
    SchemaCheckUnsupported,
}

/// Errors in a table definition or in the arguments shaped by it.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    /// Table was declared without a name.
    #[error("table name is empty")]
    EmptyTableName,

    /// Table was declared without columns.
    #[error("table {table} has no columns")]
    NoColumns {
        /// Table name.
        table: String,
    },

    /// Two columns share a name.
    #[error("table {table} declares column {column} more than once")]
    DuplicateColumn {
        /// Table name.
        table: String,
        /// Repeated column name.
        column: String,
    },

    /// An identity operation was requested on a table without primary key.
    #[error("table {table} has no primary key column")]
    NoPrimaryKey {
        /// Table name.
        table: String,
    },

    /// A key does not have one value per primary key column.
    #[error("table {table} has {expected} primary key columns, key has {actual} values")]
    KeyArity {
        /// Table name.
        table: String,
        /// Number of primary key columns.
        expected: usize,
        /// Number of values in the supplied key.
        actual: usize,
    },

    /// A column's default value has a different storage class than the column.
    #[error("table {table} column {column} is {expected} but its default is {found}")]
    DefaultTypeMismatch {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Storage class of the column.
        expected: SqlType,
        /// Storage class of the default value.
        found: SqlType,
    },

    /// A column name does not belong to the table.
    #[error("table {table} has no column {column}")]
    UnknownColumn {
        /// Table name.
        table: String,
        /// Requested column name.
        column: String,
    },

    /// Update was requested on a table whose columns are all primary keys.
    #[error("table {table} has no non-key columns to update")]
    NothingToUpdate {
        /// Table name.
        table: String,
    },
}

/// Errors converting between store values and native field types.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    /// NULL cell for a non-nullable field.
    #[error("unexpected NULL for {expected} field")]
    UnexpectedNull {
        /// Storage class of the target field.
        expected: SqlType,
    },

    /// Cell storage class cannot be converted to the field type.
    #[error("cannot convert {found} to {expected}")]
    TypeMismatch {
        /// Storage class of the target field.
        expected: SqlType,
        /// Storage class found in the cell.
        found: &'static str,
    },

    /// Text that is not an integer.
    #[error("invalid integer: {text:?}")]
    InvalidInteger {
        /// Offending text.
        text: String,
    },

    /// Text that is not a real number.
    #[error("invalid real: {text:?}")]
    InvalidReal {
        /// Offending text.
        text: String,
    },

    /// Integer does not fit the target type.
    #[error("{value} is out of range for {target}")]
    OutOfRange {
        /// Stored value.
        value: i64,
        /// Name of the native target type.
        target: &'static str,
    },

    /// Blob is not valid UTF-8 text.
    #[error("invalid UTF-8 at byte offset {offset}")]
    InvalidUtf8 {
        /// Byte offset where invalid UTF-8 was found.
        offset: usize,
    },
}

// Implement From traits for store errors

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::from(err))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Statement {
            message: err.to_string(),
        }
    }
}

impl From<std::string::FromUtf8Error> for ConversionError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Self::InvalidUtf8 {
            offset: err.utf8_error().valid_up_to(),
        }
    }
}
