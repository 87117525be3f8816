//! `SQLite` backend.
//!
//! Implements the store handle traits on `rusqlite`. Each session owns one
//! connection; dropping the session closes it.

use crate::core::Value;
use crate::error::{Result, StorageError};
use crate::storage::DEFAULT_BUSY_TIMEOUT_MS;
use crate::storage::traits::{Backend, Session};
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OpenFlags};
use std::time::Duration;
use tracing::{debug, trace};

/// `SQLite` journal modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    /// Rollback journal deleted after each transaction.
    Delete,
    /// Rollback journal truncated after each transaction.
    Truncate,
    /// Rollback journal header zeroed after each transaction.
    Persist,
    /// Rollback journal kept in memory.
    Memory,
    /// Write-ahead log.
    Wal,
    /// No journal.
    Off,
}

impl JournalMode {
    /// Pragma value for this mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::Persist => "PERSIST",
            Self::Memory => "MEMORY",
            Self::Wal => "WAL",
            Self::Off => "OFF",
        }
    }
}

/// Connection settings applied to every session on open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    /// Create the database file if it does not exist.
    pub create_if_missing: bool,
    /// Enforce foreign key constraints.
    pub foreign_keys: bool,
    /// Journal mode to switch to, if any.
    pub journal_mode: Option<JournalMode>,
    /// How long to wait on a locked database before failing.
    pub busy_timeout: Option<Duration>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            foreign_keys: true,
            journal_mode: Some(JournalMode::Wal),
            busy_timeout: Some(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS)),
        }
    }
}

impl OpenOptions {
    /// Sets whether a missing database file is created.
    #[must_use]
    pub const fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Sets foreign key enforcement.
    #[must_use]
    pub const fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Sets the journal mode; `None` keeps the database's current mode.
    #[must_use]
    pub const fn journal_mode(mut self, mode: Option<JournalMode>) -> Self {
        self.journal_mode = mode;
        self
    }

    /// Sets the busy timeout; `None` fails immediately on a locked database.
    #[must_use]
    pub const fn busy_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.busy_timeout = timeout;
        self
    }

    fn flags(&self) -> OpenFlags {
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        flags
    }
}

/// Opens `rusqlite` connections with a fixed set of [`OpenOptions`].
#[derive(Debug, Clone, Default)]
pub struct SqliteBackend {
    options: OpenOptions,
}

impl SqliteBackend {
    /// Creates a backend with the given options.
    #[must_use]
    pub const fn new(options: OpenOptions) -> Self {
        Self { options }
    }

    /// Options applied on open.
    #[must_use]
    pub const fn options(&self) -> &OpenOptions {
        &self.options
    }

    fn configure(&self, conn: &Connection) -> rusqlite::Result<()> {
        if let Some(timeout) = self.options.busy_timeout {
            conn.busy_timeout(timeout)?;
        }
        if self.options.foreign_keys {
            conn.execute("PRAGMA foreign_keys = ON;", [])?;
        }
        if let Some(mode) = self.options.journal_mode {
            // journal_mode returns the resulting mode as a row
            let _: String = conn.query_row(
                &format!("PRAGMA journal_mode = {};", mode.as_str()),
                [],
                |row| row.get(0),
            )?;
        }
        Ok(())
    }
}

impl Backend for SqliteBackend {
    type Session = SqliteSession;

    fn open(&self, data_source: &str) -> Result<SqliteSession> {
        trace!(data_source, "opening sqlite session");
        let open_error = |err: rusqlite::Error| {
            debug!(data_source, error = %err, "failed to open sqlite database");
            StorageError::Open {
                data_source: data_source.to_owned(),
                reason: err.to_string(),
            }
        };
        let conn = Connection::open_with_flags(data_source, self.options.flags())
            .map_err(open_error)?;
        self.configure(&conn).map_err(open_error)?;
        Ok(SqliteSession { conn })
    }
}

/// One open `SQLite` connection.
#[derive(Debug)]
pub struct SqliteSession {
    conn: Connection,
}

impl SqliteSession {
    fn prepare(&self, sql: &str, params: &[Value]) -> Result<rusqlite::Statement<'_>> {
        let mut stmt = self.conn.prepare(sql).map_err(|err| statement_error(sql, &err))?;
        let expected = stmt.parameter_count();
        if expected != params.len() {
            return Err(StorageError::Statement {
                message: format!(
                    "statement expects {expected} parameters, {} supplied",
                    params.len()
                ),
            }
            .into());
        }
        for (index, value) in params.iter().enumerate() {
            stmt.raw_bind_parameter(index + 1, value)
                .map_err(|err| statement_error(sql, &err))?;
        }
        Ok(stmt)
    }
}

fn statement_error(sql: &str, err: &rusqlite::Error) -> StorageError {
    debug!(sql, error = %err, "sqlite statement failed");
    StorageError::Statement {
        message: err.to_string(),
    }
}

impl Session for SqliteSession {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize> {
        let mut stmt = self.prepare(sql, params)?;
        let changed = stmt
            .raw_execute()
            .map_err(|err| statement_error(sql, &err))?;
        Ok(changed)
    }

    fn query(
        &mut self,
        sql: &str,
        params: &[Value],
        on_row: &mut dyn FnMut(Vec<Value>) -> Result<()>,
    ) -> Result<()> {
        let mut stmt = self.prepare(sql, params)?;
        let column_count = stmt.column_count();
        let mut rows = stmt.raw_query();
        while let Some(row) = rows.next().map_err(|err| statement_error(sql, &err))? {
            let cells = (0..column_count)
                .map(|i| row.get_ref(i).map(Value::from))
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|err| statement_error(sql, &err))?;
            on_row(cells)?;
        }
        Ok(())
    }

    fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            Self::Null => ValueRef::Null,
            Self::Integer(i) => ValueRef::Integer(*i),
            Self::Real(f) => ValueRef::Real(*f),
            Self::Text(text) => ValueRef::Text(text.as_bytes()),
            Self::Blob(bytes) => ValueRef::Blob(bytes),
        };
        Ok(ToSqlOutput::Borrowed(value))
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Integer(i),
            ValueRef::Real(f) => Self::Real(f),
            // Invalid UTF-8 stays as raw bytes so text extraction reports it.
            ValueRef::Text(text) => std::str::from_utf8(text)
                .map_or_else(|_| Self::Blob(text.to_vec()), |s| Self::Text(s.to_owned())),
            ValueRef::Blob(bytes) => Self::Blob(bytes.to_vec()),
        }
    }
}
