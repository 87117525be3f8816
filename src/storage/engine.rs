//! The CRUD engine.
//!
//! [`Storage`] owns a table definition and a data source. Every operation
//! synthesizes its SQL from the table, opens a fresh session, binds values
//! in column declaration order, and drops the session before returning.

use crate::core::{Constraint, Field, Table, Value};
use crate::error::{Error, Result, SchemaError, StorageError};
use crate::storage::query;
use crate::storage::schema::{self, TABLE_EXISTS_SQL};
use crate::storage::sqlite::{OpenOptions, SqliteBackend};
use crate::storage::traits::{Backend, Session};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Upper bound on parameters bound to one statement (`SQLite`'s default limit).
const MAX_BOUND_PARAMETERS: usize = 32_766;

/// Primary key values identifying one row, in key column declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Key(Vec<Value>);

impl Key {
    /// Creates a key from raw values.
    #[must_use]
    pub const fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Key values in order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Number of key values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for a key without values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Conversion into a [`Key`].
///
/// Implemented for single field values (`7`, `"abc"`) and for tuples of up
/// to four values for composite keys.
pub trait IntoKey {
    /// Converts `self` into a key.
    fn into_key(self) -> Key;
}

impl IntoKey for Key {
    fn into_key(self) -> Key {
        self
    }
}

macro_rules! scalar_key {
    ($($ty:ty),*) => {
        $(
            impl IntoKey for $ty {
                fn into_key(self) -> Key {
                    Key(vec![Value::from(self)])
                }
            }
        )*
    };
}

scalar_key!(i64, i32, u32, bool, String, &str, Vec<u8>);

macro_rules! tuple_key {
    ($($name:ident),+) => {
        impl<$($name: Into<Value>),+> IntoKey for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_key(self) -> Key {
                let ($($name,)+) = self;
                Key(vec![$($name.into()),+])
            }
        }
    };
}

tuple_key!(A, B);
tuple_key!(A, B, C);
tuple_key!(A, B, C, D);

/// Maps records of type `R` to one table of one data source.
///
/// No connection is held between calls. Release of the session on every
/// exit path is tied to `Drop`, so a failing statement never leaks a handle.
///
/// # Examples
///
/// ```no_run
/// use sqlorm::{column, make_storage, Table};
///
/// #[derive(Debug, Default, Clone, PartialEq)]
/// struct User {
///     id: i64,
///     name: String,
/// }
///
/// let table = Table::new("users")
///     .column(column!(User, id).primary_key().autoincrement())
///     .column(column!(User, name).not_null());
/// let storage = make_storage("users.db", table).unwrap();
/// storage.create_table().unwrap();
///
/// let id = storage.insert(&User { id: 0, name: "Ann".into() }).unwrap();
/// let ann = storage.get(id).unwrap();
/// assert_eq!(ann.name, "Ann");
/// ```
pub struct Storage<R, B = SqliteBackend> {
    data_source: String,
    table: Arc<Table<R>>,
    backend: B,
}

impl<R> Storage<R, SqliteBackend> {
    /// Creates a `SQLite` storage with default [`OpenOptions`].
    ///
    /// # Errors
    ///
    /// Returns a schema error if the table definition is invalid.
    pub fn new(data_source: impl Into<String>, table: impl Into<Arc<Table<R>>>) -> Result<Self> {
        Self::with_backend(data_source, table, SqliteBackend::default())
    }

    /// Creates a `SQLite` storage with explicit connection options.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the table definition is invalid.
    pub fn with_options(
        data_source: impl Into<String>,
        table: impl Into<Arc<Table<R>>>,
        options: OpenOptions,
    ) -> Result<Self> {
        Self::with_backend(data_source, table, SqliteBackend::new(options))
    }
}

/// Creates a `SQLite` storage for `table` at `filename`.
///
/// # Errors
///
/// Returns a schema error if the table definition is invalid.
pub fn make_storage<R>(filename: impl Into<String>, table: Table<R>) -> Result<Storage<R>> {
    Storage::new(filename, table)
}

impl<R, B: Backend> Storage<R, B> {
    /// Creates a storage on an arbitrary backend.
    ///
    /// The table is validated here, before any database access.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the table definition is invalid.
    pub fn with_backend(
        data_source: impl Into<String>,
        table: impl Into<Arc<Table<R>>>,
        backend: B,
    ) -> Result<Self> {
        let table = table.into();
        table.validate()?;
        Ok(Self {
            data_source: data_source.into(),
            table,
            backend,
        })
    }

    /// Data source sessions are opened on.
    #[must_use]
    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    /// The mapped table.
    #[must_use]
    pub fn table(&self) -> &Table<R> {
        &self.table
    }

    /// The backend sessions are opened through.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Opens a session, runs `op`, and closes the session whatever `op` returned.
    fn with_session<T>(&self, op: impl FnOnce(&mut B::Session) -> Result<T>) -> Result<T> {
        let mut session = self.backend.open(&self.data_source)?;
        let result = op(&mut session);
        drop(session);
        result
    }

    fn values_with(&self, record: &R, constraint: Constraint) -> Vec<Value> {
        let mut values = Vec::new();
        self.table
            .for_each_column_with(constraint, |c| values.push(c.value_of(record)));
        values
    }

    fn values_without(&self, record: &R, constraint: Constraint) -> Vec<Value> {
        let mut values = Vec::new();
        self.table
            .for_each_column_without(constraint, |c| values.push(c.value_of(record)));
        values
    }

    fn all_values(&self, record: &R) -> Vec<Value> {
        self.table
            .columns()
            .iter()
            .map(|c| c.value_of(record))
            .collect()
    }

    fn require_primary_key(&self) -> Result<usize> {
        match self.table.primary_key_count() {
            0 => Err(SchemaError::NoPrimaryKey {
                table: self.table.name().to_owned(),
            }
            .into()),
            n => Ok(n),
        }
    }

    fn checked_key(&self, key: Key) -> Result<Key> {
        let expected = self.require_primary_key()?;
        if key.len() != expected {
            return Err(SchemaError::KeyArity {
                table: self.table.name().to_owned(),
                expected,
                actual: key.len(),
            }
            .into());
        }
        Ok(key)
    }

    /// Inserts every non-key column of `record` and returns the new row id.
    ///
    /// Primary key fields of `record` are ignored; the store assigns them.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the statement fails.
    pub fn insert(&self, record: &R) -> Result<i64> {
        let sql = query::insert(&self.table);
        let params = self.values_without(record, Constraint::PrimaryKey);
        debug!(table = self.table.name(), %sql, "insert");
        self.with_session(|session| {
            session.execute(&sql, &params)?;
            Ok(session.last_insert_rowid())
        })
    }

    /// Inserts many records, binding the non-key columns of each.
    ///
    /// Records are packed into as few multi-row statements as the bind
    /// limit allows. Returns the number of records inserted. An empty input
    /// does not open the store.
    ///
    /// Batches are not wrapped in a transaction. When a later batch fails,
    /// rows written by earlier batches stay committed and the error does not
    /// say how many there were.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or a statement fails.
    pub fn insert_range<'a, I>(&self, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a R>,
        R: 'a,
    {
        let records: Vec<&R> = records.into_iter().collect();
        if records.is_empty() {
            return Ok(0);
        }
        let width = self.table.len() - self.table.primary_key_count();
        self.with_session(|session| {
            if width == 0 {
                let sql = query::insert(&self.table);
                for _ in &records {
                    session.execute(&sql, &[])?;
                }
                return Ok(records.len());
            }
            let per_statement = (MAX_BOUND_PARAMETERS / width).max(1);
            let mut inserted = 0;
            for batch in records.chunks(per_statement) {
                let sql = query::insert_rows(&self.table, batch.len());
                let params: Vec<Value> = batch
                    .iter()
                    .flat_map(|record| self.values_without(record, Constraint::PrimaryKey))
                    .collect();
                debug!(table = self.table.name(), rows = batch.len(), "insert range");
                inserted += session.execute(&sql, &params)?;
            }
            Ok(inserted)
        })
    }

    /// Writes every column of `record`, replacing any row with the same key.
    ///
    /// Unlike [`insert`](Self::insert), key fields are written, so this is
    /// how a record with a known id is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the statement fails.
    pub fn replace(&self, record: &R) -> Result<()> {
        let sql = query::replace(&self.table);
        let params = self.all_values(record);
        debug!(table = self.table.name(), %sql, "replace");
        self.with_session(|session| session.execute(&sql, &params).map(|_| ()))
    }

    /// Replaces many records, writing every column of each.
    ///
    /// Batched like [`insert_range`](Self::insert_range), with the same
    /// caveat: there is no transaction around the batches. Returns the number
    /// of records written. An empty input does not open the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or a statement fails.
    pub fn replace_range<'a, I>(&self, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a R>,
        R: 'a,
    {
        let records: Vec<&R> = records.into_iter().collect();
        if records.is_empty() {
            return Ok(0);
        }
        let per_statement = (MAX_BOUND_PARAMETERS / self.table.len()).max(1);
        self.with_session(|session| {
            let mut written = 0;
            for batch in records.chunks(per_statement) {
                let sql = query::replace_rows(&self.table, batch.len());
                let params: Vec<Value> = batch
                    .iter()
                    .flat_map(|record| self.all_values(record))
                    .collect();
                debug!(table = self.table.name(), rows = batch.len(), "replace range");
                written += session.execute(&sql, &params)?;
            }
            Ok(written)
        })
    }

    /// Writes every non-key column of `record` to the row matching its key.
    ///
    /// SET values are bound first, then the WHERE key values, both in
    /// declaration order.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the table has no key column or no non-key
    /// column, otherwise any store error.
    pub fn update(&self, record: &R) -> Result<()> {
        let keys = self.require_primary_key()?;
        if keys == self.table.len() {
            return Err(SchemaError::NothingToUpdate {
                table: self.table.name().to_owned(),
            }
            .into());
        }
        let sql = query::update(&self.table);
        let mut params = self.values_without(record, Constraint::PrimaryKey);
        params.extend(self.values_with(record, Constraint::PrimaryKey));
        debug!(table = self.table.name(), %sql, "update");
        self.with_session(|session| session.execute(&sql, &params).map(|_| ()))
    }

    /// Deletes the row identified by `key`.
    ///
    /// Key value *i* is bound to primary key column *i*.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the key does not match the table's primary
    /// key, otherwise any store error.
    pub fn remove(&self, key: impl IntoKey) -> Result<()> {
        let key = self.checked_key(key.into_key())?;
        let sql = query::delete_by_key(&self.table);
        debug!(table = self.table.name(), %sql, "remove");
        self.with_session(|session| session.execute(&sql, key.values()).map(|_| ()))
    }

    /// Deletes every row of the table and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the statement fails.
    pub fn remove_all(&self) -> Result<usize> {
        let sql = query::delete_all(&self.table);
        debug!(table = self.table.name(), %sql, "remove all");
        self.with_session(|session| session.execute(&sql, &[]))
    }

    /// Number of rows in the table.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the query fails.
    pub fn count(&self) -> Result<usize> {
        let sql = query::count(&self.table);
        debug!(table = self.table.name(), %sql, "count");
        let mut count = 0_i64;
        self.with_session(|session| {
            session.query(&sql, &[], &mut |row: Vec<Value>| -> Result<()> {
                count = row.into_iter().next().map_or(Ok(0), i64::from_value)?;
                Ok(())
            })
        })?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Runs `function` over the named column of every row and returns the
    /// single result cell.
    fn aggregate(&self, function: &str, column: &str, args: &[Value]) -> Result<Value> {
        let column = self
            .table
            .find_column(column)
            .ok_or_else(|| SchemaError::UnknownColumn {
                table: self.table.name().to_owned(),
                column: column.to_owned(),
            })?;
        let sql = query::aggregate(&self.table, function, column.name(), args.len());
        debug!(table = self.table.name(), %sql, "aggregate");
        let mut result = Value::Null;
        self.with_session(|session| {
            session.query(&sql, args, &mut |row: Vec<Value>| -> Result<()> {
                result = row.into_iter().next().unwrap_or(Value::Null);
                Ok(())
            })
        })?;
        Ok(result)
    }

    fn aggregate_as<T: Field>(
        &self,
        function: &str,
        column: &str,
        args: &[Value],
    ) -> Result<Option<T>> {
        match self.aggregate(function, column, args)? {
            Value::Null => Ok(None),
            value => T::from_value(value).map(Some).map_err(|source| Error::Column {
                column: column.to_owned(),
                source,
            }),
        }
    }

    /// Number of non-NULL values in `column`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownColumn`] for a name the table does not
    /// declare, otherwise any store error.
    pub fn count_of(&self, column: &str) -> Result<usize> {
        let count: i64 = self.aggregate_as("count", column, &[])?.unwrap_or_default();
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Average of the non-NULL values in `column`, or 0 when there are none.
    ///
    /// # Errors
    ///
    /// Same as [`count_of`](Self::count_of).
    pub fn avg(&self, column: &str) -> Result<f64> {
        Ok(self.aggregate_as("avg", column, &[])?.unwrap_or_default())
    }

    /// Sum of the non-NULL values in `column`, or `None` when there are none.
    ///
    /// # Errors
    ///
    /// Same as [`count_of`](Self::count_of).
    pub fn sum(&self, column: &str) -> Result<Option<f64>> {
        self.aggregate_as("sum", column, &[])
    }

    /// Sum of the non-NULL values in `column` as a real; 0.0 for no rows.
    ///
    /// # Errors
    ///
    /// Same as [`count_of`](Self::count_of).
    pub fn total(&self, column: &str) -> Result<f64> {
        Ok(self.aggregate_as("total", column, &[])?.unwrap_or_default())
    }

    /// Largest value in `column`, or `None` when the column holds no value.
    ///
    /// # Errors
    ///
    /// Same as [`count_of`](Self::count_of), plus a conversion error if the
    /// result does not fit `T`.
    pub fn max<T: Field>(&self, column: &str) -> Result<Option<T>> {
        self.aggregate_as("max", column, &[])
    }

    /// Smallest value in `column`, or `None` when the column holds no value.
    ///
    /// # Errors
    ///
    /// Same as [`max`](Self::max).
    pub fn min<T: Field>(&self, column: &str) -> Result<Option<T>> {
        self.aggregate_as("min", column, &[])
    }

    /// Non-NULL values of `column` joined with `,`. Empty when there are none.
    ///
    /// # Errors
    ///
    /// Same as [`count_of`](Self::count_of).
    pub fn group_concat(&self, column: &str) -> Result<String> {
        Ok(self.aggregate_as("group_concat", column, &[])?.unwrap_or_default())
    }

    /// Non-NULL values of `column` joined with `separator`.
    ///
    /// # Errors
    ///
    /// Same as [`count_of`](Self::count_of).
    pub fn group_concat_with(&self, column: &str, separator: &str) -> Result<String> {
        let args = [Value::Text(separator.to_owned())];
        Ok(self.aggregate_as("group_concat", column, &args)?.unwrap_or_default())
    }

    /// Creates the table if it does not exist yet.
    ///
    /// Existing tables are left untouched; this never migrates.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the statement fails.
    pub fn create_table(&self) -> Result<()> {
        let sql = schema::create_table(&self.table);
        debug!(table = self.table.name(), %sql, "create table");
        self.with_session(|session| session.execute(&sql, &[]).map(|_| ()))
    }

    /// Returns true if the table exists in the data source.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or the query fails.
    pub fn table_exists(&self) -> Result<bool> {
        let params = [Value::Text(self.table.name().to_owned())];
        let mut found = false;
        self.with_session(|session| {
            session.query(TABLE_EXISTS_SQL, &params, &mut |row: Vec<Value>| -> Result<()> {
                found = row.into_iter().next().map_or(Ok(0), i64::from_value)? > 0;
                Ok(())
            })
        })?;
        Ok(found)
    }

    /// Validates the table definition against the live database.
    ///
    /// Not implemented: always fails with
    /// [`StorageError::SchemaCheckUnsupported`] instead of reporting a
    /// validation that never ran.
    ///
    /// # Errors
    ///
    /// Always.
    #[allow(clippy::unused_self)]
    pub fn check_schema(&self) -> Result<()> {
        Err(StorageError::SchemaCheckUnsupported.into())
    }

    /// Renders `record` as a JSON object of column name to value, in
    /// declaration order.
    pub fn dump(&self, record: &R) -> String {
        let mut object = serde_json::Map::new();
        self.table.for_each_column(|c| {
            let value = serde_json::to_value(c.value_of(record)).unwrap_or_default();
            object.insert(c.name().to_owned(), value);
        });
        serde_json::Value::Object(object).to_string()
    }
}

impl<R: Default, B: Backend> Storage<R, B> {
    fn record_from_row(&self, row: Vec<Value>) -> Result<R> {
        if row.len() != self.table.len() {
            return Err(StorageError::ColumnCount {
                expected: self.table.len(),
                actual: row.len(),
            }
            .into());
        }
        let mut record = R::default();
        for (column, cell) in self.table.columns().iter().zip(row) {
            column
                .assign(&mut record, cell)
                .map_err(|source| Error::Column {
                    column: column.name().to_owned(),
                    source,
                })?;
        }
        Ok(record)
    }

    /// Loads the row identified by `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if no row matches, a schema error
    /// if the key does not fit the table, otherwise any store or conversion
    /// error.
    pub fn get(&self, key: impl IntoKey) -> Result<R> {
        self.get_no_throw(key)?.ok_or_else(|| {
            StorageError::NotFound {
                table: self.table.name().to_owned(),
            }
            .into()
        })
    }

    /// Loads the row identified by `key`, or `None` if no row matches.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the key does not fit the table, otherwise
    /// any store or conversion error.
    pub fn get_no_throw(&self, key: impl IntoKey) -> Result<Option<R>> {
        let key = self.checked_key(key.into_key())?;
        let sql = query::select_by_key(&self.table);
        debug!(table = self.table.name(), %sql, "get");
        let mut found = None;
        self.with_session(|session| {
            session.query(&sql, key.values(), &mut |row: Vec<Value>| -> Result<()> {
                if found.is_none() {
                    found = Some(self.record_from_row(row)?);
                }
                Ok(())
            })
        })?;
        Ok(found)
    }

    /// Loads every row, in the order the store returns them.
    ///
    /// # Errors
    ///
    /// Returns any store or conversion error.
    pub fn get_all(&self) -> Result<Vec<R>> {
        let sql = query::select_all(&self.table);
        debug!(table = self.table.name(), %sql, "get all");
        let mut records = Vec::new();
        self.with_session(|session| {
            session.query(&sql, &[], &mut |row: Vec<Value>| -> Result<()> {
                records.push(self.record_from_row(row)?);
                Ok(())
            })
        })?;
        Ok(records)
    }
}

impl<R, B: Clone> Clone for Storage<R, B> {
    fn clone(&self) -> Self {
        Self {
            data_source: self.data_source.clone(),
            table: Arc::clone(&self.table),
            backend: self.backend.clone(),
        }
    }
}

impl<R, B: fmt::Debug> fmt::Debug for Storage<R, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("data_source", &self.data_source)
            .field("table", &self.table)
            .field("backend", &self.backend)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column;
    use crate::error::ConversionError;
    use std::sync::Mutex;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Person {
        id: i64,
        name: String,
        age: i32,
    }

    fn people() -> Table<Person> {
        Table::new("t")
            .column(column!(Person, id).primary_key())
            .column(column!(Person, name).not_null())
            .column(column!(Person, age))
    }

    #[derive(Debug, Default)]
    struct Log {
        opened: usize,
        closed: usize,
        statements: Vec<(String, Vec<Value>)>,
    }

    #[derive(Debug, Clone, Default)]
    struct RecordingBackend {
        log: Arc<Mutex<Log>>,
        rows: Vec<Vec<Value>>,
        fail: bool,
        fail_after: Option<usize>,
    }

    impl RecordingBackend {
        fn with_rows(rows: Vec<Vec<Value>>) -> Self {
            Self {
                rows,
                ..Self::default()
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn opened(&self) -> usize {
            self.log.lock().unwrap().opened
        }

        fn closed(&self) -> usize {
            self.log.lock().unwrap().closed
        }

        fn statements(&self) -> Vec<(String, Vec<Value>)> {
            self.log.lock().unwrap().statements.clone()
        }
    }

    struct RecordingSession {
        log: Arc<Mutex<Log>>,
        rows: Vec<Vec<Value>>,
        fail: bool,
        fail_after: Option<usize>,
    }

    impl RecordingSession {
        fn record(&self, sql: &str, params: &[Value]) -> Result<()> {
            let mut log = self.log.lock().unwrap();
            log.statements.push((sql.to_owned(), params.to_vec()));
            let over_budget = self
                .fail_after
                .is_some_and(|allowed| log.statements.len() > allowed);
            drop(log);
            if self.fail || over_budget {
                return Err(StorageError::Statement {
                    message: "no such table: t".to_string(),
                }
                .into());
            }
            Ok(())
        }
    }

    impl Drop for RecordingSession {
        fn drop(&mut self) {
            self.log.lock().unwrap().closed += 1;
        }
    }

    impl Backend for RecordingBackend {
        type Session = RecordingSession;

        fn open(&self, _data_source: &str) -> Result<RecordingSession> {
            self.log.lock().unwrap().opened += 1;
            Ok(RecordingSession {
                log: Arc::clone(&self.log),
                rows: self.rows.clone(),
                fail: self.fail,
                fail_after: self.fail_after,
            })
        }
    }

    impl Session for RecordingSession {
        fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize> {
            self.record(sql, params)?;
            Ok(1)
        }

        fn query(
            &mut self,
            sql: &str,
            params: &[Value],
            on_row: &mut dyn FnMut(Vec<Value>) -> Result<()>,
        ) -> Result<()> {
            self.record(sql, params)?;
            for row in self.rows.clone() {
                on_row(row)?;
            }
            Ok(())
        }

        fn last_insert_rowid(&self) -> i64 {
            42
        }
    }

    struct UnopenableBackend;

    impl Backend for UnopenableBackend {
        type Session = RecordingSession;

        fn open(&self, data_source: &str) -> Result<RecordingSession> {
            Err(StorageError::Open {
                data_source: data_source.to_owned(),
                reason: "unable to open database file".to_string(),
            }
            .into())
        }
    }

    fn storage(backend: RecordingBackend) -> Storage<Person, RecordingBackend> {
        Storage::with_backend("test.db", people(), backend).unwrap()
    }

    fn ann() -> Person {
        Person {
            id: 7,
            name: "Ann".to_string(),
            age: 30,
        }
    }

    #[test]
    fn test_insert_binds_non_key_columns() {
        let backend = RecordingBackend::default();
        let id = storage(backend.clone()).insert(&ann()).unwrap();
        assert_eq!(id, 42);
        assert_eq!(
            backend.statements(),
            vec![(
                r#"INSERT INTO "t" ("name", "age") VALUES (?, ?)"#.to_string(),
                vec![Value::Text("Ann".into()), Value::Integer(30)],
            )]
        );
    }

    #[test]
    fn test_update_binds_set_before_where() {
        let backend = RecordingBackend::default();
        storage(backend.clone()).update(&ann()).unwrap();
        assert_eq!(
            backend.statements(),
            vec![(
                r#"UPDATE "t" SET "name"=?, "age"=? WHERE "id"=?"#.to_string(),
                vec![
                    Value::Text("Ann".into()),
                    Value::Integer(30),
                    Value::Integer(7)
                ],
            )]
        );
    }

    #[test]
    fn test_get_builds_record_from_row() {
        let backend = RecordingBackend::with_rows(vec![vec![
            Value::Integer(7),
            Value::Text("Ann".into()),
            Value::Integer(30),
        ]]);
        let person = storage(backend.clone()).get(7).unwrap();
        assert_eq!(person, ann());
        assert_eq!(
            backend.statements()[0],
            (
                r#"SELECT "id", "name", "age" FROM "t" WHERE "id"=?"#.to_string(),
                vec![Value::Integer(7)]
            )
        );
    }

    #[test]
    fn test_get_extracts_text_cells() {
        let backend = RecordingBackend::with_rows(vec![vec![
            Value::Text("7".into()),
            Value::Text("Ann".into()),
            Value::Text("30".into()),
        ]]);
        assert_eq!(storage(backend).get(7).unwrap(), ann());
    }

    #[test]
    fn test_get_not_found() {
        let storage = storage(RecordingBackend::default());
        let err = storage.get(999).unwrap_err();
        assert!(err.is_not_found());
        assert!(storage.get_no_throw(999).unwrap().is_none());
        assert!(storage.get_all().unwrap().is_empty());
        assert_eq!(storage.count().unwrap(), 0);
    }

    #[test]
    fn test_get_all_preserves_row_order() {
        let backend = RecordingBackend::with_rows(vec![
            vec![Value::Integer(2), Value::Text("b".into()), Value::Integer(1)],
            vec![Value::Integer(1), Value::Text("a".into()), Value::Integer(2)],
        ]);
        let all = storage(backend).get_all().unwrap();
        assert_eq!(
            all.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            ["b", "a"]
        );
    }

    #[test]
    fn test_count_reads_scalar() {
        let backend = RecordingBackend::with_rows(vec![vec![Value::Integer(3)]]);
        assert_eq!(storage(backend).count().unwrap(), 3);
    }

    #[test]
    fn test_remove_binds_key() {
        let backend = RecordingBackend::default();
        storage(backend.clone()).remove(7).unwrap();
        assert_eq!(
            backend.statements(),
            vec![(r#"DELETE FROM "t" WHERE "id"=?"#.to_string(), vec![Value::Integer(7)])]
        );
    }

    #[test]
    fn test_statement_failure_releases_session_once() {
        let backend = RecordingBackend::failing();
        let storage = storage(backend.clone());
        let err = storage.insert(&ann()).unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::Statement { .. })));
        assert_eq!(backend.opened(), 1);
        assert_eq!(backend.closed(), 1);

        assert!(storage.get(1).is_err());
        assert!(storage.update(&ann()).is_err());
        assert!(storage.remove(1).is_err());
        assert!(storage.count().is_err());
        assert_eq!(backend.opened(), 5);
        assert_eq!(backend.closed(), 5);
    }

    #[test]
    fn test_conversion_failure_releases_session() {
        let backend = RecordingBackend::with_rows(vec![vec![
            Value::Integer(1),
            Value::Text("Ann".into()),
            Value::Text("thirty".into()),
        ]]);
        let err = storage(backend.clone()).get(1).unwrap_err();
        match err {
            Error::Column { column, source } => {
                assert_eq!(column, "age");
                assert!(matches!(source, ConversionError::InvalidInteger { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(backend.opened(), backend.closed());
    }

    #[test]
    fn test_open_failure_propagates() {
        let storage = Storage::with_backend("/nope/db", people(), UnopenableBackend).unwrap();
        let err = storage.insert(&ann()).unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::Open { .. })));
    }

    #[test]
    fn test_row_shape_mismatch() {
        let backend = RecordingBackend::with_rows(vec![vec![Value::Integer(1)]]);
        let err = storage(backend).get(1).unwrap_err();
        assert!(matches!(
            err,
            Error::Storage(StorageError::ColumnCount {
                expected: 3,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_key_arity_checked_before_open() {
        let backend = RecordingBackend::default();
        let storage = storage(backend.clone());
        let err = storage.get((1, 2)).unwrap_err();
        assert!(matches!(
            err,
            Error::Schema(SchemaError::KeyArity {
                expected: 1,
                actual: 2,
                ..
            })
        ));
        assert!(storage.remove(Key::new(vec![])).is_err());
        assert_eq!(backend.opened(), 0);
    }

    #[test]
    fn test_table_without_primary_key() {
        let backend = RecordingBackend::default();
        let table = Table::new("log")
            .column(column!(Person, name))
            .column(column!(Person, age));
        let storage = Storage::with_backend("test.db", table, backend.clone()).unwrap();
        assert!(matches!(
            storage.get(1).unwrap_err(),
            Error::Schema(SchemaError::NoPrimaryKey { .. })
        ));
        assert!(matches!(
            storage.update(&ann()).unwrap_err(),
            Error::Schema(SchemaError::NoPrimaryKey { .. })
        ));
        assert!(storage.insert(&ann()).is_ok());
        assert_eq!(backend.opened(), 1);
    }

    #[test]
    fn test_update_with_only_keys() {
        let table = Table::new("ids").column(column!(Person, id).primary_key());
        let storage = Storage::with_backend("test.db", table, RecordingBackend::default()).unwrap();
        assert!(matches!(
            storage.update(&ann()).unwrap_err(),
            Error::Schema(SchemaError::NothingToUpdate { .. })
        ));
    }

    #[test]
    fn test_invalid_table_rejected_at_construction() {
        let backend = RecordingBackend::default();
        let table: Table<Person> = Table::new("empty");
        let err = Storage::with_backend("test.db", table, backend.clone()).unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::NoColumns { .. })));
        assert_eq!(backend.opened(), 0);
    }

    #[test]
    fn test_insert_range_single_statement() {
        let backend = RecordingBackend::default();
        let records = [ann(), ann(), ann()];
        storage(backend.clone()).insert_range(&records).unwrap();
        let statements = backend.statements();
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].0,
            r#"INSERT INTO "t" ("name", "age") VALUES (?, ?), (?, ?), (?, ?)"#
        );
        assert_eq!(statements[0].1.len(), 6);
    }

    #[test]
    fn test_insert_range_failed_batch_keeps_earlier_batches() {
        let backend = RecordingBackend {
            fail_after: Some(1),
            ..RecordingBackend::default()
        };
        let per_statement = MAX_BOUND_PARAMETERS / 2;
        let records = vec![ann(); per_statement + 1];
        let err = storage(backend.clone()).insert_range(&records).unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::Statement { .. })));

        let statements = backend.statements();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].1.len(), per_statement * 2);
        assert_eq!(statements[1].1.len(), 2);
        assert_eq!(backend.opened(), 1);
        assert_eq!(backend.closed(), 1);
    }

    #[test]
    fn test_insert_range_empty_does_not_open() {
        let backend = RecordingBackend::default();
        let none: [Person; 0] = [];
        let inserted = storage(backend.clone()).insert_range(&none).unwrap();
        assert_eq!(inserted, 0);
        assert_eq!(backend.opened(), 0);
    }

    #[test]
    fn test_replace_binds_every_column() {
        let backend = RecordingBackend::default();
        storage(backend.clone()).replace(&ann()).unwrap();
        assert_eq!(
            backend.statements()[0].1,
            vec![
                Value::Integer(7),
                Value::Text("Ann".into()),
                Value::Integer(30)
            ]
        );
    }

    #[test]
    fn test_replace_range_batches_every_column() {
        let backend = RecordingBackend::default();
        let records = [ann(), Person { id: 8, ..ann() }];
        storage(backend.clone()).replace_range(&records).unwrap();
        let statements = backend.statements();
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].0,
            r#"REPLACE INTO "t" ("id", "name", "age") VALUES (?, ?, ?), (?, ?, ?)"#
        );
        assert_eq!(statements[0].1[3], Value::Integer(8));
    }

    #[test]
    fn test_replace_range_empty_does_not_open() {
        let backend = RecordingBackend::default();
        let none: [Person; 0] = [];
        assert_eq!(storage(backend.clone()).replace_range(&none).unwrap(), 0);
        assert_eq!(backend.opened(), 0);
    }

    #[test]
    fn test_aggregate_sql_and_result() {
        let backend = RecordingBackend::with_rows(vec![vec![Value::Real(30.5)]]);
        let storage = storage(backend.clone());
        assert!((storage.avg("age").unwrap() - 30.5).abs() < f64::EPSILON);
        assert_eq!(
            backend.statements()[0],
            (r#"SELECT avg("age") FROM "t""#.to_string(), vec![])
        );
    }

    #[test]
    fn test_aggregate_null_result() {
        let backend = RecordingBackend::with_rows(vec![vec![Value::Null]]);
        let storage = storage(backend);
        assert_eq!(storage.sum("age").unwrap(), None);
        assert_eq!(storage.max::<i32>("age").unwrap(), None);
        assert_eq!(storage.count_of("age").unwrap(), 0);
        assert_eq!(storage.group_concat("name").unwrap(), "");
    }

    #[test]
    fn test_group_concat_binds_separator() {
        let backend = RecordingBackend::with_rows(vec![vec![Value::Text("a|b".into())]]);
        let joined = storage(backend.clone())
            .group_concat_with("name", "|")
            .unwrap();
        assert_eq!(joined, "a|b");
        assert_eq!(
            backend.statements()[0],
            (
                r#"SELECT group_concat("name", ?) FROM "t""#.to_string(),
                vec![Value::Text("|".into())]
            )
        );
    }

    #[test]
    fn test_aggregate_unknown_column() {
        let backend = RecordingBackend::default();
        let err = storage(backend.clone()).total("salary").unwrap_err();
        assert!(matches!(
            err,
            Error::Schema(SchemaError::UnknownColumn { .. })
        ));
        assert_eq!(backend.opened(), 0);
    }

    #[test]
    fn test_aggregate_conversion_error_names_column() {
        let backend = RecordingBackend::with_rows(vec![vec![Value::Integer(i64::MAX)]]);
        let err = storage(backend).max::<i32>("age").unwrap_err();
        assert!(matches!(
            err,
            Error::Column { ref column, source: ConversionError::OutOfRange { .. } } if column == "age"
        ));
    }

    #[test]
    fn test_dump_in_declaration_order() {
        let storage = storage(RecordingBackend::default());
        assert_eq!(
            storage.dump(&ann()),
            r#"{"id":7,"name":"Ann","age":30}"#
        );
    }

    #[test]
    fn test_check_schema_is_unsupported() {
        let storage = storage(RecordingBackend::default());
        assert!(matches!(
            storage.check_schema().unwrap_err(),
            Error::Storage(StorageError::SchemaCheckUnsupported)
        ));
    }

    #[test]
    fn test_into_key() {
        assert_eq!(7_i64.into_key(), Key::new(vec![Value::Integer(7)]));
        assert_eq!("a".into_key(), Key::new(vec![Value::Text("a".into())]));
        assert_eq!(
            (1_i64, "x").into_key(),
            Key::new(vec![Value::Integer(1), Value::Text("x".into())])
        );
        assert_eq!((1_i64, 2_i64, 3_i64).into_key().len(), 3);
    }

    #[test]
    fn test_storage_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Storage<Person>>();
        assert_send_sync::<Table<Person>>();
    }
}
