//! Table schema.
//!
//! A [`Table`] is the ordered list of columns for one record type. Column
//! order is fixed by the builder and drives every generated statement: the
//! selected column list, the insert column/value pairing, and the order in
//! which primary key values are bound.

use crate::core::column::Column;
use crate::core::constraint::Constraint;
use crate::error::SchemaError;
use std::collections::HashSet;
use std::fmt;

/// Ordered column descriptors plus the table name for record type `R`.
///
/// Immutable once built and safe to share across threads.
///
/// # Examples
///
/// ```
/// use sqlorm::column;
/// use sqlorm::core::{Constraint, Table};
///
/// #[derive(Default)]
/// struct User {
///     id: i64,
///     name: String,
///     age: i32,
/// }
///
/// let table = Table::new("users")
///     .column(column!(User, id).primary_key())
///     .column(column!(User, name).not_null())
///     .column(column!(User, age));
///
/// assert_eq!(table.column_names(), ["id", "name", "age"]);
/// assert_eq!(table.column_names_with(&[Constraint::PrimaryKey]), ["id"]);
/// ```
pub struct Table<R> {
    name: String,
    columns: Vec<Column<R>>,
}

impl<R> Table<R> {
    /// Starts a table definition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Appends a column. Declaration order is preserved.
    #[must_use]
    pub fn column(mut self, column: Column<R>) -> Self {
        self.columns.push(column);
        self
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[Column<R>] {
        &self.columns
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if no column has been declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn find_column(&self, name: &str) -> Option<&Column<R>> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Calls `visit` once per column in declaration order.
    pub fn for_each_column<F>(&self, visit: F)
    where
        F: FnMut(&Column<R>),
    {
        self.columns.iter().for_each(visit);
    }

    /// Calls `visit` for every column that does not carry `constraint`.
    pub fn for_each_column_without<F>(&self, constraint: Constraint, visit: F)
    where
        F: FnMut(&Column<R>),
    {
        self.columns
            .iter()
            .filter(|c| !c.has(constraint))
            .for_each(visit);
    }

    /// Calls `visit` for every column that carries `constraint`.
    pub fn for_each_column_with<F>(&self, constraint: Constraint, visit: F)
    where
        F: FnMut(&Column<R>),
    {
        self.columns
            .iter()
            .filter(|c| c.has(constraint))
            .for_each(visit);
    }

    /// All column names in declaration order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    /// Names of columns carrying every listed constraint.
    #[must_use]
    pub fn column_names_with(&self, constraints: &[Constraint]) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.has_all(constraints))
            .map(Column::name)
            .collect()
    }

    /// Names of columns lacking `constraint`.
    #[must_use]
    pub fn column_names_without(&self, constraint: Constraint) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| !c.has(constraint))
            .map(Column::name)
            .collect()
    }

    /// Names of the primary key columns.
    #[must_use]
    pub fn primary_key_names(&self) -> Vec<&str> {
        self.column_names_with(&[Constraint::PrimaryKey])
    }

    /// Number of primary key columns.
    #[must_use]
    pub fn primary_key_count(&self) -> usize {
        self.columns
            .iter()
            .filter(|c| c.has(Constraint::PrimaryKey))
            .count()
    }

    /// Checks the definition is usable: a name, at least one column, no
    /// repeated column names, and defaults matching their column's type.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::EmptyTableName);
        }
        if self.columns.is_empty() {
            return Err(SchemaError::NoColumns {
                table: self.name.clone(),
            });
        }
        let mut seen = HashSet::with_capacity(self.columns.len());
        for column in &self.columns {
            if !seen.insert(column.name()) {
                return Err(SchemaError::DuplicateColumn {
                    table: self.name.clone(),
                    column: column.name().to_owned(),
                });
            }
            if let Some(found) = column.default_type()
                && found != column.sql_type()
            {
                return Err(SchemaError::DefaultTypeMismatch {
                    table: self.name.clone(),
                    column: column.name().to_owned(),
                    expected: column.sql_type(),
                    found,
                });
            }
        }
        Ok(())
    }
}

impl<R> fmt::Debug for Table<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("columns", &self.columns)
            .finish()
    }
}

/// Builds a [`Table`] from a name and a list of columns.
#[must_use]
pub fn make_table<R>(name: impl Into<String>, columns: Vec<Column<R>>) -> Table<R> {
    Table {
        name: name.into(),
        columns,
    }
}
