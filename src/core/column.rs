//! Column descriptors.
//!
//! A [`Column`] maps one field of a record type `R` to one table column.
//! The typed accessors are erased into closures over [`Value`], so a table
//! can hold columns of different native types in a single `Vec`.

use crate::core::constraint::{Constraint, Constraints};
use crate::core::value::{Field, SqlType, Value};
use crate::error::ConversionError;
use std::fmt;

type Getter<R> = Box<dyn Fn(&R) -> Value + Send + Sync>;
type Setter<R> = Box<dyn Fn(&mut R, Value) -> Result<(), ConversionError> + Send + Sync>;

/// Describes one mapped field of record type `R`.
///
/// # Examples
///
/// ```
/// use sqlorm::core::{Column, Constraint};
///
/// #[derive(Default)]
/// struct User {
///     id: i64,
///     name: String,
/// }
///
/// let id = Column::new("id", |u: &User| &u.id, |u: &mut User| &mut u.id).primary_key();
/// assert!(id.has(Constraint::PrimaryKey));
/// assert!(!id.has(Constraint::NotNull));
/// ```
pub struct Column<R> {
    name: String,
    sql_type: SqlType,
    nullable: bool,
    constraints: Constraints,
    default_type: Option<SqlType>,
    get: Getter<R>,
    set: Setter<R>,
}

impl<R: 'static> Column<R> {
    /// Creates a column over the field reached by `get` / `get_mut`.
    ///
    /// The field type must implement [`Field`]; any other type is a
    /// compile error.
    pub fn new<T: Field + 'static>(
        name: impl Into<String>,
        get: fn(&R) -> &T,
        get_mut: fn(&mut R) -> &mut T,
    ) -> Self {
        Self {
            name: name.into(),
            sql_type: T::SQL_TYPE,
            nullable: T::NULLABLE,
            constraints: Constraints::new(),
            default_type: None,
            get: Box::new(move |record: &R| get(record).to_value()),
            set: Box::new(move |record: &mut R, value: Value| {
                *get_mut(record) = T::from_value(value)?;
                Ok(())
            }),
        }
    }
}

impl<R> Column<R> {
    /// Adds a constraint tag.
    #[must_use]
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.insert(constraint);
        self
    }

    /// Marks the column as (part of) the primary key.
    #[must_use]
    pub fn primary_key(self) -> Self {
        self.constraint(Constraint::PrimaryKey)
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub fn not_null(self) -> Self {
        self.constraint(Constraint::NotNull)
    }

    /// Marks the column AUTOINCREMENT.
    #[must_use]
    pub fn autoincrement(self) -> Self {
        self.constraint(Constraint::Autoincrement)
    }

    /// Marks the column UNIQUE.
    #[must_use]
    pub fn unique(self) -> Self {
        self.constraint(Constraint::Unique)
    }

    /// Sets the column's DEFAULT literal.
    ///
    /// `V` should have the column's storage class; a mismatch is reported
    /// by [`Table::validate`](crate::core::Table::validate).
    #[must_use]
    pub fn default_value<V: Field>(mut self, value: V) -> Self {
        self.constraints.set_default(value.to_value());
        self.default_type = Some(V::SQL_TYPE);
        self
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage class of the mapped field.
    #[must_use]
    pub const fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    /// Storage class of the default value's field type, if a default is set.
    #[must_use]
    pub const fn default_type(&self) -> Option<SqlType> {
        self.default_type
    }

    /// Whether the mapped field is an `Option`.
    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// The column's constraint set.
    #[must_use]
    pub const fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Returns true if the column carries `constraint`.
    #[must_use]
    pub const fn has(&self, constraint: Constraint) -> bool {
        self.constraints.has(constraint)
    }

    /// Returns true if the column carries every listed constraint.
    #[must_use]
    pub fn has_all(&self, constraints: &[Constraint]) -> bool {
        self.constraints.has_all(constraints)
    }

    /// Reads the mapped field of `record` as a bindable value.
    pub fn value_of(&self, record: &R) -> Value {
        (self.get)(record)
    }

    /// Writes a result cell into the mapped field of `record`.
    pub fn assign(&self, record: &mut R, value: Value) -> Result<(), ConversionError> {
        (self.set)(record, value)
    }
}

impl<R> fmt::Debug for Column<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("sql_type", &self.sql_type)
            .field("nullable", &self.nullable)
            .field("constraints", &self.constraints)
            .field("default_type", &self.default_type)
            .finish_non_exhaustive()
    }
}

/// Builds a [`Column`] for a named field of a record type.
///
/// `column!(User, name)` maps field `name` to a column of the same name;
/// `column!(User, name => "user_name")` picks a different column name.
///
/// # Examples
///
/// ```
/// use sqlorm::column;
///
/// #[derive(Default)]
/// struct User {
///     id: i64,
///     name: String,
/// }
///
/// let id = column!(User, id).primary_key();
/// let name = column!(User, name => "full_name").not_null();
/// assert_eq!(id.name(), "id");
/// assert_eq!(name.name(), "full_name");
/// ```
#[macro_export]
macro_rules! column {
    ($record:ty, $field:ident) => {
        $crate::column!($record, $field => stringify!($field))
    };
    ($record:ty, $field:ident => $name:expr) => {
        $crate::core::Column::new(
            $name,
            |r: &$record| &r.$field,
            |r: &mut $record| &mut r.$field,
        )
    };
}
