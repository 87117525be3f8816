//! Store values and the native field conversions.
//!
//! [`Value`] is the untyped representation the store binds and returns.
//! [`Field`] is implemented once per native type and converts in both
//! directions: `to_value` feeds statement parameters, `from_value` and
//! `from_text` rebuild the native value from a result cell.

use crate::error::ConversionError;
use serde::Serialize;
use std::fmt;

/// Storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SqlType {
    /// Signed 64-bit integer.
    Integer,
    /// 64-bit floating point.
    Real,
    /// UTF-8 text.
    Text,
    /// Raw bytes.
    Blob,
}

impl SqlType {
    /// Returns the type name used in column definitions.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
            Self::Blob => "BLOB",
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single bound parameter or result cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Real(f64),
    /// Text value.
    Text(String),
    /// Blob value.
    Blob(Vec<u8>),
}

impl Value {
    /// Returns the storage class name of this value.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Integer(_) => "INTEGER",
            Self::Real(_) => "REAL",
            Self::Text(_) => "TEXT",
            Self::Blob(_) => "BLOB",
        }
    }

    /// Returns true for SQL NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

macro_rules! value_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Field::to_value(&v)
                }
            }
        )*
    };
}

value_from!(i64, i32, u32, bool, f64, f32, String, Vec<u8>);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

/// A native type that can be stored in a column.
///
/// Implementations exist for `i64`, `i32`, `u32`, `bool`, `f64`, `f32`,
/// `String`, `Vec<u8>` and `Option<T>`. A column over any other type is
/// rejected at compile time by the `Field` bound on
/// [`Column::new`](crate::core::Column::new).
///
/// Integer parsing is strict: text that is not a base-10 integer (after
/// trimming ASCII whitespace) fails with [`ConversionError::InvalidInteger`]
/// rather than producing a sentinel.
pub trait Field: Sized {
    /// Storage class used in column definitions.
    const SQL_TYPE: SqlType;

    /// Whether the field accepts NULL.
    const NULLABLE: bool = false;

    /// Converts the field into a bindable value.
    fn to_value(&self) -> Value;

    /// Rebuilds the field from a result cell.
    fn from_value(value: Value) -> Result<Self, ConversionError>;

    /// Rebuilds the field from the store's textual cell representation.
    fn from_text(text: &str) -> Result<Self, ConversionError>;
}

fn parse_integer(text: &str) -> Result<i64, ConversionError> {
    text.trim_ascii()
        .parse()
        .map_err(|_| ConversionError::InvalidInteger {
            text: text.to_owned(),
        })
}

fn parse_real(text: &str) -> Result<f64, ConversionError> {
    text.trim_ascii()
        .parse()
        .map_err(|_| ConversionError::InvalidReal {
            text: text.to_owned(),
        })
}

const fn mismatch(expected: SqlType, found: &Value) -> ConversionError {
    match found {
        Value::Null => ConversionError::UnexpectedNull { expected },
        other => ConversionError::TypeMismatch {
            expected,
            found: other.type_name(),
        },
    }
}

fn integer_of(value: Value) -> Result<i64, ConversionError> {
    match value {
        Value::Integer(i) => Ok(i),
        Value::Text(text) => parse_integer(&text),
        other => Err(mismatch(SqlType::Integer, &other)),
    }
}

impl Field for i64 {
    const SQL_TYPE: SqlType = SqlType::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        integer_of(value)
    }

    fn from_text(text: &str) -> Result<Self, ConversionError> {
        parse_integer(text)
    }
}

macro_rules! narrow_integer_field {
    ($($ty:ty),*) => {
        $(
            impl Field for $ty {
                const SQL_TYPE: SqlType = SqlType::Integer;

                fn to_value(&self) -> Value {
                    Value::Integer(i64::from(*self))
                }

                fn from_value(value: Value) -> Result<Self, ConversionError> {
                    let wide = integer_of(value)?;
                    <$ty>::try_from(wide).map_err(|_| ConversionError::OutOfRange {
                        value: wide,
                        target: stringify!($ty),
                    })
                }

                fn from_text(text: &str) -> Result<Self, ConversionError> {
                    Self::from_value(Value::Integer(parse_integer(text)?))
                }
            }
        )*
    };
}

narrow_integer_field!(i32, u32);

impl Field for bool {
    const SQL_TYPE: SqlType = SqlType::Integer;

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        integer_of(value).map(|i| i != 0)
    }

    fn from_text(text: &str) -> Result<Self, ConversionError> {
        parse_integer(text).map(|i| i != 0)
    }
}

impl Field for f64 {
    const SQL_TYPE: SqlType = SqlType::Real;

    fn to_value(&self) -> Value {
        Value::Real(*self)
    }

    #[allow(clippy::cast_precision_loss)]
    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Real(f) => Ok(f),
            Value::Integer(i) => Ok(i as Self),
            Value::Text(text) => parse_real(&text),
            other => Err(mismatch(SqlType::Real, &other)),
        }
    }

    fn from_text(text: &str) -> Result<Self, ConversionError> {
        parse_real(text)
    }
}

// SQLite has no single-precision storage; narrowing on the way back is expected.
#[allow(clippy::cast_possible_truncation)]
impl Field for f32 {
    const SQL_TYPE: SqlType = SqlType::Real;

    fn to_value(&self) -> Value {
        Value::Real(f64::from(*self))
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        f64::from_value(value).map(|f| f as Self)
    }

    fn from_text(text: &str) -> Result<Self, ConversionError> {
        parse_real(text).map(|f| f as Self)
    }
}

impl Field for String {
    const SQL_TYPE: SqlType = SqlType::Text;

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Text(text) => Ok(text),
            Value::Integer(i) => Ok(i.to_string()),
            Value::Real(f) => Ok(f.to_string()),
            Value::Blob(bytes) => Ok(Self::from_utf8(bytes)?),
            Value::Null => Err(mismatch(SqlType::Text, &Value::Null)),
        }
    }

    fn from_text(text: &str) -> Result<Self, ConversionError> {
        Ok(text.to_owned())
    }
}

impl Field for Vec<u8> {
    const SQL_TYPE: SqlType = SqlType::Blob;

    fn to_value(&self) -> Value {
        Value::Blob(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Blob(bytes) => Ok(bytes),
            Value::Text(text) => Ok(text.into_bytes()),
            other => Err(mismatch(SqlType::Blob, &other)),
        }
    }

    fn from_text(text: &str) -> Result<Self, ConversionError> {
        Ok(text.as_bytes().to_vec())
    }
}

impl<T: Field> Field for Option<T> {
    const SQL_TYPE: SqlType = T::SQL_TYPE;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, Field::to_value)
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn from_text(text: &str) -> Result<Self, ConversionError> {
        T::from_text(text).map(Some)
    }
}
