//! Schema description model.
//!
//! Columns, their constraints, the tables they compose, and the value
//! conversions between native fields and the store. Nothing here touches a
//! database.

pub mod column;
pub mod constraint;
pub mod table;
pub mod value;

pub use column::Column;
pub use constraint::{Constraint, Constraints};
pub use table::{Table, make_table};
pub use value::{Field, SqlType, Value};
