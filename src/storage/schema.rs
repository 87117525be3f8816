//! Table definition SQL.
//!
//! Builds `CREATE TABLE IF NOT EXISTS` statements from a [`Table`]. This is
//! creation only; existing tables are never altered.

use crate::core::{Column, Constraint, Table, Value};
use crate::storage::query::quote_identifier;
use std::fmt::Write;

/// SQL to check whether a table exists. Binds the table name.
pub const TABLE_EXISTS_SQL: &str =
    "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?";

/// Renders a value as an SQL literal for DEFAULT clauses.
///
/// SQL has no literal for NaN or the infinities; they render as `NULL`.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) if f.is_finite() => format!("{f:?}"),
        Value::Real(_) => "NULL".to_string(),
        Value::Text(text) => format!("'{}'", text.replace('\'', "''")),
        Value::Blob(bytes) => {
            let mut hex = String::with_capacity(bytes.len() * 2 + 3);
            hex.push_str("X'");
            for byte in bytes {
                let _ = write!(hex, "{byte:02X}");
            }
            hex.push('\'');
            hex
        }
    }
}

fn column_definition<R>(column: &Column<R>, inline_primary_key: bool) -> String {
    let mut def = format!("{} {}", quote_identifier(column.name()), column.sql_type());
    if inline_primary_key && column.has(Constraint::PrimaryKey) {
        def.push_str(" PRIMARY KEY");
        if column.has(Constraint::Autoincrement) {
            def.push_str(" AUTOINCREMENT");
        }
    }
    if column.has(Constraint::NotNull) || !column.is_nullable() {
        def.push_str(" NOT NULL");
    }
    if column.has(Constraint::Unique) {
        def.push_str(" UNIQUE");
    }
    if let Some(default) = column.constraints().default_value() {
        def.push_str(" DEFAULT ");
        def.push_str(&literal(default));
    }
    def
}

/// `CREATE TABLE IF NOT EXISTS <table> (<column definitions>)`.
///
/// A single key column is declared inline (`id INTEGER PRIMARY KEY`), which
/// makes an integer key an alias of the row id. Composite keys get a
/// table-level `PRIMARY KEY (...)` clause.
pub fn create_table<R>(table: &Table<R>) -> String {
    let keys = table.primary_key_names();
    let inline = keys.len() == 1;
    let mut definitions: Vec<String> = table
        .columns()
        .iter()
        .map(|c| column_definition(c, inline))
        .collect();
    if keys.len() > 1 {
        let quoted: Vec<String> = keys.iter().map(|key| quote_identifier(key)).collect();
        definitions.push(format!("PRIMARY KEY ({})", quoted.join(", ")));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_identifier(table.name()),
        definitions.join(", ")
    )
}
