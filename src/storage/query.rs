//! SQL synthesis for the CRUD statements.
//!
//! Every function walks the table's columns in declaration order, so the
//! placeholders it emits line up with the values the engine binds.

use crate::core::{Constraint, Table};

/// Quotes a table or column name as an SQL identifier.
///
/// Embedded `"` characters are doubled, so any name is safe to splice.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quoted_list(names: &[&str]) -> String {
    names
        .iter()
        .map(|name| quote_identifier(name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn row_tuples(width: usize, rows: usize) -> String {
    let tuple = format!("({})", placeholders(width));
    vec![tuple.as_str(); rows].join(", ")
}

fn predicates(names: &[&str], separator: &str) -> String {
    names
        .iter()
        .map(|name| format!("{}=?", quote_identifier(name)))
        .collect::<Vec<_>>()
        .join(separator)
}

/// `SELECT <all columns> FROM <table>`.
pub fn select_all<R>(table: &Table<R>) -> String {
    format!(
        "SELECT {} FROM {}",
        quoted_list(&table.column_names()),
        quote_identifier(table.name())
    )
}

/// `SELECT <all columns> FROM <table> WHERE <pk>=? [AND ...]`.
pub fn select_by_key<R>(table: &Table<R>) -> String {
    format!(
        "{} WHERE {}",
        select_all(table),
        predicates(&table.primary_key_names(), " AND ")
    )
}

/// `SELECT count(*) FROM <table>`.
pub fn count<R>(table: &Table<R>) -> String {
    format!("SELECT count(*) FROM {}", quote_identifier(table.name()))
}

/// `SELECT <function>(<column>[, ?...]) FROM <table>`.
///
/// `extra_args` trailing placeholders follow the column, for functions such
/// as `group_concat` that take a separator.
pub fn aggregate<R>(table: &Table<R>, function: &str, column: &str, extra_args: usize) -> String {
    let mut args = quote_identifier(column);
    for _ in 0..extra_args {
        args.push_str(", ?");
    }
    format!(
        "SELECT {function}({args}) FROM {}",
        quote_identifier(table.name())
    )
}

/// `INSERT INTO <table> (<non-key columns>) VALUES (?, ...)`.
///
/// A table made only of key columns inserts `DEFAULT VALUES`.
pub fn insert<R>(table: &Table<R>) -> String {
    insert_rows(table, 1)
}

/// Multi-row insert of the non-key columns, one value tuple per row.
pub fn insert_rows<R>(table: &Table<R>, rows: usize) -> String {
    let columns = table.column_names_without(Constraint::PrimaryKey);
    if columns.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", quote_identifier(table.name()));
    }
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_identifier(table.name()),
        quoted_list(&columns),
        row_tuples(columns.len(), rows)
    )
}

/// `REPLACE INTO <table> (<all columns>) VALUES (?, ...)`.
pub fn replace<R>(table: &Table<R>) -> String {
    replace_rows(table, 1)
}

/// Multi-row replace of every column, one value tuple per row.
pub fn replace_rows<R>(table: &Table<R>, rows: usize) -> String {
    format!(
        "REPLACE INTO {} ({}) VALUES {}",
        quote_identifier(table.name()),
        quoted_list(&table.column_names()),
        row_tuples(table.len(), rows)
    )
}

/// `UPDATE <table> SET <col>=?, ... WHERE <pk>=? [AND ...]`.
///
/// Callers must ensure the table has both key and non-key columns.
pub fn update<R>(table: &Table<R>) -> String {
    format!(
        "UPDATE {} SET {} WHERE {}",
        quote_identifier(table.name()),
        predicates(&table.column_names_without(Constraint::PrimaryKey), ", "),
        predicates(&table.primary_key_names(), " AND ")
    )
}

/// `DELETE FROM <table> WHERE <pk>=? [AND ...]`.
pub fn delete_by_key<R>(table: &Table<R>) -> String {
    format!(
        "DELETE FROM {} WHERE {}",
        quote_identifier(table.name()),
        predicates(&table.primary_key_names(), " AND ")
    )
}

/// `DELETE FROM <table>`.
pub fn delete_all<R>(table: &Table<R>) -> String {
    format!("DELETE FROM {}", quote_identifier(table.name()))
}
