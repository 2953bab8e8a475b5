//! INSERT, UPDATE, DELETE and COUNT statements.

use serde_json::Value;

use super::predicate::{ensure_identifier, render_conditions};
use super::select::Query;
use crate::error::{CompileError, Result};
use crate::result::Statement;
use crate::value::{Row, SqlValue};

fn bind(column: &str, value: &Value) -> Result<SqlValue> {
    SqlValue::from_json(value).ok_or_else(|| CompileError::UnbindableValue {
        column: column.to_string(),
        reason: format!("number {value} out of range"),
    })
}

fn require_conditions(
    action: &'static str,
    conditions: &Value,
    params: &mut Vec<SqlValue>,
) -> Result<String> {
    render_conditions(conditions, params)?.ok_or(CompileError::UnboundedMutation(action))
}

/// Compiles `INSERT INTO table (cols) VALUES (?, ...)`.
///
/// # Errors
///
/// Fails on an empty row, invalid identifiers or unbindable values.
pub fn insert(table: &str, row: &Row) -> Result<Statement> {
    ensure_identifier(table)?;
    if row.is_empty() {
        return Err(CompileError::EmptyRow("insert"));
    }
    let mut columns = Vec::with_capacity(row.len());
    let mut params = Vec::with_capacity(row.len());
    for (column, value) in row {
        ensure_identifier(column)?;
        columns.push(column.as_str());
        params.push(bind(column, value)?);
    }
    let placeholders = vec![SqlValue::placeholder(); params.len()].join(", ");
    Ok(Statement::new(
        format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            columns.join(", ")
        ),
        params,
    ))
}

/// Compiles `UPDATE table SET col = ?, ... WHERE ...`.
///
/// # Errors
///
/// Fails on an empty patch, empty conditions, invalid identifiers or
/// predicates.
pub fn update(table: &str, conditions: &Value, patch: &Row) -> Result<Statement> {
    ensure_identifier(table)?;
    if patch.is_empty() {
        return Err(CompileError::EmptyRow("update"));
    }
    let mut params = Vec::with_capacity(patch.len());
    let mut assignments = Vec::with_capacity(patch.len());
    for (column, value) in patch {
        ensure_identifier(column)?;
        assignments.push(format!("{column} = ?"));
        params.push(bind(column, value)?);
    }
    let filter = require_conditions("update", conditions, &mut params)?;
    Ok(Statement::new(
        format!(
            "UPDATE {table} SET {} WHERE {filter}",
            assignments.join(", ")
        ),
        params,
    ))
}

/// Compiles `DELETE FROM table WHERE ...`.
///
/// # Errors
///
/// Fails on empty conditions, invalid identifiers or predicates.
pub fn delete(table: &str, conditions: &Value) -> Result<Statement> {
    ensure_identifier(table)?;
    let mut params = Vec::new();
    let filter = require_conditions("delete", conditions, &mut params)?;
    Ok(Statement::new(
        format!("DELETE FROM {table} WHERE {filter}"),
        params,
    ))
}

/// Compiles `SELECT COUNT(*) as count FROM table [WHERE ...]`.
///
/// # Errors
///
/// Fails on invalid identifiers or predicates.
pub fn count(table: &str, conditions: &Value) -> Result<Statement> {
    Query::table(table)
        .where_clause(conditions.clone())
        .compile_count()
}
