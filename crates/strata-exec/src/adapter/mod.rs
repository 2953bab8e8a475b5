//! The execution adapter contract and its three implementations.
//!
//! Every adapter turns a [`Statement`] into a [`QueryResult`]. Native errors
//! (SQLite, actor mailbox, HTTP transport) are converted into
//! `{success: false, error}` results and never returned as `Err`.

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use strata_core::sql::split_statements;
use strata_core::{QueryResult, Statement, StatementResult};

pub mod actor;
pub mod http;
pub mod sqlite;
pub mod wire;

pub use actor::{ActorAdapter, SqlActorHandle};
pub use http::HttpAdapter;
pub use sqlite::SqliteAdapter;

/// Which transport an adapter uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// In-process SQLite pool.
    Embedded,
    /// SQLite owned by a co-located actor.
    Actor,
    /// Authenticated HTTP gateway.
    Http,
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Embedded => "embedded",
            Self::Actor => "actor",
            Self::Http => "http",
        })
    }
}

/// Uniform execution contract.
///
/// `bookmark` is the minimum consistency point the caller has observed; an
/// adapter that cannot honour it may ignore it.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Transport used by this adapter.
    fn kind(&self) -> AdapterKind;

    /// Executes one statement and returns its rows.
    async fn exec(&self, statement: &Statement, bookmark: Option<&str>) -> StatementResult;

    /// Executes statements atomically. `results` holds one entry per
    /// statement; on failure nothing is applied.
    async fn batch(&self, statements: &[Statement], bookmark: Option<&str>) -> StatementResult;

    /// Executes one statement and returns rows as arrays, optionally
    /// preceded by a header row of column names.
    async fn raw(
        &self,
        statement: &Statement,
        column_names: bool,
        bookmark: Option<&str>,
    ) -> QueryResult<Vec<Vec<Value>>> {
        self.exec(statement, bookmark)
            .await
            .map(|rows| rows_to_arrays(rows, column_names))
    }

    /// Executes one statement and returns its first row, or one column of
    /// it. Missing rows and columns yield `null`.
    async fn first(
        &self,
        statement: &Statement,
        column: Option<&str>,
        bookmark: Option<&str>,
    ) -> QueryResult<Value> {
        self.exec(statement, bookmark)
            .await
            .map(|rows| first_value(rows, column))
    }

    /// Splits a multi-statement script and runs it as one batch.
    async fn script(&self, sql: &str, bookmark: Option<&str>) -> StatementResult {
        let statements: Vec<Statement> = split_statements(sql)
            .into_iter()
            .map(Statement::raw)
            .collect();
        self.batch(&statements, bookmark).await
    }
}

/// Converts row objects into value arrays.
#[must_use]
pub fn rows_to_arrays(rows: Vec<strata_core::Row>, column_names: bool) -> Vec<Vec<Value>> {
    let mut out = Vec::with_capacity(rows.len() + 1);
    if column_names {
        if let Some(first) = rows.first() {
            out.push(first.keys().map(|k| Value::String(k.clone())).collect());
        }
    }
    out.extend(
        rows.into_iter()
            .map(|row| row.into_iter().map(|(_, v)| v).collect()),
    );
    out
}

/// Picks the first row, or one of its columns.
#[must_use]
pub fn first_value(rows: Vec<strata_core::Row>, column: Option<&str>) -> Value {
    let Some(row) = rows.into_iter().next() else {
        return Value::Null;
    };
    match column {
        Some(name) => row.get(name).cloned().unwrap_or(Value::Null),
        None => Value::Object(row),
    }
}
