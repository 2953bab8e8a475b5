//! Embedded SQLite adapter over a sqlx pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteArguments, SqliteConnection, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, Sqlite, SqlitePool, TypeInfo, ValueRef};
use strata_core::sql::is_read_only;
use strata_core::{QueryMeta, QueryResult, Row, SqlValue, Statement, StatementResult};
use tracing::{debug, warn};

use super::{Adapter, AdapterKind};

/// Outcome of one statement on a connection.
struct Executed {
    rows: Vec<Row>,
    changes: u64,
    last_row_id: Option<i64>,
}

/// SQLite execution shared by the embedded and actor adapters.
///
/// Holds the pool and a commit sequence; the sequence is the bookmark and
/// advances on every statement or batch that may have written.
#[derive(Debug, Clone)]
pub struct SqliteEngine {
    pool: SqlitePool,
    commits: Arc<AtomicU64>,
}

impl SqliteEngine {
    /// Wraps a pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            commits: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn bookmark(&self, wrote: bool) -> String {
        let sequence = if wrote {
            self.commits.fetch_add(1, Ordering::SeqCst) + 1
        } else {
            self.commits.load(Ordering::SeqCst)
        };
        format!("{sequence:016x}")
    }

    /// Runs one statement.
    pub async fn exec(&self, statement: &Statement) -> StatementResult {
        let started = Instant::now();
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => return QueryResult::failure(e.to_string()),
        };
        match run_statement(&mut conn, statement).await {
            Ok(executed) => {
                let wrote = executed.changes > 0 || !is_read_only(&statement.sql);
                let meta = QueryMeta {
                    changes: executed.changes,
                    last_row_id: executed.last_row_id,
                    duration_ms: started.elapsed().as_secs_f64() * 1000.0,
                    bookmark: Some(self.bookmark(wrote)),
                };
                QueryResult::ok(executed.rows, meta)
            }
            Err(e) => {
                warn!(sql = %statement.sql, error = %e, "Statement failed");
                QueryResult::failure(e.to_string())
            }
        }
    }

    /// Runs statements in one transaction.
    pub async fn batch(&self, statements: &[Statement]) -> StatementResult {
        let started = Instant::now();
        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => return QueryResult::failure(e.to_string()),
        };

        let mut results = Vec::with_capacity(statements.len());
        let mut changes = 0;
        let mut last_row_id = None;
        let mut wrote = false;
        for (i, statement) in statements.iter().enumerate() {
            let step = Instant::now();
            match run_statement(&mut tx, statement).await {
                Ok(executed) => {
                    changes += executed.changes;
                    last_row_id = executed.last_row_id.or(last_row_id);
                    wrote |= executed.changes > 0 || !is_read_only(&statement.sql);
                    results.push(QueryResult::ok(
                        executed.rows,
                        QueryMeta {
                            changes: executed.changes,
                            last_row_id: executed.last_row_id,
                            duration_ms: step.elapsed().as_secs_f64() * 1000.0,
                            bookmark: None,
                        },
                    ));
                }
                Err(e) => {
                    warn!(index = i, sql = %statement.sql, error = %e, "Batch aborted");
                    if let Err(rollback) = tx.rollback().await {
                        warn!(error = %rollback, "Rollback failed");
                    }
                    return QueryResult::failure(format!("statement {i} failed: {e}"));
                }
            }
        }

        if let Err(e) = tx.commit().await {
            return QueryResult::failure(e.to_string());
        }

        QueryResult {
            success: true,
            data: None,
            results: Some(results),
            error: None,
            meta: Some(QueryMeta {
                changes,
                last_row_id,
                duration_ms: started.elapsed().as_secs_f64() * 1000.0,
                bookmark: Some(self.bookmark(wrote)),
            }),
        }
    }
}

async fn run_statement(
    conn: &mut SqliteConnection,
    statement: &Statement,
) -> Result<Executed, sqlx::Error> {
    debug!(sql = %statement.sql, params = statement.params.len(), "Executing SQL");
    let before: i64 = sqlx::query_scalar("SELECT total_changes()")
        .fetch_one(&mut *conn)
        .await?;

    let mut query = sqlx::query(&statement.sql);
    for param in &statement.params {
        query = bind_param_raw(query, param.clone());
    }
    let rows = query.fetch_all(&mut *conn).await?;
    let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;

    let (after, last): (i64, i64) = sqlx::query_as("SELECT total_changes(), last_insert_rowid()")
        .fetch_one(&mut *conn)
        .await?;
    let changes = u64::try_from(after - before).unwrap_or(0);
    Ok(Executed {
        rows,
        changes,
        last_row_id: (changes > 0).then_some(last),
    })
}

/// Decodes a row by the storage class of each value.
fn decode_row(row: &SqliteRow) -> Result<Row, sqlx::Error> {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_ascii_uppercase();
            match type_name.as_str() {
                "INTEGER" | "INT" | "INT8" | "BIGINT" | "BOOLEAN" => {
                    Value::from(row.try_get_unchecked::<i64, _>(i)?)
                }
                "REAL" | "FLOAT" | "DOUBLE" => {
                    SqlValue::Float(row.try_get_unchecked::<f64, _>(i)?).to_json()
                }
                "BLOB" => SqlValue::Blob(row.try_get_unchecked::<Vec<u8>, _>(i)?).to_json(),
                _ => Value::String(row.try_get_unchecked::<String, _>(i)?),
            }
        };
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

/// Binds a SqlValue parameter to a raw query.
fn bind_param_raw<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: SqlValue,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(Option::<i64>::None),
        SqlValue::Bool(b) => query.bind(b),
        SqlValue::Int(i) => query.bind(i),
        SqlValue::Float(f) => query.bind(f),
        SqlValue::Text(s) => query.bind(s),
        SqlValue::Blob(b) => query.bind(b),
    }
}

/// In-process adapter: statements run directly on a pool.
#[derive(Debug, Clone)]
pub struct SqliteAdapter {
    engine: SqliteEngine,
}

impl SqliteAdapter {
    /// Wraps an existing pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            engine: SqliteEngine::new(pool),
        }
    }

    /// Opens a pool on `url` (`sqlite::memory:` or `sqlite://path?mode=rwc`).
    ///
    /// # Errors
    ///
    /// Returns the sqlx error when the database cannot be opened.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new().connect(url).await?;
        Ok(Self::new(pool))
    }

    /// Returns the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        self.engine.pool()
    }
}

#[async_trait]
impl Adapter for SqliteAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Embedded
    }

    async fn exec(&self, statement: &Statement, _bookmark: Option<&str>) -> StatementResult {
        self.engine.exec(statement).await
    }

    async fn batch(&self, statements: &[Statement], _bookmark: Option<&str>) -> StatementResult {
        self.engine.batch(statements).await
    }
}
