//! Migration history tracking.
//!
//! The `migrations_history` table lives inside the target database and holds
//! one row per applied tag. Rows are written in the same batch as the
//! migration they record and are never updated.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use strata_core::{SqlValue, Statement, StatementResult};
use strata_exec::{Adapter, BookmarkTracker};
use tracing::debug;

use crate::error::{MigrateError, Result};

/// Name of the history table.
pub const HISTORY_TABLE: &str = "migrations_history";

/// SQL to create the migrations history table.
pub const CREATE_HISTORY_TABLE_SQL: &str = r"
CREATE TABLE IF NOT EXISTS migrations_history (
    tag TEXT UNIQUE,
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at INTEGER
)
";

/// A record of an applied migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    /// Row id in the history table.
    pub id: i64,
    /// Migration tag.
    pub tag: String,
    /// When the migration was applied.
    pub created_at: Option<DateTime<Utc>>,
}

/// Reads and writes the history table through any adapter.
///
/// Carries its own bookmark so reads issued after a write observe it, even
/// through the gateway.
pub struct MigrationHistory {
    adapter: Arc<dyn Adapter>,
    bookmarks: BookmarkTracker,
}

impl MigrationHistory {
    /// Creates a history manager over `adapter`.
    #[must_use]
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self {
            adapter,
            bookmarks: BookmarkTracker::new(),
        }
    }

    /// Returns the adapter.
    #[must_use]
    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    /// Returns the freshest bookmark seen.
    #[must_use]
    pub fn bookmark(&self) -> Option<&str> {
        self.bookmarks.current()
    }

    /// Ensures the history table exists. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::History`] when the statement fails.
    pub async fn ensure_table(&mut self) -> Result<()> {
        let result = self.exec(&Statement::raw(CREATE_HISTORY_TABLE_SQL)).await;
        check(result).map(|_| ())
    }

    /// Returns applied migrations in the order they were recorded.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::History`] when the table cannot be read.
    pub async fn get_applied(&mut self) -> Result<Vec<AppliedMigration>> {
        let statement =
            Statement::raw("SELECT id, tag, created_at FROM migrations_history ORDER BY id");
        let rows = check(self.exec(&statement).await)?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let tag = row.get("tag").and_then(Value::as_str)?;
                Some(AppliedMigration {
                    id: row.get("id").and_then(Value::as_i64).unwrap_or_default(),
                    tag: tag.to_string(),
                    created_at: row
                        .get("created_at")
                        .and_then(Value::as_i64)
                        .and_then(DateTime::from_timestamp_millis),
                })
            })
            .collect())
    }

    /// Runs `statements` followed by the history insert for `tag` as one
    /// atomic batch.
    pub async fn apply(&mut self, tag: &str, mut statements: Vec<Statement>) -> StatementResult {
        statements.push(record_statement(tag, Utc::now().timestamp_millis()));
        debug!(tag = %tag, statements = statements.len(), "Submitting migration batch");
        let result = self
            .adapter
            .batch(&statements, self.bookmarks.current())
            .await;
        self.bookmarks.observe(&result);
        result
    }

    async fn exec(&mut self, statement: &Statement) -> StatementResult {
        let result = self
            .adapter
            .exec(statement, self.bookmarks.current())
            .await;
        self.bookmarks.observe(&result);
        result
    }
}

/// Builds the insert that records `tag` as applied at `created_at` (epoch ms).
#[must_use]
pub fn record_statement(tag: &str, created_at: i64) -> Statement {
    Statement::new(
        "INSERT INTO migrations_history (tag, created_at) VALUES (?, ?)",
        vec![SqlValue::Text(tag.to_string()), SqlValue::Int(created_at)],
    )
}

fn check(result: StatementResult) -> Result<Vec<strata_core::Row>> {
    if result.success {
        Ok(result.data.unwrap_or_default())
    } else {
        Err(MigrateError::History(
            result.error.unwrap_or_else(|| "unknown error".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use strata_exec::SqliteAdapter;

    async fn setup() -> MigrationHistory {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create pool");
        MigrationHistory::new(Arc::new(SqliteAdapter::new(pool)))
    }

    #[tokio::test]
    async fn test_ensure_table_is_idempotent() {
        let mut history = setup().await;
        history.ensure_table().await.unwrap();
        history.ensure_table().await.unwrap();
        assert!(history.get_applied().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_records_tag() {
        let mut history = setup().await;
        history.ensure_table().await.unwrap();

        let result = history
            .apply("0000_initial", vec![Statement::raw("CREATE TABLE t (id INTEGER)")])
            .await;
        assert!(result.success, "{:?}", result.error);
        assert!(history.bookmark().is_some());

        let applied = history.get_applied().await.unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].tag, "0000_initial");
        assert!(applied[0].created_at.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_tag_is_rejected() {
        let mut history = setup().await;
        history.ensure_table().await.unwrap();
        assert!(history.apply("0000_initial", Vec::new()).await.success);
        assert!(!history.apply("0000_initial", Vec::new()).await.success);
        assert_eq!(history.get_applied().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_table_is_an_error() {
        let mut history = setup().await;
        assert!(matches!(
            history.get_applied().await,
            Err(MigrateError::History(_))
        ));
    }
}
