//! Introspection of a live store, for verifying applied schemas.

use serde::Serialize;
use serde_json::Value;
use strata_core::schema::Table;
use strata_core::sql::is_identifier;
use strata_core::{NormalizedSchema, Row, Statement};
use strata_exec::Adapter;

use crate::error::{MigrateError, Result};
use crate::history::HISTORY_TABLE;

/// A column as the store reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Declared type.
    pub column_type: String,
    /// Whether NOT NULL is enforced.
    pub not_null: bool,
    /// Whether a DEFAULT is declared.
    pub has_default: bool,
    /// Whether the column belongs to the primary key.
    pub primary_key: bool,
}

impl ColumnInfo {
    fn from_pragma(row: &Row) -> Option<Self> {
        let flag = |key: &str| row.get(key).and_then(Value::as_i64).unwrap_or(0) != 0;
        Some(Self {
            name: row.get("name")?.as_str()?.to_string(),
            column_type: row
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_ascii_uppercase(),
            not_null: flag("notnull"),
            has_default: row.get("dflt_value").is_some_and(|v| !v.is_null()),
            primary_key: flag("pk"),
        })
    }
}

/// A difference between a compiled table and the live one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drift {
    /// The table does not exist in the store.
    MissingTable(String),
    /// A column exists in the schema only.
    MissingColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// A column exists in the store only.
    ExtraColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// A column exists on both sides with different attributes.
    Mismatch {
        /// What the schema expects.
        expected: ColumnInfo,
        /// What the store reports.
        actual: ColumnInfo,
        /// Table name.
        table: String,
    },
}

impl std::fmt::Display for Drift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingTable(table) => write!(f, "table '{table}' is missing"),
            Self::MissingColumn { table, column } => {
                write!(f, "column '{table}.{column}' is missing")
            }
            Self::ExtraColumn { table, column } => {
                write!(f, "column '{table}.{column}' is not in the schema")
            }
            Self::Mismatch {
                expected,
                actual,
                table,
            } => write!(
                f,
                "column '{table}.{}' differs: expected {expected:?}, found {actual:?}",
                expected.name
            ),
        }
    }
}

/// Lists user tables, excluding SQLite internals and the history table.
///
/// # Errors
///
/// Returns [`MigrateError::Introspection`] when the catalog cannot be read.
pub async fn table_names(adapter: &dyn Adapter) -> Result<Vec<String>> {
    let statement = Statement::raw(
        "SELECT name FROM sqlite_master WHERE type = 'table' \
         AND name NOT LIKE 'sqlite_%' ORDER BY name",
    );
    let rows = query(adapter, "sqlite_master", &statement).await?;
    Ok(rows
        .iter()
        .filter_map(|row| row.get("name").and_then(Value::as_str))
        .filter(|name| *name != HISTORY_TABLE)
        .map(str::to_string)
        .collect())
}

/// Reports the columns of `table` via `PRAGMA table_info`.
///
/// An unknown table yields an empty list.
///
/// # Errors
///
/// Returns [`MigrateError::Introspection`] for an invalid table name or a
/// failed query.
pub async fn table_info(adapter: &dyn Adapter, table: &str) -> Result<Vec<ColumnInfo>> {
    if !is_identifier(table) {
        return Err(MigrateError::Introspection {
            table: table.to_string(),
            error: "invalid table name".to_string(),
        });
    }
    let statement = Statement::raw(format!("PRAGMA table_info({table})"));
    let rows = query(adapter, table, &statement).await?;
    Ok(rows.iter().filter_map(ColumnInfo::from_pragma).collect())
}

/// Returns what `PRAGMA table_info` should report for a compiled table.
#[must_use]
pub fn expected_columns(table: &Table) -> Vec<ColumnInfo> {
    table
        .columns
        .iter()
        .map(|column| ColumnInfo {
            name: column.name.clone(),
            column_type: column.column_type.sql_name().to_string(),
            not_null: column.not_null,
            has_default: column.default.is_some(),
            primary_key: column.primary_key,
        })
        .collect()
}

/// Compares every table of `schema` with the live store.
///
/// # Errors
///
/// Propagates introspection failures.
pub async fn verify(adapter: &dyn Adapter, schema: &NormalizedSchema) -> Result<Vec<Drift>> {
    let mut drift = Vec::new();
    for table in &schema.tables {
        let actual = table_info(adapter, &table.name).await?;
        if actual.is_empty() {
            drift.push(Drift::MissingTable(table.name.clone()));
            continue;
        }
        let expected = expected_columns(table);
        for column in &expected {
            match actual.iter().find(|c| c.name == column.name) {
                None => drift.push(Drift::MissingColumn {
                    table: table.name.clone(),
                    column: column.name.clone(),
                }),
                Some(live) if live != column => drift.push(Drift::Mismatch {
                    expected: column.clone(),
                    actual: live.clone(),
                    table: table.name.clone(),
                }),
                Some(_) => {}
            }
        }
        for live in &actual {
            if !expected.iter().any(|c| c.name == live.name) {
                drift.push(Drift::ExtraColumn {
                    table: table.name.clone(),
                    column: live.name.clone(),
                });
            }
        }
    }
    Ok(drift)
}

async fn query(adapter: &dyn Adapter, table: &str, statement: &Statement) -> Result<Vec<Row>> {
    let result = adapter.exec(statement, None).await;
    if result.success {
        Ok(result.data.unwrap_or_default())
    } else {
        Err(MigrateError::Introspection {
            table: table.to_string(),
            error: result.error.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use strata_exec::SqliteAdapter;

    async fn adapter() -> SqliteAdapter {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create pool");
        SqliteAdapter::new(pool)
    }

    #[tokio::test]
    async fn test_table_info() {
        let adapter = adapter().await;
        let created = adapter
            .exec(
                &Statement::raw(
                    "CREATE TABLE t (id INTEGER PRIMARY KEY, name text NOT NULL, n INTEGER DEFAULT 0)",
                ),
                None,
            )
            .await;
        assert!(created.success);

        let columns = table_info(&adapter, "t").await.unwrap();
        assert_eq!(columns.len(), 3);
        assert!(columns[0].primary_key);
        assert_eq!(columns[1].column_type, "TEXT");
        assert!(columns[1].not_null);
        assert!(columns[2].has_default);

        assert_eq!(table_names(&adapter).await.unwrap(), ["t"]);
    }

    #[tokio::test]
    async fn test_unknown_table_is_empty() {
        let adapter = adapter().await;
        assert!(table_info(&adapter, "nope").await.unwrap().is_empty());
        assert!(matches!(
            table_info(&adapter, "t; DROP TABLE x").await,
            Err(MigrateError::Introspection { .. })
        ));
    }
}
