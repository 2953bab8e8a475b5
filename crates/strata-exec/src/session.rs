//! Database handle and per-caller sessions.
//!
//! A [`Db`] ties an adapter to a compiled schema and its relations; it is
//! cheap to clone and share. A [`Session`] adds the bookmark tracker and is
//! owned by a single logical caller.

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use strata_core::query::{self, include, Query};
use strata_core::schema::{NormalizedSchema, RelationMap};
use strata_core::{CompileError, QueryResult, Row, Statement, StatementResult};
use tracing::debug;

use crate::adapter::Adapter;
use crate::bookmark::BookmarkTracker;
use crate::error::{ConfigError, Result};

type CompileResult<T> = std::result::Result<T, CompileError>;

/// Shared database handle.
#[derive(Clone)]
pub struct Db {
    adapter: Arc<dyn Adapter>,
    schema: Arc<NormalizedSchema>,
    relations: Arc<RelationMap>,
}

impl Db {
    /// Binds `adapter` to `schema`, resolving its relations once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSchema`] when the schema has no table.
    pub fn new(adapter: Arc<dyn Adapter>, schema: NormalizedSchema) -> Result<Self> {
        if schema.tables.is_empty() {
            return Err(ConfigError::MissingSchema);
        }
        let relations = RelationMap::resolve(&schema);
        debug!(schema = %schema.name, relations = relations.len(), "Resolved relations");
        Ok(Self {
            adapter,
            schema: Arc::new(schema),
            relations: Arc::new(relations),
        })
    }

    /// Returns the compiled schema.
    #[must_use]
    pub fn schema(&self) -> &NormalizedSchema {
        &self.schema
    }

    /// Returns the resolved relations.
    #[must_use]
    pub fn relations(&self) -> &RelationMap {
        &self.relations
    }

    /// Returns the adapter.
    #[must_use]
    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    /// Opens a session with an empty bookmark.
    #[must_use]
    pub fn session(&self) -> Session {
        Session {
            db: self.clone(),
            bookmarks: BookmarkTracker::new(),
        }
    }
}

/// One logical caller's view of a database.
///
/// Every request carries the freshest bookmark seen so far; every successful
/// response may advance it. Compilation errors are returned as `Err` before
/// anything is sent; execution errors come back inside the result.
pub struct Session {
    db: Db,
    bookmarks: BookmarkTracker,
}

impl Session {
    /// Returns the current bookmark.
    #[must_use]
    pub fn bookmark(&self) -> Option<&str> {
        self.bookmarks.current()
    }

    /// Forgets the current bookmark.
    pub fn clear_bookmark(&mut self) {
        self.bookmarks.clear();
    }

    /// Executes one statement.
    pub async fn exec(&mut self, statement: &Statement) -> StatementResult {
        let result = self
            .db
            .adapter
            .exec(statement, self.bookmarks.current())
            .await;
        self.bookmarks.observe(&result);
        result
    }

    /// Executes statements atomically.
    pub async fn batch(&mut self, statements: &[Statement]) -> StatementResult {
        let result = self
            .db
            .adapter
            .batch(statements, self.bookmarks.current())
            .await;
        self.bookmarks.observe(&result);
        result
    }

    /// Executes one statement, returning rows as arrays.
    pub async fn raw(
        &mut self,
        statement: &Statement,
        column_names: bool,
    ) -> QueryResult<Vec<Vec<Value>>> {
        let result = self
            .db
            .adapter
            .raw(statement, column_names, self.bookmarks.current())
            .await;
        self.bookmarks.observe(&result);
        result
    }

    /// Runs a multi-statement script as one batch.
    pub async fn script(&mut self, sql: &str) -> StatementResult {
        let result = self
            .db
            .adapter
            .script(sql, self.bookmarks.current())
            .await;
        self.bookmarks.observe(&result);
        result
    }

    /// Runs a query, then one statement per included relation.
    ///
    /// # Errors
    ///
    /// Returns a [`CompileError`] for invalid queries or includes without a
    /// relation.
    pub async fn fetch(&mut self, query: &Query) -> CompileResult<StatementResult> {
        let statement = query.compile()?;
        self.fetch_with(query, &statement).await
    }

    /// Runs a query limited to one row and returns it, or `null`.
    ///
    /// # Errors
    ///
    /// Same as [`Session::fetch`].
    pub async fn first(&mut self, query: &Query) -> CompileResult<QueryResult<Value>> {
        let statement = query.compile_first()?;
        let result = self.fetch_with(query, &statement).await?;
        Ok(result.map(|rows| {
            rows.into_iter()
                .next()
                .map_or(Value::Null, Value::Object)
        }))
    }

    /// Inserts one row.
    ///
    /// # Errors
    ///
    /// Returns a [`CompileError`] for an empty row or invalid names.
    pub async fn insert(&mut self, table: &str, row: &Row) -> CompileResult<StatementResult> {
        let statement = query::insert(table, row)?;
        Ok(self.exec(&statement).await)
    }

    /// Updates rows matching `conditions`.
    ///
    /// # Errors
    ///
    /// Returns a [`CompileError`] for empty conditions or patches.
    pub async fn update(
        &mut self,
        table: &str,
        conditions: &Value,
        patch: &Row,
    ) -> CompileResult<StatementResult> {
        let statement = query::update(table, conditions, patch)?;
        Ok(self.exec(&statement).await)
    }

    /// Deletes rows matching `conditions`.
    ///
    /// # Errors
    ///
    /// Returns a [`CompileError`] for empty conditions.
    pub async fn delete(&mut self, table: &str, conditions: &Value) -> CompileResult<StatementResult> {
        let statement = query::delete(table, conditions)?;
        Ok(self.exec(&statement).await)
    }

    /// Counts rows matching `conditions`.
    ///
    /// # Errors
    ///
    /// Returns a [`CompileError`] for invalid conditions.
    pub async fn count(&mut self, table: &str, conditions: &Value) -> CompileResult<QueryResult<u64>> {
        let statement = query::count(table, conditions)?;
        let result = self.exec(&statement).await;
        Ok(result.map(|rows| {
            rows.first()
                .and_then(|row| row.get("count"))
                .and_then(Value::as_u64)
                .unwrap_or(0)
        }))
    }

    async fn fetch_with(
        &mut self,
        query: &Query,
        statement: &Statement,
    ) -> CompileResult<StatementResult> {
        let db = self.db.clone();
        let relations = query.relations(&db.relations)?;

        let mut result = self.exec(statement).await;
        if !result.success || relations.is_empty() {
            return Ok(result);
        }

        let mut rows = result.data.take().unwrap_or_default();
        let planned: Vec<_> = relations
            .into_iter()
            .map(|relation| (relation, include::related_statement(relation, &rows)))
            .collect();

        let adapter = &db.adapter;
        let bookmark = self.bookmarks.current().map(str::to_string);
        let bookmark = bookmark.as_deref();
        let fetched = join_all(planned.iter().map(|(_, statement)| async move {
            match statement {
                Some(statement) => Some(adapter.exec(statement, bookmark).await),
                None => None,
            }
        }))
        .await;

        for ((relation, _), related) in planned.iter().zip(fetched) {
            let related_rows = match related {
                Some(related) => {
                    self.bookmarks.observe(&related);
                    if !related.success {
                        return Ok(related);
                    }
                    related.data.unwrap_or_default()
                }
                None => Vec::new(),
            };
            include::attach(relation, &mut rows, related_rows);
        }

        result.data = Some(rows);
        Ok(result)
    }
}
