//! The chainable SELECT builder.

use serde_json::Value;

use super::predicate::{ensure_identifier, render_conditions};
use crate::error::{CompileError, Result};
use crate::result::Statement;
use crate::schema::{Relation, RelationMap};
use crate::value::SqlValue;

/// ORDER BY direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl Order {
    /// Parses `asc`/`desc`, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::InvalidDirection`] for anything else.
    pub fn parse(direction: &str) -> Result<Self> {
        match direction.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(CompileError::InvalidDirection(direction.to_string())),
        }
    }

    /// Returns the SQL keyword.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// How `offset(n)` was interpreted when it was called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offset {
    /// No limit was set yet: skip `n` rows.
    Raw(u64),
    /// A limit was set: `n` is a 1-based page number.
    Page(u64),
}

/// A SELECT query description.
///
/// Builder calls are infallible; validation happens in [`Query::compile`].
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use strata_core::query::{Order, Query};
///
/// let stmt = Query::table("orders")
///     .where_clause(json!({"email": "%@acme.com"}))
///     .or_where(json!({"status": {"in": [1, 2]}}))
///     .order_by("id", Order::Desc)
///     .limit(10)
///     .compile()
///     .unwrap();
///
/// assert_eq!(
///     stmt.sql,
///     "SELECT * FROM orders WHERE (email LIKE ?) OR (status IN (?, ?)) ORDER BY id DESC LIMIT 10"
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    table: String,
    groups: Vec<Vec<Value>>,
    order: Vec<(String, Order)>,
    columns: Vec<String>,
    limit: Option<u64>,
    offset: Option<Offset>,
    includes: Vec<String>,
}

impl Query {
    /// Starts a query on `table`.
    #[must_use]
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            groups: Vec::new(),
            order: Vec::new(),
            columns: Vec::new(),
            limit: None,
            offset: None,
            includes: Vec::new(),
        }
    }

    /// Returns the base table.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Opens a new condition group, AND-joined with the previous ones.
    #[must_use]
    pub fn where_clause(mut self, conditions: Value) -> Self {
        self.groups.push(vec![conditions]);
        self
    }

    /// Adds an alternative to the current group (OR-joined). Starts a group
    /// when there is none.
    #[must_use]
    pub fn or_where(mut self, conditions: Value) -> Self {
        match self.groups.last_mut() {
            Some(group) => group.push(conditions),
            None => self.groups.push(vec![conditions]),
        }
        self
    }

    /// Appends an ORDER BY term.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order.push((column.into(), order));
        self
    }

    /// Restricts the projection. Empty means `*`.
    #[must_use]
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| (*c).to_string()).collect();
        self
    }

    /// Caps the number of rows.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips rows.
    ///
    /// Two meanings, depending on call order: before any `limit`, `n` is a
    /// raw row count (`OFFSET n`); after `limit(size)`, `n` is a 1-based page
    /// number (`OFFSET (n - 1) * size`).
    #[must_use]
    pub const fn offset(mut self, n: u64) -> Self {
        self.offset = Some(if self.limit.is_some() {
            Offset::Page(n)
        } else {
            Offset::Raw(n)
        });
        self
    }

    /// Requests related rows of `related` to be attached to each result row.
    #[must_use]
    pub fn include(mut self, related: impl Into<String>) -> Self {
        let related = related.into();
        if !self.includes.contains(&related) {
            self.includes.push(related);
        }
        self
    }

    /// Returns the requested inclusions.
    #[must_use]
    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    /// Looks up the relation for every inclusion.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::UnknownRelation`] when an included table has
    /// no relation to the base table.
    pub fn relations<'a>(&self, map: &'a RelationMap) -> Result<Vec<&'a Relation>> {
        self.includes
            .iter()
            .map(|related| {
                map.get(&self.table, related)
                    .ok_or_else(|| CompileError::UnknownRelation {
                        table: self.table.clone(),
                        related: related.clone(),
                    })
            })
            .collect()
    }

    /// Compiles to a SELECT statement.
    ///
    /// # Errors
    ///
    /// Fails on invalid identifiers, directions or predicates.
    pub fn compile(&self) -> Result<Statement> {
        self.render(self.limit)
    }

    /// Compiles to a SELECT statement returning at most one row.
    ///
    /// # Errors
    ///
    /// Same as [`Query::compile`].
    pub fn compile_first(&self) -> Result<Statement> {
        self.render(Some(1))
    }

    /// Compiles to `SELECT COUNT(*) as count`, ignoring ordering and paging.
    ///
    /// # Errors
    ///
    /// Same as [`Query::compile`].
    pub fn compile_count(&self) -> Result<Statement> {
        ensure_identifier(&self.table)?;
        let mut params = Vec::new();
        let mut sql = format!("SELECT COUNT(*) as count FROM {}", self.table);
        self.push_where(&mut sql, &mut params)?;
        Ok(Statement::new(sql, params))
    }

    fn render(&self, limit: Option<u64>) -> Result<Statement> {
        ensure_identifier(&self.table)?;
        let projection = if self.columns.is_empty() {
            String::from("*")
        } else {
            for column in &self.columns {
                ensure_identifier(column)?;
            }
            self.columns.join(", ")
        };

        let mut params = Vec::new();
        let mut sql = format!("SELECT {projection} FROM {}", self.table);
        self.push_where(&mut sql, &mut params)?;

        if !self.order.is_empty() {
            let mut terms = Vec::with_capacity(self.order.len());
            for (column, order) in &self.order {
                ensure_identifier(column)?;
                terms.push(format!("{column} {}", order.as_sql()));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let offset = match self.offset {
            Some(Offset::Raw(n)) => Some(n),
            Some(Offset::Page(page)) => {
                let size = self.limit.unwrap_or(0);
                Some(page.saturating_sub(1).saturating_mul(size))
            }
            None => None,
        };
        if let Some(offset) = offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        Ok(Statement::new(sql, params))
    }

    fn push_where(&self, sql: &mut String, params: &mut Vec<SqlValue>) -> Result<()> {
        let mut groups = Vec::with_capacity(self.groups.len());
        for group in &self.groups {
            let mut entries = Vec::with_capacity(group.len());
            for conditions in group {
                if let Some(expr) = render_conditions(conditions, params)? {
                    entries.push(expr);
                }
            }
            match entries.len() {
                0 => {}
                1 => groups.push((entries.remove(0), false)),
                _ => {
                    let alternatives: Vec<String> =
                        entries.iter().map(|e| format!("({e})")).collect();
                    groups.push((alternatives.join(" OR "), true));
                }
            }
        }

        if groups.is_empty() {
            return Ok(());
        }
        let several = groups.len() > 1;
        let rendered: Vec<String> = groups
            .into_iter()
            .map(|(expr, has_or)| {
                if several && has_or {
                    format!("({expr})")
                } else {
                    expr
                }
            })
            .collect();
        sql.push_str(" WHERE ");
        sql.push_str(&rendered.join(" AND "));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_select() {
        let stmt = Query::table("users").compile().unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM users");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn and_of_or_groups() {
        let stmt = Query::table("t")
            .where_clause(json!({"a": 1}))
            .or_where(json!({"b": 2}))
            .where_clause(json!({"c": 3}))
            .compile()
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM t WHERE ((a = ?) OR (b = ?)) AND c = ?"
        );
        assert_eq!(
            stmt.params,
            vec![SqlValue::Int(1), SqlValue::Int(2), SqlValue::Int(3)]
        );
    }

    #[test]
    fn or_where_without_group_starts_one() {
        let stmt = Query::table("t").or_where(json!({"a": 1})).compile().unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM t WHERE a = ?");
    }

    #[test]
    fn empty_conditions_are_skipped() {
        let stmt = Query::table("t").where_clause(json!({})).compile().unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM t");
    }

    #[test]
    fn page_offset_after_limit() {
        let stmt = Query::table("t").limit(5).offset(3).compile().unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM t LIMIT 5 OFFSET 10");
        let first_page = Query::table("t").limit(5).offset(0).compile().unwrap();
        assert_eq!(first_page.sql, "SELECT * FROM t LIMIT 5 OFFSET 0");
    }

    #[test]
    fn raw_offset_without_limit() {
        let stmt = Query::table("t").offset(10).compile().unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM t OFFSET 10");
        let later = Query::table("t").offset(10).limit(5).compile().unwrap();
        assert_eq!(later.sql, "SELECT * FROM t LIMIT 5 OFFSET 10");
    }

    #[test]
    fn projection_first_and_count() {
        let query = Query::table("users")
            .select(&["id", "email"])
            .where_clause(json!({"active": true}))
            .order_by("email", Order::Asc)
            .limit(20);
        assert_eq!(
            query.compile_first().unwrap().sql,
            "SELECT id, email FROM users WHERE active = ? ORDER BY email ASC LIMIT 1"
        );
        assert_eq!(
            query.compile_count().unwrap().sql,
            "SELECT COUNT(*) as count FROM users WHERE active = ?"
        );
    }

    #[test]
    fn identifiers_are_checked() {
        assert!(matches!(
            Query::table("users; DROP TABLE x").compile(),
            Err(CompileError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            Query::table("t").order_by("id desc", Order::Asc).compile(),
            Err(CompileError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            Query::table("t").select(&["*"]).compile(),
            Err(CompileError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn order_parsing() {
        assert_eq!(Order::parse("DESC").unwrap(), Order::Desc);
        assert_eq!(
            Order::parse("sideways"),
            Err(CompileError::InvalidDirection("sideways".into()))
        );
    }

    #[test]
    fn include_is_deduplicated() {
        let query = Query::table("orders").include("users").include("users");
        assert_eq!(query.includes(), ["users".to_string()]);
    }
}
