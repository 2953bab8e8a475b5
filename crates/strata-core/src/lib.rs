//! # strata-core
//!
//! Schema-driven SQL compilation for multi-tenant SQLite stores.
//!
//! This crate provides:
//! - A column DSL compiled into a normalized schema and `CREATE TABLE` DDL
//! - A migration differ emitting additive-safe `ALTER TABLE` statements
//! - A query compiler turning fluent descriptions into parameterized SQL
//! - Relation descriptors resolved from `<singular>Id` naming
//!
//! Nothing here performs IO; execution lives in `strata-exec`.
//!
//! ## Schema
//!
//! ```rust
//! use strata_core::schema::SchemaDefinition;
//!
//! let schema = SchemaDefinition::new("shop")
//!     .column("users", "id", "integer primary key")
//!     .column("users", "email", "text not null unique")
//!     .compile()
//!     .unwrap();
//!
//! assert_eq!(
//!     schema.to_sql(),
//!     "CREATE TABLE IF NOT EXISTS users (\n  id INTEGER PRIMARY KEY,\n  email TEXT NOT NULL UNIQUE\n);\n"
//! );
//! ```
//!
//! ## Queries
//!
//! ```rust
//! use serde_json::json;
//! use strata_core::query::Query;
//!
//! let stmt = Query::table("users")
//!     .where_clause(json!({"name": "'; DROP TABLE users; --"}))
//!     .compile()
//!     .unwrap();
//!
//! assert_eq!(stmt.sql, "SELECT * FROM users WHERE name = ?");
//! ```

pub mod diff;
pub mod error;
pub mod query;
pub mod result;
pub mod schema;
pub mod sql;
pub mod value;

pub use diff::{diff_schemas, DiffWarning, MigrationDiff};
pub use error::{CompileError, SchemaError};
pub use query::{Order, Query};
pub use result::{QueryMeta, QueryResult, Statement, StatementResult};
pub use schema::{NormalizedSchema, RelationMap, SchemaDefinition};
pub use value::{Row, SqlValue, ToSqlValue};
