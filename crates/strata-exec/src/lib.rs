//! # strata-exec
//!
//! Runs compiled statements against a logical database through one of three
//! interchangeable adapters:
//!
//! - [`SqliteAdapter`]: an in-process sqlx SQLite pool
//! - [`ActorAdapter`]: a ractor actor that owns its pool and serializes access
//! - [`HttpAdapter`]: an authenticated gateway reached over HTTP
//!
//! [`AdapterFactory`] picks the adapter once per database name. [`Db`] binds
//! it to a compiled schema, and [`Session`] tracks the read-after-write
//! bookmark for one caller.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use sqlx::sqlite::SqlitePoolOptions;
//! use strata_core::{Query, SchemaDefinition};
//! use strata_exec::{AdapterFactory, Bindings, Db};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await?;
//! let factory = AdapterFactory::new(Bindings::new().embedded("main", pool))?;
//! let schema = SchemaDefinition::new("app")
//!     .column("users", "id", "integer primary key")
//!     .compile()?;
//!
//! let db = Db::new(factory.adapter_for("main")?, schema)?;
//! let mut session = db.session();
//! let _users = session.fetch(&Query::table("users").where_clause(json!({"id": 1}))).await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod bookmark;
pub mod config;
pub mod error;
pub mod factory;
pub mod session;

pub use adapter::{
    ActorAdapter, Adapter, AdapterKind, HttpAdapter, SqlActorHandle, SqliteAdapter,
};
pub use bookmark::BookmarkTracker;
pub use config::GatewayEndpoint;
pub use error::ConfigError;
pub use factory::{AdapterFactory, Bindings};
pub use session::{Db, Session};
