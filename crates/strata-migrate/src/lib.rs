//! Journal-driven schema migrations for strata databases.
//!
//! A migration bundle is an ordered journal plus one SQL file per entry.
//! The runner records every applied tag in a `migrations_history` table
//! inside the target database, and applies each pending migration together
//! with its history row as a single atomic batch: a failure leaves nothing
//! behind and the next run retries that migration from scratch.
//!
//! The runner only talks to an [`Adapter`](strata_exec::Adapter), so the same
//! bundle applies to an embedded pool, an actor, or a remote gateway.
//!
//! # Components
//!
//! - **Bundle** - Loads and writes journals, SQL files and schema snapshots
//! - **History** - The `migrations_history` table
//! - **Runner** - Applies pending migrations in journal order
//! - **Introspect** - Reads the live schema back for verification
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata_exec::SqliteAdapter;
//! use strata_migrate::{MigrationBundle, MigrationRunner, MigrationSource};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let adapter = Arc::new(SqliteAdapter::connect("sqlite::memory:").await?);
//! let bundle = MigrationBundle::new()
//!     .with_entry("0000_initial", "CREATE TABLE users (id INTEGER PRIMARY KEY);");
//!
//! let mut runner = MigrationRunner::new(adapter);
//! let report = runner.run(&MigrationSource::Bundle(bundle)).await?;
//! assert_eq!(report.applied, ["0000_initial"]);
//! # Ok(())
//! # }
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Write the next migration from a schema definition
//! strata-migrate generate --schema schema.json --name add_orders
//!
//! # Apply pending migrations
//! strata-migrate migrate
//!
//! # Show applied/pending state
//! strata-migrate status
//! ```

pub mod bundle;
pub mod error;
pub mod history;
pub mod introspect;
pub mod runner;

pub use bundle::{generate, GeneratedMigration, Journal, JournalEntry, Migration, MigrationBundle};
pub use error::{MigrateError, Result};
pub use history::{AppliedMigration, MigrationHistory};
pub use introspect::{table_info, verify, ColumnInfo, Drift};
pub use runner::{
    migrate_and_open, MigrationReport, MigrationRunner, MigrationSource, MigrationStatus,
    INITIAL_TAG,
};
