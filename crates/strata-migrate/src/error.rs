//! Error types for the migration system.

use std::path::PathBuf;

use strata_core::SchemaError;
use strata_exec::ConfigError;

/// Errors that can occur while loading, generating or applying migrations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Database error while opening the target store.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading/writing bundle files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Journal or snapshot (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The schema definition does not compile.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The adapter could not be wired.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The bundle directory or one of its files is unusable.
    #[error("Invalid migration bundle '{path}': {message}")]
    InvalidBundle {
        /// Offending path.
        path: PathBuf,
        /// What is wrong with it.
        message: String,
    },

    /// No bundle directory exists at the given path.
    #[error("Migrations directory not found: {0}")]
    MigrationsDirNotFound(PathBuf),

    /// A migration named by the journal has no SQL.
    #[error("Migration '{0}' has no SQL")]
    MissingSql(String),

    /// A synthesized initial migration would run against a database that
    /// already records applied migrations.
    #[error("Cannot synthesize an initial migration: {applied} migration(s) already recorded")]
    SynthesizedWithHistory {
        /// Number of recorded tags.
        applied: usize,
    },

    /// A statement of a migration failed; its batch was rolled back.
    #[error("Migration '{tag}' failed: {error}")]
    MigrationFailed {
        /// Tag of the failed migration.
        tag: String,
        /// Error reported by the adapter.
        error: String,
    },

    /// A live table could not be introspected.
    #[error("Introspection of '{table}' failed: {error}")]
    Introspection {
        /// Table name.
        table: String,
        /// Error reported by the adapter.
        error: String,
    },

    /// Reading or writing the history table failed.
    #[error("Migration history error: {0}")]
    History(String),
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
