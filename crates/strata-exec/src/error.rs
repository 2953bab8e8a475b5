//! Error types for adapter construction.
//!
//! Execution failures never surface here: adapters report them inside
//! [`QueryResult`](strata_core::QueryResult). These are configuration errors,
//! fatal when the adapter or session is built.

use thiserror::Error;

/// Configuration errors raised while wiring adapters and sessions.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No embedded, actor or gateway binding serves this database.
    #[error("no adapter binding for database '{0}'")]
    NoBinding(String),

    /// A gateway is configured but holds no token for this database.
    #[error("gateway configured without a token for database '{0}'")]
    MissingToken(String),

    /// The gateway base URL is not an absolute http(s) URL.
    #[error("invalid gateway url '{0}'")]
    InvalidGatewayUrl(String),

    /// A session was requested without any table in the schema.
    #[error("a schema with at least one table is required")]
    MissingSchema,

    /// Opening the embedded store failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Spawning the actor failed.
    #[error("actor error: {0}")]
    Actor(String),

    /// Building the HTTP client failed.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for adapter construction.
pub type Result<T> = std::result::Result<T, ConfigError>;
