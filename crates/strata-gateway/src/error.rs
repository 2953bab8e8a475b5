//! Error types for the gateway service.

use strata_exec::ConfigError;

use crate::token::TokenError;

/// Errors raised while configuring or starting the gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A required setting is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The configuration sources could not be merged or extracted.
    #[error("Failed to load configuration: {0}")]
    Figment(#[from] Box<figment::Error>),

    /// Token service misconfiguration.
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// Opening a database failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Wiring an adapter failed.
    #[error("Adapter error: {0}")]
    Adapter(#[from] ConfigError),

    /// Binding the listener or serving failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for GatewayError {
    fn from(error: figment::Error) -> Self {
        Self::Figment(Box::new(error))
    }
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
