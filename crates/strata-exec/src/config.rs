//! Library configuration for the HTTP fallback.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Where and how to reach a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayEndpoint {
    /// Base URL, e.g. `https://db.example.com`.
    pub base_url: String,
    /// Shared key sent as `Authorization: Bearer`.
    pub gateway_key: String,
    /// Per-database tokens sent as `x-db-token`.
    #[serde(default)]
    pub db_tokens: HashMap<String, String>,
}

impl GatewayEndpoint {
    /// Creates an endpoint without tokens.
    #[must_use]
    pub fn new(base_url: impl Into<String>, gateway_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            gateway_key: gateway_key.into(),
            db_tokens: HashMap::new(),
        }
    }

    /// Registers the token for a database.
    #[must_use]
    pub fn with_token(mut self, db_name: impl Into<String>, token: impl Into<String>) -> Self {
        self.db_tokens.insert(db_name.into(), token.into());
        self
    }
}
