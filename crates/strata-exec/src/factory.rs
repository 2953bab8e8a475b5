//! Construction-time adapter selection.
//!
//! For each logical database name the factory picks, in order: an embedded
//! pool binding, an actor binding, then the HTTP gateway. The choice is made
//! once and memoized; callers get an `Arc<dyn Adapter>` and never branch on
//! the transport again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::adapter::{ActorAdapter, Adapter, HttpAdapter, SqlActorHandle, SqliteAdapter};
use crate::config::GatewayEndpoint;
use crate::error::{ConfigError, Result};

/// Explicit transport bindings, keyed by logical database name.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    embedded: HashMap<String, SqlitePool>,
    actors: HashMap<String, SqlActorHandle>,
    gateway: Option<GatewayEndpoint>,
}

impl Bindings {
    /// Creates empty bindings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a database to an in-process pool.
    #[must_use]
    pub fn embedded(mut self, db_name: impl Into<String>, pool: SqlitePool) -> Self {
        self.embedded.insert(db_name.into(), pool);
        self
    }

    /// Binds a database to a running SQL actor.
    #[must_use]
    pub fn actor(mut self, db_name: impl Into<String>, handle: SqlActorHandle) -> Self {
        self.actors.insert(db_name.into(), handle);
        self
    }

    /// Sets the gateway used for databases without a local binding.
    #[must_use]
    pub fn gateway(mut self, endpoint: GatewayEndpoint) -> Self {
        self.gateway = Some(endpoint);
        self
    }
}

/// Hands out one memoized adapter per database name.
pub struct AdapterFactory {
    bindings: Bindings,
    client: reqwest::Client,
    cache: Mutex<HashMap<String, Arc<dyn Adapter>>>,
}

impl AdapterFactory {
    /// Creates a factory over `bindings`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Http`] if the HTTP client cannot be built.
    pub fn new(bindings: Bindings) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            bindings,
            client,
            cache: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the adapter for `db_name`, selecting it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoBinding`] when nothing serves the database,
    /// or a gateway error when the HTTP fallback is misconfigured.
    pub fn adapter_for(&self, db_name: &str) -> Result<Arc<dyn Adapter>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(adapter) = cache.get(db_name) {
            debug!(db = db_name, "Reusing adapter");
            return Ok(Arc::clone(adapter));
        }

        let adapter = self.select(db_name)?;
        info!(db = db_name, kind = %adapter.kind(), "Selected adapter");
        cache.insert(db_name.to_string(), Arc::clone(&adapter));
        Ok(adapter)
    }

    fn select(&self, db_name: &str) -> Result<Arc<dyn Adapter>> {
        if let Some(pool) = self.bindings.embedded.get(db_name) {
            return Ok(Arc::new(SqliteAdapter::new(pool.clone())));
        }
        if let Some(handle) = self.bindings.actors.get(db_name) {
            return Ok(Arc::new(ActorAdapter::new(handle.clone())));
        }
        let Some(endpoint) = &self.bindings.gateway else {
            return Err(ConfigError::NoBinding(db_name.to_string()));
        };
        let token = endpoint
            .db_tokens
            .get(db_name)
            .ok_or_else(|| ConfigError::MissingToken(db_name.to_string()))?;
        let adapter = HttpAdapter::new(self.client.clone(), endpoint, db_name, token.as_str())?;
        Ok(Arc::new(adapter))
    }
}
