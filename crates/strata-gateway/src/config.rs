//! Gateway configuration managed by Figment.
//!
//! Sources, later ones winning:
//!
//! 1. built-in defaults
//! 2. `strata-gateway.toml` (or the file passed on the command line)
//! 3. `STRATA_GATEWAY_*` environment variables, `__` separating nested keys
//!    (`STRATA_GATEWAY_DATABASES__MAIN__URL=sqlite:main.db`)
//!
//! ```toml
//! listen_addr = "127.0.0.1"
//! listen_port = 8787
//! gateway_key = "..."
//! token_secret = "..."
//!
//! [databases.main]
//! url = "sqlite:main.db"
//!
//! [databases.audit]
//! url = "sqlite:audit.db"
//! actor = true
//! ```

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "strata-gateway.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "STRATA_GATEWAY_";

/// One database served by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL.
    pub url: String,
    /// Serialize access through a dedicated actor instead of a shared pool.
    #[serde(default)]
    pub actor: bool,
}

/// Complete gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Listen address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: IpAddr,
    /// Listen port.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Bearer key every request must present (required, non-empty).
    #[serde(default)]
    pub gateway_key: String,
    /// Secret signing per-database tokens (required, non-empty).
    #[serde(default)]
    pub token_secret: String,
    /// Lifetime of tokens issued by the `token` command, in seconds.
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    /// Served databases by logical name.
    #[serde(default)]
    pub databases: BTreeMap<String, DatabaseConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            listen_port: default_listen_port(),
            // No insecure defaults; `validate` enforces both.
            gateway_key: String::new(),
            token_secret: String::new(),
            token_ttl_secs: default_token_ttl_secs(),
            databases: BTreeMap::new(),
        }
    }
}

impl GatewayConfig {
    /// Builds a Figment merging defaults, `path` when it exists, and the
    /// environment.
    #[must_use]
    pub fn figment(path: &Path) -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(Self::default()));
        let figment = if path.is_file() {
            figment.merge(Toml::file(path))
        } else {
            figment
        };
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Loads and validates the configuration.
    ///
    /// # Errors
    ///
    /// Fails when extraction fails or validation rejects the result.
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks required settings.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] for an empty key or secret.
    pub fn validate(&self) -> Result<()> {
        if self.gateway_key.trim().is_empty() {
            return Err(GatewayError::Config(
                "gateway_key must be set and non-empty".to_string(),
            ));
        }
        if self.token_secret.trim().is_empty() {
            return Err(GatewayError::Config(
                "token_secret must be set and non-empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the socket address to bind.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_addr, self.listen_port)
    }
}

const fn default_listen_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

const fn default_listen_port() -> u16 {
    8787
}

const fn default_token_ttl_secs() -> u64 {
    30 * 24 * 3600
}
