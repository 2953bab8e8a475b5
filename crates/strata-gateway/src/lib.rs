//! HTTP gateway and per-database tokens for strata stores.
//!
//! The gateway exposes a set of databases over `POST /api/{run,exec,batch,raw,first}`.
//! Callers authenticate twice: a shared bearer key for the gateway itself,
//! and a stateless token bound to one database name:
//!
//! ```rust
//! use std::time::Duration;
//! use strata_gateway::token;
//!
//! let issued = token::issue("main", "secret", Duration::from_secs(60)).unwrap();
//! assert!(token::validate("main", &issued, "secret").is_ok());
//! assert!(token::validate("other", &issued, "secret").is_err());
//! ```
//!
//! [`strata_exec::HttpAdapter`] is the matching client.

pub mod config;
pub mod error;
pub mod server;
pub mod token;

pub use config::{DatabaseConfig, GatewayConfig};
pub use error::{GatewayError, Result};
pub use server::{gateway_router, AccessError, DbAccess, GatewayState};
pub use token::{TokenClaims, TokenError, TokenRejection};
