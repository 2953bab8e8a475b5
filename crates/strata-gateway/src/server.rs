//! The gateway HTTP surface.
//!
//! Every route is `POST /api/<op>` with a JSON body and three headers:
//! `Authorization: Bearer <gateway key>`, `x-db-name`, and an `x-db-token`
//! issued for that database. `x-d1-bookmark` is forwarded to the adapter and
//! echoed back when the store reports one.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, HeaderMapExt};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use strata_core::{QueryResult, Statement};
use strata_exec::adapter::wire::{
    BatchRequest, ErrorBody, FirstRequest, RawRequest, ScriptRequest, BOOKMARK_HEADER,
    DB_NAME_HEADER, DB_TOKEN_HEADER,
};
use strata_exec::{Adapter, AdapterFactory, Bindings, SqlActorHandle};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::token::{self, TokenError};

/// Shared state of the gateway router.
#[derive(Clone)]
pub struct GatewayState {
    gateway_key: Arc<str>,
    token_secret: Arc<str>,
    databases: Arc<HashMap<String, Arc<dyn Adapter>>>,
}

impl GatewayState {
    /// Creates a state serving no database yet.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] for an empty key and
    /// [`GatewayError::Token`] for an empty secret.
    pub fn new(gateway_key: &str, token_secret: &str) -> Result<Self> {
        if gateway_key.is_empty() {
            return Err(GatewayError::Config(
                "gateway key must not be empty".to_string(),
            ));
        }
        if token_secret.is_empty() {
            return Err(TokenError::EmptySecret.into());
        }
        Ok(Self {
            gateway_key: Arc::from(gateway_key),
            token_secret: Arc::from(token_secret),
            databases: Arc::new(HashMap::new()),
        })
    }

    /// Serves `adapter` under the logical name `db_name`.
    #[must_use]
    pub fn with_database(mut self, db_name: impl Into<String>, adapter: Arc<dyn Adapter>) -> Self {
        Arc::make_mut(&mut self.databases).insert(db_name.into(), adapter);
        self
    }

    /// Opens every database of `config`, each through the adapter factory.
    ///
    /// # Errors
    ///
    /// Fails on invalid settings, unreachable databases, or actor spawn
    /// failures.
    pub async fn from_config(config: &GatewayConfig) -> Result<Self> {
        config.validate()?;
        let mut bindings = Bindings::new();
        for (name, database) in &config.databases {
            let options = SqliteConnectOptions::from_str(&database.url)?.create_if_missing(true);
            let pool = SqlitePoolOptions::new().connect_with(options).await?;
            bindings = if database.actor {
                let handle = SqlActorHandle::spawn(Some(format!("gateway-{name}")), pool).await?;
                bindings.actor(name.clone(), handle)
            } else {
                bindings.embedded(name.clone(), pool)
            };
        }

        let factory = AdapterFactory::new(bindings)?;
        let mut state = Self::new(&config.gateway_key, &config.token_secret)?;
        for name in config.databases.keys() {
            let adapter = factory.adapter_for(name)?;
            info!(db = %name, kind = %adapter.kind(), "Serving database");
            state = state.with_database(name.clone(), adapter);
        }
        Ok(state)
    }

    /// Returns the served database names.
    pub fn database_names(&self) -> impl Iterator<Item = &str> {
        self.databases.keys().map(String::as_str)
    }
}

/// Builds the router with every `/api` route.
pub fn gateway_router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/run", post(run))
        .route("/api/exec", post(exec))
        .route("/api/batch", post(batch))
        .route("/api/raw", post(raw))
        .route("/api/first", post(first))
        .with_state(state)
}

/// An authenticated request for one database.
pub struct DbAccess {
    /// Logical database name.
    pub db_name: String,
    /// Adapter serving it.
    pub adapter: Arc<dyn Adapter>,
    /// Bookmark sent by the client.
    pub bookmark: Option<String>,
}

impl FromRequestParts<GatewayState> for DbAccess {
    type Rejection = AccessError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &GatewayState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .typed_get::<Authorization<Bearer>>()
            .ok_or(AccessError::MissingKey)?;
        if !bool::from(key.token().as_bytes().ct_eq(state.gateway_key.as_bytes())) {
            return Err(AccessError::InvalidKey);
        }

        let db_name = header(&parts.headers, DB_NAME_HEADER).ok_or(AccessError::MissingDbName)?;
        let db_token =
            header(&parts.headers, DB_TOKEN_HEADER).ok_or(AccessError::MissingDbToken)?;
        match token::validate(&db_name, &db_token, &state.token_secret) {
            Ok(_) => {}
            Err(TokenError::Rejected(rejection)) => {
                return Err(AccessError::Token(rejection.reason()));
            }
            Err(e) => {
                warn!(error = %e, "Token validation misconfigured");
                return Err(AccessError::Internal);
            }
        }

        let adapter = state
            .databases
            .get(&db_name)
            .cloned()
            .ok_or_else(|| AccessError::UnknownDatabase(db_name.clone()))?;
        Ok(Self {
            db_name,
            adapter,
            bookmark: header(&parts.headers, BOOKMARK_HEADER),
        })
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Why a request was refused before reaching an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// No bearer key.
    MissingKey,
    /// Wrong bearer key.
    InvalidKey,
    /// No `x-db-name` header.
    MissingDbName,
    /// No `x-db-token` header.
    MissingDbToken,
    /// Token refused, with its reason code.
    Token(&'static str),
    /// No adapter serves this database.
    UnknownDatabase(String),
    /// The token service is misconfigured.
    Internal,
}

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        let (status, error, reason) = match self {
            Self::MissingKey => (
                StatusCode::UNAUTHORIZED,
                "unauthorized".to_string(),
                Some("missing_gateway_key"),
            ),
            Self::InvalidKey => (
                StatusCode::UNAUTHORIZED,
                "unauthorized".to_string(),
                Some("invalid_gateway_key"),
            ),
            Self::MissingDbName => (
                StatusCode::BAD_REQUEST,
                format!("missing {DB_NAME_HEADER} header"),
                None,
            ),
            Self::MissingDbToken => (
                StatusCode::UNAUTHORIZED,
                "invalid database token".to_string(),
                Some("missing_token"),
            ),
            Self::Token(reason) => (
                StatusCode::UNAUTHORIZED,
                "invalid database token".to_string(),
                Some(reason),
            ),
            Self::UnknownDatabase(db_name) => (
                StatusCode::NOT_FOUND,
                format!("unknown database '{db_name}'"),
                None,
            ),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
                None,
            ),
        };
        let body = ErrorBody {
            error,
            reason: reason.map(str::to_string),
        };
        (status, Json(body)).into_response()
    }
}

/// Answers with the result JSON: `200` on success, `400` on failure, plus
/// the bookmark header when the store reported one.
fn respond<T: Serialize>(db_name: &str, result: &QueryResult<T>) -> Response {
    let status = if result.success {
        StatusCode::OK
    } else {
        debug!(db = db_name, error = ?result.error, "Statement failed");
        StatusCode::BAD_REQUEST
    };
    let bookmark = result
        .bookmark()
        .and_then(|b| HeaderValue::from_str(b).ok());
    let mut response = (status, Json(result)).into_response();
    if let Some(bookmark) = bookmark {
        response.headers_mut().insert(BOOKMARK_HEADER, bookmark);
    }
    response
}

async fn run(
    access: DbAccess,
    Json(statement): Json<Statement>,
) -> Response {
    let result = access
        .adapter
        .exec(&statement, access.bookmark.as_deref())
        .await;
    respond(&access.db_name, &result)
}

async fn exec(
    access: DbAccess,
    Json(request): Json<ScriptRequest>,
) -> Response {
    let result = access
        .adapter
        .script(&request.query, access.bookmark.as_deref())
        .await;
    respond(&access.db_name, &result)
}

async fn batch(
    access: DbAccess,
    Json(request): Json<BatchRequest>,
) -> Response {
    let result = access
        .adapter
        .batch(&request.batch, access.bookmark.as_deref())
        .await;
    respond(&access.db_name, &result)
}

async fn raw(
    access: DbAccess,
    Json(request): Json<RawRequest>,
) -> Response {
    let result = access
        .adapter
        .raw(
            &request.statement,
            request.column_names,
            access.bookmark.as_deref(),
        )
        .await;
    respond(&access.db_name, &result)
}

async fn first(
    access: DbAccess,
    Json(request): Json<FirstRequest>,
) -> Response {
    let result = access
        .adapter
        .first(
            &request.statement,
            request.column_name.as_deref(),
            access.bookmark.as_deref(),
        )
        .await;
    respond(&access.db_name, &result)
}
