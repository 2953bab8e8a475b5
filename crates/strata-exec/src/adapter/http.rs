//! HTTP adapter: forwards statements to a gateway over an authenticated
//! JSON API.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use strata_core::{QueryMeta, QueryResult, Statement, StatementResult};
use tracing::{debug, warn};

use super::wire::{
    BatchRequest, ErrorBody, FirstRequest, RawRequest, ScriptRequest, BOOKMARK_HEADER,
    DB_NAME_HEADER, DB_TOKEN_HEADER,
};
use super::{Adapter, AdapterKind};
use crate::config::GatewayEndpoint;
use crate::error::{ConfigError, Result};

/// Adapter talking to a gateway for one logical database.
#[derive(Debug, Clone)]
pub struct HttpAdapter {
    client: reqwest::Client,
    base_url: String,
    gateway_key: String,
    db_name: String,
    db_token: String,
}

impl HttpAdapter {
    /// Creates an adapter for `db_name` using `db_token`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidGatewayUrl`] unless the base URL is an
    /// absolute `http(s)://` URL.
    pub fn new(
        client: reqwest::Client,
        endpoint: &GatewayEndpoint,
        db_name: impl Into<String>,
        db_token: impl Into<String>,
    ) -> Result<Self> {
        let base_url = endpoint.base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidGatewayUrl(endpoint.base_url.clone()));
        }
        Ok(Self {
            client,
            base_url,
            gateway_key: endpoint.gateway_key.clone(),
            db_name: db_name.into(),
            db_token: db_token.into(),
        })
    }

    async fn post<B, T>(&self, path: &str, body: &B, bookmark: Option<&str>) -> QueryResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned + Send,
    {
        let started = Instant::now();
        let mut request = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.gateway_key)
            .header(DB_NAME_HEADER, &self.db_name)
            .header(DB_TOKEN_HEADER, &self.db_token)
            .json(body);
        if let Some(bookmark) = bookmark {
            request = request.header(BOOKMARK_HEADER, bookmark);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(path, error = %e, "Gateway request failed");
                return QueryResult::failure(format!("gateway request failed: {e}"));
            }
        };
        let status = response.status();
        let echoed = response
            .headers()
            .get(BOOKMARK_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return QueryResult::failure(format!("gateway response unreadable: {e}")),
        };
        debug!(path, status = %status, elapsed_ms = started.elapsed().as_millis(), "Gateway responded");

        match serde_json::from_str::<QueryResult<T>>(&text) {
            Ok(mut result) => {
                if let Some(bookmark) = echoed {
                    result.meta.get_or_insert_with(QueryMeta::default).bookmark = Some(bookmark);
                }
                result
            }
            Err(_) if !status.is_success() => QueryResult::failure(error_message(status, &text)),
            Err(e) => QueryResult::failure(format!("invalid gateway response: {e}")),
        }
    }
}

/// Extracts the message of a non-2xx response: the `{error}` JSON body when
/// present, the wrapped text otherwise.
fn error_message(status: StatusCode, text: &str) -> String {
    match serde_json::from_str::<ErrorBody>(text) {
        Ok(ErrorBody {
            error,
            reason: Some(reason),
        }) => format!("{error} ({reason})"),
        Ok(ErrorBody { error, reason: None }) => error,
        Err(_) if text.trim().is_empty() => format!("gateway responded {status}"),
        Err(_) => format!("gateway responded {status}: {}", text.trim()),
    }
}

/// A `first` that matched no row carries `null` data, which JSON cannot tell
/// apart from an absent payload; restore it so every adapter answers alike.
fn present_first(mut result: QueryResult<Value>) -> QueryResult<Value> {
    if result.success && result.data.is_none() {
        result.data = Some(Value::Null);
    }
    result
}

#[async_trait]
impl Adapter for HttpAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Http
    }

    async fn exec(&self, statement: &Statement, bookmark: Option<&str>) -> StatementResult {
        self.post("/api/run", statement, bookmark).await
    }

    async fn batch(&self, statements: &[Statement], bookmark: Option<&str>) -> StatementResult {
        let body = BatchRequest {
            batch: statements.to_vec(),
        };
        self.post("/api/batch", &body, bookmark).await
    }

    async fn raw(
        &self,
        statement: &Statement,
        column_names: bool,
        bookmark: Option<&str>,
    ) -> QueryResult<Vec<Vec<Value>>> {
        let body = RawRequest {
            statement: statement.clone(),
            column_names,
        };
        self.post("/api/raw", &body, bookmark).await
    }

    async fn first(
        &self,
        statement: &Statement,
        column: Option<&str>,
        bookmark: Option<&str>,
    ) -> QueryResult<Value> {
        let body = FirstRequest {
            statement: statement.clone(),
            column_name: column.map(str::to_string),
        };
        present_first(self.post("/api/first", &body, bookmark).await)
    }

    async fn script(&self, sql: &str, bookmark: Option<&str>) -> StatementResult {
        let body = ScriptRequest {
            query: sql.to_string(),
        };
        self.post("/api/exec", &body, bookmark).await
    }
}
