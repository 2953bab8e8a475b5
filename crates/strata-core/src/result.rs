//! The result contract shared by every adapter, and the statement wire shape.

use serde::{Deserialize, Serialize};

use crate::value::{Row, SqlValue};

/// A single parameterized statement.
///
/// Serialized as `{"query": ..., "params": [...]}`, the body of the gateway's
/// `/api/run` endpoint and the element type of `/api/batch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// SQL text with `?` placeholders.
    #[serde(rename = "query")]
    pub sql: String,
    /// Parameters bound in order.
    #[serde(default)]
    pub params: Vec<SqlValue>,
}

impl Statement {
    /// Creates a statement with parameters.
    #[must_use]
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Creates a statement without parameters.
    #[must_use]
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }
}

/// Execution metadata reported alongside a result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMeta {
    /// Rows inserted, updated or deleted.
    #[serde(default)]
    pub changes: u64,
    /// Row id of the last insert, when the statement wrote rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_row_id: Option<i64>,
    /// Wall-clock time spent in the backing store.
    #[serde(default)]
    pub duration_ms: f64,
    /// Consistency bookmark after this statement, when the store reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<String>,
}

/// Result of one statement: the rows it produced.
pub type StatementResult = QueryResult<Vec<Row>>;

/// Uniform result of every adapter call.
///
/// Execution failures are captured here rather than raised; callers inspect
/// `success` and `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult<T> {
    /// Whether the statement (or the whole batch) succeeded.
    pub success: bool,
    /// The payload: rows, a single row, a count, depending on the call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Per-statement results of a batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<StatementResult>>,
    /// Error message when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Execution metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<QueryMeta>,
}

impl<T> QueryResult<T> {
    /// A successful result carrying `data`.
    #[must_use]
    pub const fn ok(data: T, meta: QueryMeta) -> Self {
        Self {
            success: true,
            data: Some(data),
            results: None,
            error: None,
            meta: Some(meta),
        }
    }

    /// A failed result carrying an error message.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            results: None,
            error: Some(error.into()),
            meta: None,
        }
    }

    /// Returns the bookmark reported by the store, if any.
    #[must_use]
    pub fn bookmark(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|m| m.bookmark.as_deref())
    }

    /// Transforms the payload, keeping success, error and metadata.
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueryResult<U> {
        QueryResult {
            success: self.success,
            data: self.data.map(f),
            results: self.results,
            error: self.error,
            meta: self.meta,
        }
    }

    /// Re-types a failed result, dropping any payload.
    #[must_use]
    pub fn into_failure<U>(self) -> QueryResult<U> {
        QueryResult {
            success: false,
            data: None,
            results: self.results,
            error: self.error,
            meta: self.meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn statement_uses_query_key_on_the_wire() {
        let stmt = Statement::new("SELECT ?", vec![SqlValue::Int(1)]);
        assert_eq!(
            serde_json::to_value(&stmt).unwrap(),
            json!({"query": "SELECT ?", "params": [1]})
        );
        let parsed: Statement = serde_json::from_value(json!({"query": "SELECT 1"})).unwrap();
        assert!(parsed.params.is_empty());
    }

    #[test]
    fn failure_omits_empty_fields() {
        let result: QueryResult<Vec<Row>> = QueryResult::failure("boom");
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"success": false, "error": "boom"})
        );
    }

    fn decode<T: serde::de::DeserializeOwned>(text: &str) -> QueryResult<T> {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn decodes_without_default_payload() {
        struct Opaque;
        impl<'de> Deserialize<'de> for Opaque {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                serde::de::IgnoredAny::deserialize(d).map(|_| Self)
            }
        }

        let result: QueryResult<Opaque> = decode(r#"{"success": false, "error": "boom"}"#);
        assert!(result.data.is_none());
        assert_eq!(result.error.as_deref(), Some("boom"));

        let rows: StatementResult = decode(r#"{"success": true, "data": [{"id": 1}]}"#);
        assert_eq!(rows.data.unwrap()[0]["id"], json!(1));
    }

    #[test]
    fn meta_is_camel_case() {
        let meta = QueryMeta {
            changes: 1,
            last_row_id: Some(9),
            duration_ms: 0.5,
            bookmark: Some("00000001".into()),
        };
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["lastRowId"], json!(9));
        assert_eq!(value["durationMs"], json!(0.5));
    }

    #[test]
    fn map_keeps_metadata() {
        let result = QueryResult::ok(vec![1, 2], QueryMeta::default()).map(|v| v.len());
        assert!(result.success);
        assert_eq!(result.data, Some(2));
        assert!(result.meta.is_some());
    }
}
