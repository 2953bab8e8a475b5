//! Request bodies and headers of the gateway HTTP surface.

use serde::{Deserialize, Serialize};
use strata_core::Statement;

/// Header carrying the logical database name.
pub const DB_NAME_HEADER: &str = "x-db-name";

/// Header carrying the per-database gateway token.
pub const DB_TOKEN_HEADER: &str = "x-db-token";

/// Request and response header carrying the consistency bookmark.
pub const BOOKMARK_HEADER: &str = "x-d1-bookmark";

/// `POST /api/exec`: a multi-statement script without parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptRequest {
    /// Script text.
    pub query: String,
}

/// `POST /api/batch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Statements, applied atomically.
    pub batch: Vec<Statement>,
}

/// `POST /api/raw`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRequest {
    /// Statement to run.
    #[serde(flatten)]
    pub statement: Statement,
    /// Prepend a header row of column names.
    #[serde(default)]
    pub column_names: bool,
}

/// `POST /api/first`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstRequest {
    /// Statement to run.
    #[serde(flatten)]
    pub statement: Statement,
    /// Return only this column of the first row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
}

/// Body of a rejected request (`401`, `404`, malformed input).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human readable message.
    pub error: String,
    /// Machine-readable reason, for token rejections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_core::SqlValue;

    #[test]
    fn raw_request_flattens_statement() {
        let request = RawRequest {
            statement: Statement::new("SELECT ?", vec![SqlValue::Int(1)]),
            column_names: true,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"query": "SELECT ?", "params": [1], "columnNames": true})
        );
    }

    #[test]
    fn first_request_defaults() {
        let parsed: FirstRequest = serde_json::from_value(json!({"query": "SELECT 1"})).unwrap();
        assert_eq!(parsed.column_name, None);
        assert!(parsed.statement.params.is_empty());
    }
}
