//! SQL values and parameter handling.
//!
//! Every value that reaches an adapter travels as a bound parameter, never
//! spliced into SQL text. Rows coming back are plain JSON objects so the
//! same shape crosses the embedded, actor and HTTP adapters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A row as returned by any adapter: column name → JSON value, in column order.
pub type Row = Map<String, Value>;

/// A SQL value that can be used as a parameter.
///
/// Serialized untagged so a parameter list is a plain JSON array on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// NULL value.
    Null,
    /// Boolean value, stored as 0/1 by SQLite.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Binary blob value.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Returns the SQL representation for inline use (escaped).
    ///
    /// Only DDL defaults use this; queries always bind parameters.
    #[must_use]
    pub fn to_sql_inline(&self) -> String {
        match self {
            Self::Null => String::from("NULL"),
            Self::Bool(b) => String::from(if *b { "1" } else { "0" }),
            Self::Int(n) => format!("{n}"),
            Self::Float(f) => format!("{f}"),
            Self::Text(s) => quote_literal(s),
            Self::Blob(b) => {
                let hex: String = b.iter().map(|byte| format!("{byte:02X}")).collect();
                format!("X'{hex}'")
            }
        }
    }

    /// Converts a JSON value into a bindable parameter.
    ///
    /// Objects and arrays are stored as their JSON text, which is how `json`
    /// columns persist. Returns `None` for numbers that fit neither `i64`
    /// nor `f64`.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float)),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => Some(Self::Text(value.to_string())),
        }
    }

    /// Converts the value back into JSON, as adapters report it in rows.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Self::Text(s) => Value::String(s.clone()),
            Self::Blob(b) => Value::Array(b.iter().map(|byte| Value::from(*byte)).collect()),
        }
    }

    /// Returns the parameter placeholder.
    #[must_use]
    pub const fn placeholder() -> &'static str {
        "?"
    }
}

/// Quotes a string literal, doubling embedded single quotes.
#[must_use]
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Trait for types that can be converted to SQL values.
pub trait ToSqlValue {
    /// Converts the value to a `SqlValue`.
    fn to_sql_value(self) -> SqlValue;
}

impl ToSqlValue for SqlValue {
    fn to_sql_value(self) -> SqlValue {
        self
    }
}

impl ToSqlValue for bool {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Bool(self)
    }
}

impl ToSqlValue for i64 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Int(self)
    }
}

impl ToSqlValue for i32 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Int(i64::from(self))
    }
}

impl ToSqlValue for u32 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Int(i64::from(self))
    }
}

impl ToSqlValue for f64 {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Float(self)
    }
}

impl ToSqlValue for String {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self)
    }
}

impl ToSqlValue for &str {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Text(self.to_string())
    }
}

impl ToSqlValue for Vec<u8> {
    fn to_sql_value(self) -> SqlValue {
        SqlValue::Blob(self)
    }
}

impl<T: ToSqlValue> ToSqlValue for Option<T> {
    fn to_sql_value(self) -> SqlValue {
        self.map_or(SqlValue::Null, ToSqlValue::to_sql_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inline_rendering_escapes_quotes() {
        assert_eq!(SqlValue::Text("it's".into()).to_sql_inline(), "'it''s'");
        assert_eq!(SqlValue::Bool(true).to_sql_inline(), "1");
        assert_eq!(SqlValue::Null.to_sql_inline(), "NULL");
        assert_eq!(SqlValue::Blob(vec![0xAB, 0x01]).to_sql_inline(), "X'AB01'");
    }

    #[test]
    fn json_objects_bind_as_text() {
        let value = SqlValue::from_json(&json!({"a": 1})).unwrap();
        assert_eq!(value, SqlValue::Text(r#"{"a":1}"#.into()));
        assert_eq!(SqlValue::from_json(&json!(2.5)), Some(SqlValue::Float(2.5)));
        assert_eq!(SqlValue::from_json(&json!(7)), Some(SqlValue::Int(7)));
    }

    #[test]
    fn params_serialize_as_plain_json() {
        let params = vec![
            SqlValue::Text("a".into()),
            SqlValue::Int(1),
            SqlValue::Null,
            SqlValue::Bool(false),
        ];
        let encoded = serde_json::to_string(&params).unwrap();
        assert_eq!(encoded, r#"["a",1,null,false]"#);
        let decoded: Vec<SqlValue> = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, params);
    }

    #[test]
    fn option_maps_to_null() {
        assert_eq!(None::<i64>.to_sql_value(), SqlValue::Null);
        assert_eq!(Some("x").to_sql_value(), SqlValue::Text("x".into()));
    }
}
