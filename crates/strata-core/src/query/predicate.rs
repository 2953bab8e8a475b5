//! Condition objects and their SQL rendering.
//!
//! A condition is a JSON object mapping column names to predicates:
//!
//! | Shape | SQL |
//! |---|---|
//! | `"x"`, `1`, `true` | `col = ?` |
//! | `"%x"` (contains `%`) | `col LIKE ?` |
//! | `null` | `col IS NULL` |
//! | `{"in": [..]}` | `col IN (?, ..)`, or `1 = 0` when empty |
//! | `{"isNullish": true}` / `false` | `col IS NULL` / `col IS NOT NULL` |
//! | `{"lt"\|"lte"\|"gt"\|"gte": v}` | `col < ?` ... |
//!
//! Several keys in one object are AND-joined. Anything else is rejected.

use serde_json::{Map, Value};

use crate::error::{CompileError, Result};
use crate::sql::is_identifier;
use crate::value::SqlValue;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
}

impl CmpOp {
    const fn as_sql(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        match key {
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            _ => None,
        }
    }
}

/// A validated predicate on one column.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `col = ?`
    Eq(SqlValue),
    /// `col LIKE ?`
    Like(String),
    /// `col IN (...)`
    In(Vec<SqlValue>),
    /// `col IS NULL`
    IsNull,
    /// `col IS NOT NULL`
    IsNotNull,
    /// `col <op> ?`
    Cmp(CmpOp, SqlValue),
    /// Several predicates AND-joined.
    All(Vec<Self>),
}

fn unsupported(column: &str, reason: impl Into<String>) -> CompileError {
    CompileError::UnsupportedPredicate {
        column: column.to_string(),
        reason: reason.into(),
    }
}

fn scalar(column: &str, value: &Value) -> Result<SqlValue> {
    match value {
        Value::Array(_) | Value::Object(_) => Err(unsupported(
            column,
            format!("expected a scalar, got {value}"),
        )),
        _ => SqlValue::from_json(value).ok_or_else(|| unsupported(column, "number out of range")),
    }
}

impl Predicate {
    /// Validates the predicate for `column`.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::UnsupportedPredicate`] for shapes outside the
    /// table above.
    pub fn from_json(column: &str, value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::IsNull),
            Value::String(s) if s.contains('%') => Ok(Self::Like(s.clone())),
            Value::Array(_) => Err(unsupported(column, "bare arrays are not allowed, use {\"in\": [...]}")),
            Value::Object(ops) => Self::from_operators(column, ops),
            _ => Ok(Self::Eq(scalar(column, value)?)),
        }
    }

    fn from_operators(column: &str, ops: &Map<String, Value>) -> Result<Self> {
        if ops.is_empty() {
            return Err(unsupported(column, "empty operator object"));
        }
        let mut parts = Vec::with_capacity(ops.len());
        for (key, operand) in ops {
            let part = match key.as_str() {
                "in" => {
                    let Value::Array(items) = operand else {
                        return Err(unsupported(column, "'in' expects an array"));
                    };
                    let values = items
                        .iter()
                        .map(|item| scalar(column, item))
                        .collect::<Result<Vec<_>>>()?;
                    Self::In(values)
                }
                "isNullish" => match operand {
                    Value::Bool(true) => Self::IsNull,
                    Value::Bool(false) => Self::IsNotNull,
                    _ => return Err(unsupported(column, "'isNullish' expects a boolean")),
                },
                other => {
                    let op = CmpOp::from_key(other)
                        .ok_or_else(|| unsupported(column, format!("unknown operator '{other}'")))?;
                    Self::Cmp(op, scalar(column, operand)?)
                }
            };
            parts.push(part);
        }
        if parts.len() == 1 {
            Ok(parts.remove(0))
        } else {
            Ok(Self::All(parts))
        }
    }

    /// Renders the predicate, appending its parameters.
    pub fn render(&self, column: &str, params: &mut Vec<SqlValue>) -> String {
        match self {
            Self::Eq(v) => {
                params.push(v.clone());
                format!("{column} = ?")
            }
            Self::Like(pattern) => {
                params.push(SqlValue::Text(pattern.clone()));
                format!("{column} LIKE ?")
            }
            Self::In(values) if values.is_empty() => String::from("1 = 0"),
            Self::In(values) => {
                params.extend(values.iter().cloned());
                let placeholders = vec![SqlValue::placeholder(); values.len()].join(", ");
                format!("{column} IN ({placeholders})")
            }
            Self::IsNull => format!("{column} IS NULL"),
            Self::IsNotNull => format!("{column} IS NOT NULL"),
            Self::Cmp(op, v) => {
                params.push(v.clone());
                format!("{column} {} ?", op.as_sql())
            }
            Self::All(parts) => parts
                .iter()
                .map(|p| p.render(column, params))
                .collect::<Vec<_>>()
                .join(" AND "),
        }
    }
}

/// Checks that `name` is usable as a column name.
///
/// # Errors
///
/// Returns [`CompileError::InvalidIdentifier`] otherwise.
pub fn ensure_identifier(name: &str) -> Result<()> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(CompileError::InvalidIdentifier(name.to_string()))
    }
}

/// Renders one condition object as an AND-joined expression.
///
/// Returns `None` for an empty object.
///
/// # Errors
///
/// Fails when `conditions` is not an object, a key is not an identifier, or
/// a predicate is unsupported.
pub fn render_conditions(conditions: &Value, params: &mut Vec<SqlValue>) -> Result<Option<String>> {
    let Value::Object(map) = conditions else {
        return Err(CompileError::ConditionsNotObject(conditions.to_string()));
    };
    if map.is_empty() {
        return Ok(None);
    }
    let mut parts = Vec::with_capacity(map.len());
    for (column, value) in map {
        ensure_identifier(column)?;
        parts.push(Predicate::from_json(column, value)?.render(column, params));
    }
    Ok(Some(parts.join(" AND ")))
}
