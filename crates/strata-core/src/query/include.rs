//! One-level relation inclusion.
//!
//! After the base rows are fetched, each included relation costs exactly one
//! extra statement. Matching is done on the JSON text of the key, so `1` and
//! `"1"` are distinct.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::result::Statement;
use crate::schema::{Relation, RelationKind};
use crate::value::{Row, SqlValue};

fn distinct_keys(rows: &[Row], column: &str) -> Vec<SqlValue> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for row in rows {
        let Some(value) = row.get(column) else {
            continue;
        };
        if value.is_null() || !seen.insert(value.to_string()) {
            continue;
        }
        if let Some(key) = SqlValue::from_json(value) {
            keys.push(key);
        }
    }
    keys
}

/// Builds the statement fetching rows related to `rows`.
///
/// Returns `None` when there is nothing to look up (no base rows, or no
/// non-null keys).
#[must_use]
pub fn related_statement(relation: &Relation, rows: &[Row]) -> Option<Statement> {
    let (key_column, filter_column) = match relation.kind {
        RelationKind::BelongsTo => (
            relation.foreign_key.as_str(),
            relation.target_key.as_str(),
        ),
        RelationKind::HasMany => (
            relation.target_key.as_str(),
            relation.foreign_key.as_str(),
        ),
    };
    let keys = distinct_keys(rows, key_column);
    if keys.is_empty() {
        return None;
    }
    let placeholders = vec![SqlValue::placeholder(); keys.len()].join(", ");
    Some(Statement::new(
        format!(
            "SELECT * FROM {} WHERE {filter_column} IN ({placeholders})",
            relation.related
        ),
        keys,
    ))
}

/// Attaches `related` rows to `rows` under `relation.name`.
///
/// Belongs-to attaches the single match or `null`; has-many attaches an
/// array, empty when nothing matched.
pub fn attach(relation: &Relation, rows: &mut [Row], related: Vec<Row>) {
    match relation.kind {
        RelationKind::BelongsTo => {
            let by_key: HashMap<String, Row> = related
                .into_iter()
                .filter_map(|r| {
                    r.get(&relation.target_key)
                        .map(|key| (key.to_string(), r.clone()))
                })
                .collect();
            for row in rows {
                let value = row
                    .get(&relation.foreign_key)
                    .filter(|fk| !fk.is_null())
                    .and_then(|fk| by_key.get(&fk.to_string()))
                    .map_or(Value::Null, |r| Value::Object(r.clone()));
                row.insert(relation.name.clone(), value);
            }
        }
        RelationKind::HasMany => {
            let mut groups: HashMap<String, Vec<Value>> = HashMap::new();
            for r in related {
                if let Some(fk) = r.get(&relation.foreign_key) {
                    groups
                        .entry(fk.to_string())
                        .or_default()
                        .push(Value::Object(r));
                }
            }
            for row in rows {
                let children = row
                    .get(&relation.target_key)
                    .and_then(|key| groups.get(&key.to_string()))
                    .cloned()
                    .unwrap_or_default();
                row.insert(relation.name.clone(), Value::Array(children));
            }
        }
    }
}
