//! Relation descriptors derived from the naming convention.
//!
//! `posts.userId` makes `posts` belong to `users`, and `users` have many
//! `posts`. Relations are resolved once per schema; queries look them up by
//! `(table, related)` instead of probing rows at run time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::NormalizedSchema;

/// Key column implied by the `<singular>Id` convention.
pub const CONVENTION_KEY: &str = "id";

/// Singular form of a table name, as used in foreign key column names.
///
/// `categories` → `category`, `addresses` → `address`, `users` → `user`.
#[must_use]
pub fn singular(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["sses", "xes", "ches", "shes"] {
        if name.ends_with(suffix) {
            return name[..name.len() - 2].to_string();
        }
    }
    name.strip_suffix('s').unwrap_or(name).to_string()
}

/// Direction of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    /// The base table holds the foreign key (`orders.userId` → `users.id`).
    BelongsTo,
    /// The related table holds the foreign key (`users.id` ← `sessions.userId`).
    HasMany,
}

/// A resolved relation from `table` to `related`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    /// Key under which related rows are attached (the related table name).
    pub name: String,
    /// Direction.
    pub kind: RelationKind,
    /// Base table.
    pub table: String,
    /// Related table.
    pub related: String,
    /// Foreign key column: on `table` for belongs-to, on `related` for has-many.
    pub foreign_key: String,
    /// Column the foreign key points at: on `related` for belongs-to, on
    /// `table` for has-many. `id` under the naming convention.
    pub target_key: String,
}

/// All relations of a schema, keyed by `(table, related)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationMap {
    relations: HashMap<(String, String), Relation>,
}

impl RelationMap {
    /// Resolves relations for every ordered pair of tables.
    ///
    /// The `<singular>Id` convention wins; explicit `-> table.column`
    /// references fill the pairs the convention leaves open and match on the
    /// referenced column.
    #[must_use]
    pub fn resolve(schema: &NormalizedSchema) -> Self {
        let mut relations = HashMap::new();

        for base in &schema.tables {
            for other in &schema.tables {
                if base.name == other.name {
                    continue;
                }
                let belongs_key = format!("{}Id", singular(&other.name));
                let has_many_key = format!("{}Id", singular(&base.name));
                let relation = if base.column(&belongs_key).is_some() {
                    Some((RelationKind::BelongsTo, belongs_key))
                } else if other.column(&has_many_key).is_some() {
                    Some((RelationKind::HasMany, has_many_key))
                } else {
                    None
                };
                if let Some((kind, foreign_key)) = relation {
                    relations.insert(
                        (base.name.clone(), other.name.clone()),
                        Relation {
                            name: other.name.clone(),
                            kind,
                            table: base.name.clone(),
                            related: other.name.clone(),
                            foreign_key,
                            target_key: CONVENTION_KEY.to_string(),
                        },
                    );
                }
            }
        }

        for table in &schema.tables {
            for column in &table.columns {
                let Some(reference) = &column.references else {
                    continue;
                };
                if reference.table == table.name {
                    continue;
                }
                relations
                    .entry((table.name.clone(), reference.table.clone()))
                    .or_insert_with(|| Relation {
                        name: reference.table.clone(),
                        kind: RelationKind::BelongsTo,
                        table: table.name.clone(),
                        related: reference.table.clone(),
                        foreign_key: column.name.clone(),
                        target_key: reference.column.clone(),
                    });
                relations
                    .entry((reference.table.clone(), table.name.clone()))
                    .or_insert_with(|| Relation {
                        name: table.name.clone(),
                        kind: RelationKind::HasMany,
                        table: reference.table.clone(),
                        related: table.name.clone(),
                        foreign_key: column.name.clone(),
                        target_key: reference.column.clone(),
                    });
            }
        }

        Self { relations }
    }

    /// Looks up the relation from `table` to `related`.
    #[must_use]
    pub fn get(&self, table: &str, related: &str) -> Option<&Relation> {
        self.relations
            .get(&(table.to_string(), related.to_string()))
    }

    /// Number of resolved relations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.relations.len()
    }

    /// Returns `true` if no relation was resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}
