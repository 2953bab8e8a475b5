//! Declarative schema input and its compilation into a [`NormalizedSchema`].

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::{dsl::parse_column, Column, Index, NormalizedSchema, Table};
use crate::error::{SchemaError, SchemaResult};
use crate::sql::is_identifier;

/// Prefix of the pseudo-key that splices a mixin into a table.
const MIXIN_PREFIX: &str = "...";

/// A string-keyed map that keeps insertion order.
///
/// Serializes as a plain JSON/TOML table; column declaration order is part of
/// the schema, so a hash map will not do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> OrderedMap<V> {
    /// Creates an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Inserts or replaces `key`, keeping its original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    /// Looks up a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns the value for `key`, appending `f()` first when absent.
    pub fn get_or_insert_with(&mut self, key: &str, f: impl FnOnce() -> V) -> &mut V {
        let position = match self.0.iter().position(|(k, _)| k == key) {
            Some(position) => position,
            None => {
                self.0.push((key.to_string(), f()));
                self.0.len() - 1
            }
        };
        &mut self.0[position].1
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct OrderedMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
    type Value = OrderedMap<V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = OrderedMap::new();
        while let Some((k, v)) = access.next_entry::<String, V>()? {
            map.insert(k, v);
        }
        Ok(map)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

/// Value of a column entry: a DSL string, or `true` for a `...mixin` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnSpec {
    /// A column written in the DSL.
    Dsl(String),
    /// A mixin splice marker.
    Mixin(bool),
}

/// Declarative description of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Column name (or `...mixin`) → DSL.
    pub columns: OrderedMap<ColumnSpec>,
    /// Indexes.
    #[serde(default)]
    pub indexes: Vec<Index>,
    /// Table-level CHECK expressions.
    #[serde(default)]
    pub checks: Vec<String>,
}

const fn default_version() -> u32 {
    1
}

/// Declarative schema: reusable mixins plus tables.
///
/// # Example
///
/// ```
/// use strata_core::schema::SchemaDefinition;
///
/// let schema = SchemaDefinition::new("app")
///     .mixin("timestamps", &[("createdAt", "timestamp_ms not null default now")])
///     .table("users")
///     .column("users", "id", "integer primary key")
///     .column("users", "email", "text not null unique")
///     .mixin_into("users", "timestamps")
///     .compile()
///     .unwrap();
///
/// assert_eq!(schema.tables[0].columns.len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Schema name.
    pub name: String,
    /// Schema version.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Mixin name → column name → DSL.
    #[serde(default)]
    pub mixins: OrderedMap<OrderedMap<String>>,
    /// Table name → definition.
    #[serde(default)]
    pub tables: OrderedMap<TableDefinition>,
}

impl SchemaDefinition {
    /// Creates an empty definition.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: default_version(),
            mixins: OrderedMap::new(),
            tables: OrderedMap::new(),
        }
    }

    /// Sets the version.
    #[must_use]
    pub const fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Declares a reusable column set.
    #[must_use]
    pub fn mixin(mut self, name: &str, columns: &[(&str, &str)]) -> Self {
        let mut map = OrderedMap::new();
        for (column, dsl) in columns {
            map.insert(*column, (*dsl).to_string());
        }
        self.mixins.insert(name, map);
        self
    }

    /// Declares an empty table (or leaves an existing one untouched).
    #[must_use]
    pub fn table(mut self, name: &str) -> Self {
        if self.tables.get(name).is_none() {
            self.tables.insert(name, TableDefinition::default());
        }
        self
    }

    fn table_mut(&mut self, name: &str) -> &mut TableDefinition {
        self.tables.get_or_insert_with(name, TableDefinition::default)
    }

    /// Adds a DSL column to a table, declaring the table if needed.
    #[must_use]
    pub fn column(mut self, table: &str, column: &str, dsl: &str) -> Self {
        self.table_mut(table)
            .columns
            .insert(column, ColumnSpec::Dsl(dsl.to_string()));
        self
    }

    /// Splices a mixin into a table at the current position.
    #[must_use]
    pub fn mixin_into(mut self, table: &str, mixin: &str) -> Self {
        self.table_mut(table)
            .columns
            .insert(format!("{MIXIN_PREFIX}{mixin}"), ColumnSpec::Mixin(true));
        self
    }

    /// Adds an index to a table.
    #[must_use]
    pub fn index(mut self, table: &str, index: Index) -> Self {
        self.table_mut(table).indexes.push(index);
        self
    }

    /// Adds a table-level CHECK expression.
    #[must_use]
    pub fn check(mut self, table: &str, expr: &str) -> Self {
        self.table_mut(table).checks.push(expr.to_string());
        self
    }

    /// Compiles the definition into a normalized schema.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] when a column DSL does not parse, a mixin
    /// is unknown, a name is not a plain identifier, a column appears twice,
    /// an index covers an unknown column or a reference has no target.
    pub fn compile(&self) -> SchemaResult<NormalizedSchema> {
        let mut tables = Vec::with_capacity(self.tables.len());
        for (name, definition) in self.tables.iter() {
            tables.push(self.compile_table(name, definition)?);
        }

        let schema = NormalizedSchema {
            name: self.name.clone(),
            version: self.version,
            tables,
        };
        check_references(&schema)?;
        Ok(schema)
    }

    fn compile_table(&self, name: &str, definition: &TableDefinition) -> SchemaResult<Table> {
        ensure_identifier(name)?;
        let mut columns: Vec<Column> = Vec::new();
        let mut seen = HashSet::new();
        let mut push = |column: Column| -> SchemaResult<()> {
            ensure_identifier(&column.name)?;
            if !seen.insert(column.name.clone()) {
                return Err(SchemaError::DuplicateColumn {
                    table: name.to_string(),
                    column: column.name,
                });
            }
            columns.push(column);
            Ok(())
        };

        for (key, spec) in definition.columns.iter() {
            match (key.strip_prefix(MIXIN_PREFIX), spec) {
                (Some(mixin), _) => {
                    let set = self
                        .mixins
                        .get(mixin)
                        .ok_or_else(|| SchemaError::UnknownMixin {
                            table: name.to_string(),
                            mixin: mixin.to_string(),
                        })?;
                    for (column, dsl) in set.iter() {
                        push(parse_column(name, column, dsl)?)?;
                    }
                }
                (None, ColumnSpec::Dsl(dsl)) => push(parse_column(name, key, dsl)?)?,
                (None, ColumnSpec::Mixin(_)) => {
                    return Err(SchemaError::UnexpectedToken {
                        table: name.to_string(),
                        column: key.to_string(),
                        found: "true".to_string(),
                    })
                }
            }
        }

        for index in &definition.indexes {
            ensure_identifier(&index.name)?;
            for column in &index.columns {
                if !seen.contains(column) {
                    return Err(SchemaError::UnknownIndexColumn {
                        table: name.to_string(),
                        index: index.name.clone(),
                        column: column.clone(),
                    });
                }
            }
        }

        Ok(Table {
            name: name.to_string(),
            columns,
            indexes: definition.indexes.clone(),
            checks: definition.checks.clone(),
        })
    }
}

fn ensure_identifier(name: &str) -> SchemaResult<()> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier(name.to_string()))
    }
}

fn check_references(schema: &NormalizedSchema) -> SchemaResult<()> {
    for table in &schema.tables {
        for column in &table.columns {
            let Some(reference) = &column.references else {
                continue;
            };
            let found = schema
                .table(&reference.table)
                .and_then(|t| t.column(&reference.column))
                .is_some();
            if !found {
                return Err(SchemaError::UnknownReference {
                    table: table.name.clone(),
                    column: column.name.clone(),
                    target: format!("{}.{}", reference.table, reference.column),
                });
            }
        }
    }
    Ok(())
}
