//! Normalized schema types.
//!
//! A [`NormalizedSchema`] is what the column DSL compiles into (see
//! [`SchemaDefinition::compile`]). It is derived fresh from the definition on
//! every call and is the input of both DDL generation and the migration
//! differ. It serializes to JSON so migration bundles can snapshot it.

mod ddl;
mod definition;
mod dsl;
pub mod relations;

pub use ddl::{
    bare_column_definition, column_definition, compile_ddl, create_index, create_table,
    drop_index, render_default,
};
pub use definition::{ColumnSpec, OrderedMap, SchemaDefinition, TableDefinition};
pub use dsl::parse_column;
pub use relations::{singular, Relation, RelationKind, RelationMap, CONVENTION_KEY};

use serde::{Deserialize, Serialize};

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// UTF-8 text.
    Text,
    /// 64-bit integer.
    Integer,
    /// Double precision float.
    Real,
    /// Raw bytes.
    Blob,
    /// JSON document stored as text.
    Json,
}

impl ColumnType {
    /// Returns the SQLite type name used in DDL.
    #[must_use]
    pub const fn sql_name(self) -> &'static str {
        match self {
            Self::Text | Self::Json => "TEXT",
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Blob => "BLOB",
        }
    }
}

/// Application-level interpretation of an integer column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnMode {
    /// 0/1 flag.
    Boolean,
    /// Milliseconds since the Unix epoch.
    TimestampMs,
}

/// A literal default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    /// `NULL`.
    Null,
    /// The insertion time, `(CURRENT_TIMESTAMP)`.
    Now,
    /// A boolean, stored as 0/1.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A float.
    Float(f64),
    /// A string, quote-escaped on output.
    Text(String),
}

/// Column default: either raw SQL emitted verbatim, or a literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DefaultValue {
    /// Raw SQL expression, emitted inside parentheses as written.
    Raw {
        /// The expression.
        sql: String,
    },
    /// A literal value.
    Value {
        /// The literal.
        value: Literal,
    },
}

impl DefaultValue {
    /// Returns `true` for defaults SQLite accepts on `ALTER TABLE ADD COLUMN`:
    /// plain literals, not `now` nor a parenthesized expression.
    #[must_use]
    pub const fn is_constant(&self) -> bool {
        !matches!(
            self,
            Self::Raw { .. }
                | Self::Value {
                    value: Literal::Now
                }
        )
    }
}

/// Action taken on referencing rows when the referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    /// Delete referencing rows.
    Cascade,
    /// Refuse the delete.
    Restrict,
    /// Set the referencing column to NULL.
    SetNull,
    /// Set the referencing column to its default.
    SetDefault,
    /// Deferred check.
    NoAction,
}

impl OnDelete {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub const fn to_sql(self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::Restrict => "RESTRICT",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
            Self::NoAction => "NO ACTION",
        }
    }
}

/// A `-> table.column` foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub column: String,
    /// ON DELETE action, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<OnDelete>,
}

/// A compiled column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Storage type.
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Interpretation of integer columns declared as `boolean`/`timestamp_ms`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ColumnMode>,
    /// NOT NULL constraint.
    #[serde(default)]
    pub not_null: bool,
    /// UNIQUE constraint.
    #[serde(default)]
    pub unique: bool,
    /// PRIMARY KEY constraint.
    #[serde(default)]
    pub primary_key: bool,
    /// Allowed values, enforced with an inline CHECK.
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    /// Default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    /// Foreign key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Reference>,
}

impl Column {
    /// Creates a nullable column without constraints.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            mode: None,
            not_null: false,
            unique: false,
            primary_key: false,
            enum_values: None,
            default: None,
            references: None,
        }
    }

    /// Returns whether the column declares a default.
    #[must_use]
    pub const fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

/// A table index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,
    /// Covered columns, in order.
    pub columns: Vec<String>,
    /// UNIQUE index.
    #[serde(default)]
    pub unique: bool,
}

impl Index {
    /// Creates a non-unique index.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            unique: false,
        }
    }

    /// Makes the index unique.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A compiled table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Columns in declaration order, mixins spliced in place.
    pub columns: Vec<Column>,
    /// Indexes.
    #[serde(default)]
    pub indexes: Vec<Index>,
    /// Table-level CHECK expressions.
    #[serde(default)]
    pub checks: Vec<String>,
}

impl Table {
    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Looks up an index by name.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

/// The compiled form of a [`SchemaDefinition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSchema {
    /// Schema name.
    pub name: String,
    /// Schema version.
    pub version: u32,
    /// Tables in declaration order.
    pub tables: Vec<Table>,
}

impl NormalizedSchema {
    /// Creates an empty schema, the starting point of a first migration.
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: 0,
            tables: Vec::new(),
        }
    }

    /// Looks up a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Returns table names in declaration order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.name.as_str())
    }

    /// Renders the full DDL script (one statement per line, `;`-terminated).
    #[must_use]
    pub fn to_sql(&self) -> String {
        compile_ddl(self)
            .into_iter()
            .map(|s| format!("{s};\n"))
            .collect()
    }
}
