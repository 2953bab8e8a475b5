//! SQL DDL generation from the normalized schema.

use super::{Column, DefaultValue, Index, Literal, NormalizedSchema, Table};
use crate::value::quote_literal;

/// Renders a column default as it appears after `DEFAULT`.
#[must_use]
pub fn render_default(default: &DefaultValue) -> String {
    match default {
        DefaultValue::Raw { sql } => format!("({sql})"),
        DefaultValue::Value { value } => match value {
            Literal::Null => String::from("NULL"),
            Literal::Now => String::from("(CURRENT_TIMESTAMP)"),
            Literal::Bool(b) => String::from(if *b { "1" } else { "0" }),
            Literal::Int(n) => n.to_string(),
            Literal::Float(f) => f.to_string(),
            Literal::Text(s) => quote_literal(s),
        },
    }
}

/// Renders a full column definition, constraints included.
#[must_use]
pub fn column_definition(column: &Column) -> String {
    let mut def = format!("{} {}", column.name, column.column_type.sql_name());
    if column.primary_key {
        def.push_str(" PRIMARY KEY");
    }
    if column.not_null {
        def.push_str(" NOT NULL");
    }
    if column.unique {
        def.push_str(" UNIQUE");
    }
    if let Some(default) = &column.default {
        def.push_str(" DEFAULT ");
        def.push_str(&render_default(default));
    }
    if let Some(values) = &column.enum_values {
        let list: Vec<String> = values.iter().map(|v| quote_literal(v)).collect();
        def.push_str(&format!(" CHECK ({} IN ({}))", column.name, list.join(", ")));
    }
    if let Some(reference) = &column.references {
        def.push_str(&format!(
            " REFERENCES {}({})",
            reference.table, reference.column
        ));
        if let Some(action) = reference.on_delete {
            def.push_str(" ON DELETE ");
            def.push_str(action.to_sql());
        }
    }
    def
}

/// Renders the part of a column definition `ALTER TABLE ... ADD COLUMN`
/// accepts: type, nullability and default only.
#[must_use]
pub fn bare_column_definition(column: &Column) -> String {
    let mut def = format!("{} {}", column.name, column.column_type.sql_name());
    if column.not_null {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        def.push_str(" DEFAULT ");
        def.push_str(&render_default(default));
    }
    def
}

/// Renders `CREATE TABLE IF NOT EXISTS`.
#[must_use]
pub fn create_table(table: &Table) -> String {
    let mut parts: Vec<String> = table.columns.iter().map(column_definition).collect();
    parts.extend(table.checks.iter().map(|check| format!("CHECK ({check})")));
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        table.name,
        parts.join(",\n  ")
    )
}

/// Renders `CREATE [UNIQUE] INDEX IF NOT EXISTS`.
#[must_use]
pub fn create_index(table: &str, index: &Index) -> String {
    let unique = if index.unique { "UNIQUE " } else { "" };
    format!(
        "CREATE {unique}INDEX IF NOT EXISTS {} ON {table}({})",
        index.name,
        index.columns.join(", ")
    )
}

/// Renders `DROP INDEX IF EXISTS`.
#[must_use]
pub fn drop_index(name: &str) -> String {
    format!("DROP INDEX IF EXISTS {name}")
}

/// Compiles every table and index of the schema, in declaration order.
#[must_use]
pub fn compile_ddl(schema: &NormalizedSchema) -> Vec<String> {
    let mut statements = Vec::new();
    for table in &schema.tables {
        statements.push(create_table(table));
        for index in &table.indexes {
            statements.push(create_index(&table.name, index));
        }
    }
    statements
}
