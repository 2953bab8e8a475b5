//! Migration differ: computes the SQL that moves a store from one normalized
//! schema to another.
//!
//! Only additive-safe changes are emitted. Anything SQLite cannot do with
//! `ALTER TABLE` (retrofitting constraints, changing a column, dropping a
//! table) is reported as a [`DiffWarning`] and left to a hand-written
//! migration.

use std::fmt;

use crate::schema::{
    bare_column_definition, create_index, create_table, drop_index, render_default, Column,
    NormalizedSchema, Table,
};

/// Advisory message produced by [`diff_schemas`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffWarning {
    /// A NOT NULL column without default was added as nullable.
    NotNullWithoutDefault {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// A new column carries constraints `ADD COLUMN` cannot express.
    RebuildRequired {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Constraints that were left out (`UNIQUE`, `PRIMARY KEY`, ...).
        constraints: Vec<&'static str>,
    },
    /// A new column's default is an expression `ADD COLUMN` refuses; the
    /// column was added without it.
    NonConstantDefault {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// The default that was left out, as rendered in DDL.
        default: String,
    },
    /// A column was dropped; its data is lost.
    ColumnDropped {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// An existing column's definition changed; nothing was emitted.
    ColumnChanged {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// An index was dropped.
    IndexDropped {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
        /// Columns the index covered.
        columns: Vec<String>,
    },
    /// Table-level CHECK constraints changed; nothing was emitted.
    ChecksChanged {
        /// Table name.
        table: String,
    },
    /// A table is no longer in the schema; nothing was emitted.
    TableRemoved {
        /// Table name.
        table: String,
    },
}

impl fmt::Display for DiffWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotNullWithoutDefault { table, column } => write!(
                f,
                "{table}.{column} is NOT NULL without a default; added as nullable, backfill and rebuild to enforce"
            ),
            Self::RebuildRequired {
                table,
                column,
                constraints,
            } => write!(
                f,
                "{table}.{column} added without {}; a table rebuild is required to enforce them",
                constraints.join(", ")
            ),
            Self::NonConstantDefault {
                table,
                column,
                default,
            } => write!(
                f,
                "{table}.{column} added without DEFAULT {default}; SQLite only accepts constant defaults on ADD COLUMN, a table rebuild is required"
            ),
            Self::ColumnDropped { table, column } => {
                write!(f, "dropping {table}.{column} loses its data")
            }
            Self::ColumnChanged { table, column } => write!(
                f,
                "{table}.{column} definition changed; a table rebuild is required, nothing emitted"
            ),
            Self::IndexDropped {
                table,
                index,
                columns,
            } => write!(
                f,
                "dropping index {index} on {table}({})",
                columns.join(", ")
            ),
            Self::ChecksChanged { table } => write!(
                f,
                "{table} CHECK constraints changed; a table rebuild is required, nothing emitted"
            ),
            Self::TableRemoved { table } => write!(
                f,
                "table {table} is no longer in the schema; drop it by hand if intended"
            ),
        }
    }
}

/// Output of [`diff_schemas`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationDiff {
    /// Statements to execute, in order, without trailing `;`.
    pub statements: Vec<String>,
    /// Advisory warnings.
    pub warnings: Vec<DiffWarning>,
}

impl MigrationDiff {
    /// Returns `true` when there is nothing to apply and nothing to report.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty() && self.warnings.is_empty()
    }

    /// Renders a migration file: warnings as `-- warning:` comments, then
    /// one `;`-terminated statement per line.
    #[must_use]
    pub fn to_sql(&self) -> String {
        let mut out = String::new();
        for warning in &self.warnings {
            out.push_str("-- warning: ");
            out.push_str(&warning.to_string());
            out.push('\n');
        }
        for statement in &self.statements {
            out.push_str(statement);
            out.push_str(";\n");
        }
        out
    }
}

/// Diffs two normalized schemas. Pure: nothing is executed.
#[must_use]
pub fn diff_schemas(from: &NormalizedSchema, to: &NormalizedSchema) -> MigrationDiff {
    let mut diff = MigrationDiff::default();

    for table in &to.tables {
        match from.table(&table.name) {
            None => {
                diff.statements.push(create_table(table));
                for index in &table.indexes {
                    diff.statements.push(create_index(&table.name, index));
                }
            }
            Some(previous) => diff_table(previous, table, &mut diff),
        }
    }

    for table in &from.tables {
        if to.table(&table.name).is_none() {
            diff.warnings.push(DiffWarning::TableRemoved {
                table: table.name.clone(),
            });
        }
    }

    diff
}

fn diff_table(from: &Table, to: &Table, diff: &mut MigrationDiff) {
    let name = &to.name;

    for index in &from.indexes {
        match to.index(&index.name) {
            None => {
                diff.statements.push(drop_index(&index.name));
                diff.warnings.push(DiffWarning::IndexDropped {
                    table: name.clone(),
                    index: index.name.clone(),
                    columns: index.columns.clone(),
                });
            }
            Some(next) if next != index => diff.statements.push(drop_index(&index.name)),
            Some(_) => {}
        }
    }

    for column in &to.columns {
        match from.column(&column.name) {
            None => add_column(name, column, diff),
            Some(previous) if previous != column => {
                diff.warnings.push(DiffWarning::ColumnChanged {
                    table: name.clone(),
                    column: column.name.clone(),
                });
            }
            Some(_) => {}
        }
    }

    for column in &from.columns {
        if to.column(&column.name).is_none() {
            diff.statements
                .push(format!("ALTER TABLE {name} DROP COLUMN {}", column.name));
            diff.warnings.push(DiffWarning::ColumnDropped {
                table: name.clone(),
                column: column.name.clone(),
            });
        }
    }

    for index in &to.indexes {
        if from.index(&index.name) != Some(index) {
            diff.statements.push(create_index(name, index));
        }
    }

    if from.checks != to.checks {
        diff.warnings.push(DiffWarning::ChecksChanged {
            table: name.clone(),
        });
    }
}

fn add_column(table: &str, column: &Column, diff: &mut MigrationDiff) {
    let mut constraints = Vec::new();
    if column.primary_key {
        constraints.push("PRIMARY KEY");
    }
    if column.unique {
        constraints.push("UNIQUE");
    }
    if column.references.is_some() {
        constraints.push("REFERENCES");
    }
    if column.enum_values.is_some() {
        constraints.push("ENUM");
    }
    if !constraints.is_empty() {
        diff.warnings.push(DiffWarning::RebuildRequired {
            table: table.to_string(),
            column: column.name.clone(),
            constraints,
        });
    }

    let mut addable = column.clone();
    if let Some(default) = addable.default.take_if(|d| !d.is_constant()) {
        diff.warnings.push(DiffWarning::NonConstantDefault {
            table: table.to_string(),
            column: column.name.clone(),
            default: render_default(&default),
        });
    }
    if addable.not_null && !addable.has_default() {
        addable.not_null = false;
        diff.warnings.push(DiffWarning::NotNullWithoutDefault {
            table: table.to_string(),
            column: column.name.clone(),
        });
    }
    diff.statements.push(format!(
        "ALTER TABLE {table} ADD COLUMN {}",
        bare_column_definition(&addable)
    ));
}
