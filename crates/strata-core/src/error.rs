//! Error types for schema and query compilation.
//!
//! Both are raised before any statement reaches an adapter, so callers can
//! treat them as programming or configuration mistakes rather than runtime
//! failures.

use thiserror::Error;

/// Errors raised while compiling a schema definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// The column DSL names a type that is not supported.
    #[error("column '{table}.{column}': unknown type '{found}'")]
    UnknownType {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// The offending type token.
        found: String,
    },

    /// The column DSL contains a token the grammar does not accept.
    #[error("column '{table}.{column}': unexpected token '{found}'")]
    UnexpectedToken {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// The offending token.
        found: String,
    },

    /// A keyword was given without its required argument.
    #[error("column '{table}.{column}': '{keyword}' expects {expected}")]
    MissingArgument {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// The keyword missing its argument.
        keyword: String,
        /// What was expected.
        expected: &'static str,
    },

    /// A quoted string or parenthesized group was not closed.
    #[error("column '{table}.{column}': unterminated {what}")]
    Unterminated {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// "string" or "group".
        what: &'static str,
    },

    /// The column DSL is empty.
    #[error("column '{table}.{column}': empty definition")]
    EmptyDefinition {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// A `...mixin` key names a mixin that was never declared.
    #[error("table '{table}': unknown mixin '{mixin}'")]
    UnknownMixin {
        /// Table name.
        table: String,
        /// Mixin name.
        mixin: String,
    },

    /// Two columns of one table share a name (possibly through a mixin).
    #[error("table '{table}': duplicate column '{column}'")]
    DuplicateColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// A table, column, index or mixin name is not a plain identifier.
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    /// An index covers a column the table does not have.
    #[error("index '{index}' on '{table}' references unknown column '{column}'")]
    UnknownIndexColumn {
        /// Table name.
        table: String,
        /// Index name.
        index: String,
        /// Column name.
        column: String,
    },

    /// A `-> table.column` reference points at nothing.
    #[error("column '{table}.{column}' references unknown '{target}'")]
    UnknownReference {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// The `table.column` target.
        target: String,
    },
}

/// Errors raised while compiling a query description into SQL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A predicate object has a shape the compiler does not understand.
    #[error("unsupported predicate for column '{column}': {reason}")]
    UnsupportedPredicate {
        /// Column the predicate applies to.
        column: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A condition argument was not a JSON object.
    #[error("conditions must be an object, got {0}")]
    ConditionsNotObject(String),

    /// A column, table or alias is not a plain identifier.
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    /// An ORDER BY direction is neither `asc` nor `desc`.
    #[error("invalid order direction '{0}'")]
    InvalidDirection(String),

    /// `update`/`delete` without any condition.
    #[error("refusing to {0} without a WHERE condition")]
    UnboundedMutation(&'static str),

    /// `insert`/`update` without any column.
    #[error("nothing to write: {0} has no columns")]
    EmptyRow(&'static str),

    /// `include` named a table with no resolvable relation.
    #[error("no relation from '{table}' to '{related}'")]
    UnknownRelation {
        /// Base table.
        table: String,
        /// Requested related table.
        related: String,
    },

    /// A value cannot be bound as an SQL parameter.
    #[error("cannot bind value for '{column}': {reason}")]
    UnbindableValue {
        /// Column the value belongs to.
        column: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Result type alias for schema compilation.
pub type SchemaResult<T> = std::result::Result<T, SchemaError>;

/// Result type alias for query compilation.
pub type Result<T> = std::result::Result<T, CompileError>;
