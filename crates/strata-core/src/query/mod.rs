//! Query compiler: fluent query descriptions to parameterized SQL.
//!
//! Values never appear in SQL text; every one is a `?` parameter. Column and
//! table names are validated as plain identifiers before they are spliced in.

pub mod include;
pub mod mutation;
pub mod predicate;
mod select;

pub use mutation::{count, delete, insert, update};
pub use predicate::{CmpOp, Predicate};
pub use select::{Offset, Order, Query};
