//! Integration tests for the query compiler and the schema pipeline.
//!
//! These tests drive the public API the way an application does: compile a
//! schema, resolve its relations, then compile queries against it.

use serde_json::json;
use strata_core::query::{include, Order, Query};
use strata_core::schema::{Index, RelationKind, SchemaDefinition};
use strata_core::{diff_schemas, CompileError, RelationMap, SqlValue};

// =============================================================================
// Schema shared by the tests
// =============================================================================

fn shop() -> SchemaDefinition {
    SchemaDefinition::new("shop")
        .mixin(
            "timestamps",
            &[("createdAt", "timestamp_ms not null default now")],
        )
        .column("users", "id", "integer primary key")
        .column("users", "email", "text not null unique")
        .mixin_into("users", "timestamps")
        .column("orders", "id", "integer primary key")
        .column("orders", "userId", "integer not null -> users.id cascade")
        .column("orders", "email", "text")
        .column("orders", "status", "integer not null default 0")
        .index("orders", Index::new("orders_user_idx", &["userId"]))
        .column("sessions", "id", "text primary key")
        .column("sessions", "userId", "integer not null")
}

// =============================================================================
// Compilation examples
// =============================================================================

#[test]
fn acme_orders_query() {
    let stmt = Query::table("orders")
        .where_clause(json!({"email": "%@acme.com"}))
        .or_where(json!({"status": {"in": [1, 2]}}))
        .order_by("id", Order::Desc)
        .limit(10)
        .compile()
        .unwrap();

    assert_eq!(
        stmt.sql,
        "SELECT * FROM orders WHERE (email LIKE ?) OR (status IN (?, ?)) ORDER BY id DESC LIMIT 10"
    );
    assert_eq!(
        stmt.params,
        vec![
            SqlValue::Text("%@acme.com".into()),
            SqlValue::Int(1),
            SqlValue::Int(2)
        ]
    );
}

#[test]
fn offset_semantics() {
    let paged = Query::table("orders").limit(5).offset(3).compile().unwrap();
    assert!(paged.sql.ends_with("LIMIT 5 OFFSET 10"));

    let raw = Query::table("orders").offset(10).compile().unwrap();
    assert!(raw.sql.ends_with(" OFFSET 10"));
    assert!(!raw.sql.contains("LIMIT"));
}

#[test]
fn params_never_reach_sql_text() {
    let hostile = "x' OR '1'='1";
    let stmt = Query::table("users")
        .where_clause(json!({"email": hostile}))
        .compile()
        .unwrap();
    assert!(!stmt.sql.contains(hostile));
    assert_eq!(stmt.params, vec![SqlValue::Text(hostile.into())]);
}

// =============================================================================
// Relations
// =============================================================================

#[test]
fn include_resolves_against_schema_relations() {
    let schema = shop().compile().unwrap();
    let relations = RelationMap::resolve(&schema);

    let orders = Query::table("orders").include("users");
    let resolved = orders.relations(&relations).unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].kind, RelationKind::BelongsTo);

    let users = Query::table("users").include("sessions");
    let resolved = users.relations(&relations).unwrap();
    assert_eq!(resolved[0].kind, RelationKind::HasMany);

    let base: Vec<_> = vec![json!({"id": 1}), json!({"id": 2})]
        .into_iter()
        .filter_map(|v| v.as_object().cloned())
        .collect();
    let stmt = include::related_statement(resolved[0], &base).unwrap();
    assert_eq!(stmt.sql, "SELECT * FROM sessions WHERE userId IN (?, ?)");
}

#[test]
fn include_without_relation_is_a_compile_error() {
    let schema = shop().compile().unwrap();
    let relations = RelationMap::resolve(&schema);
    let err = Query::table("sessions")
        .include("orders")
        .relations(&relations)
        .unwrap_err();
    assert_eq!(
        err,
        CompileError::UnknownRelation {
            table: "sessions".into(),
            related: "orders".into()
        }
    );
}

// =============================================================================
// Differ over compiled schemas
// =============================================================================

#[test]
fn diff_against_itself_is_empty() {
    let schema = shop().compile().unwrap();
    let diff = diff_schemas(&schema, &schema);
    assert!(diff.statements.is_empty());
    assert!(diff.warnings.is_empty());
}

#[test]
fn snapshot_roundtrip_keeps_diff_empty() {
    let schema = shop().compile().unwrap();
    let stored = serde_json::to_string_pretty(&schema).unwrap();
    let restored = serde_json::from_str(&stored).unwrap();
    assert_eq!(schema, restored);
    assert!(diff_schemas(&restored, &schema).is_empty());
}
