//! Integration tests for bundle generation and migration application.
//!
//! These tests run against in-memory SQLite through the embedded adapter,
//! the same path the CLI uses.

use std::fs;
use std::sync::Arc;

use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use strata_core::{NormalizedSchema, SchemaDefinition, Statement};
use strata_exec::{Adapter, SqliteAdapter};
use strata_migrate::introspect::{expected_columns, table_info, verify};
use strata_migrate::{
    generate, MigrateError, MigrationBundle, MigrationRunner, MigrationSource, INITIAL_TAG,
};

// =============================================================================
// Fixtures
// =============================================================================

async fn adapter() -> Arc<dyn Adapter> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to create pool");
    Arc::new(SqliteAdapter::new(pool))
}

fn shop_v1() -> SchemaDefinition {
    SchemaDefinition::new("shop")
        .mixin(
            "timestamps",
            &[
                ("createdAt", "timestamp_ms not null default now"),
                ("updatedAt", "timestamp_ms"),
            ],
        )
        .column("users", "id", "integer primary key")
        .column("users", "email", "text not null unique")
        .column("users", "role", "text not null enum(admin, member) default 'member'")
        .mixin_into("users", "timestamps")
        .column("orders", "id", "integer primary key")
        .column("orders", "userId", "integer -> users.id on delete cascade")
        .column("orders", "total", "real not null default 0")
}

fn shop_v2() -> SchemaDefinition {
    shop_v1()
        .column("orders", "note", "text")
        .column("users", "active", "boolean not null default true")
}

async fn history_tags(adapter: &dyn Adapter) -> Vec<String> {
    let result = adapter
        .exec(
            &Statement::raw("SELECT tag FROM migrations_history ORDER BY id"),
            None,
        )
        .await;
    assert!(result.success, "{:?}", result.error);
    result
        .data
        .unwrap()
        .iter()
        .map(|row| row["tag"].as_str().unwrap().to_string())
        .collect()
}

async fn table_exists(adapter: &dyn Adapter, table: &str) -> bool {
    !table_info(adapter, table).await.unwrap().is_empty()
}

// =============================================================================
// Idempotency
// =============================================================================

#[tokio::test]
async fn reapplying_a_bundle_never_duplicates_history() {
    let adapter = adapter().await;
    let dir = tempfile::tempdir().unwrap();
    generate(dir.path(), "initial", &shop_v1().compile().unwrap()).unwrap();
    generate(dir.path(), "add notes", &shop_v2().compile().unwrap()).unwrap();

    let source = MigrationSource::resolve(dir.path(), &NormalizedSchema::empty("shop")).unwrap();
    assert!(!source.is_synthesized());

    let mut runner = MigrationRunner::new(Arc::clone(&adapter));
    let first = runner.run(&source).await.unwrap();
    assert_eq!(first.applied, ["0000_initial", "0001_add_notes"]);

    for _ in 0..3 {
        let again = runner.run(&source).await.unwrap();
        assert!(again.applied.is_empty());
        assert_eq!(again.skipped.len(), 2);
    }

    assert_eq!(
        history_tags(adapter.as_ref()).await,
        ["0000_initial", "0001_add_notes"]
    );
}

#[tokio::test]
async fn new_entries_apply_incrementally() {
    let adapter = adapter().await;
    let dir = tempfile::tempdir().unwrap();
    generate(dir.path(), "initial", &shop_v1().compile().unwrap()).unwrap();

    let mut runner = MigrationRunner::new(Arc::clone(&adapter));
    let bundle = MigrationBundle::load(dir.path()).unwrap();
    runner.run(&MigrationSource::Bundle(bundle)).await.unwrap();

    generate(dir.path(), "add notes", &shop_v2().compile().unwrap()).unwrap();
    let bundle = MigrationBundle::load(dir.path()).unwrap();
    let report = runner.run(&MigrationSource::Bundle(bundle)).await.unwrap();
    assert_eq!(report.applied, ["0001_add_notes"]);
    assert_eq!(report.skipped, ["0000_initial"]);

    let columns = table_info(adapter.as_ref(), "orders").await.unwrap();
    assert!(columns.iter().any(|c| c.name == "note"));
}

// =============================================================================
// Atomicity
// =============================================================================

#[tokio::test]
async fn failed_migration_leaves_nothing_and_is_retried() {
    let adapter = adapter().await;
    let broken = MigrationBundle::new()
        .with_entry("0000_base", "CREATE TABLE base (id INTEGER PRIMARY KEY);")
        .with_entry(
            "0001_broken",
            "CREATE TABLE half (id INTEGER);\nINSERT INTO missing_table VALUES (1);",
        );

    let mut runner = MigrationRunner::new(Arc::clone(&adapter));
    let result = runner.run(&MigrationSource::Bundle(broken)).await;
    assert!(matches!(
        result,
        Err(MigrateError::MigrationFailed { ref tag, .. }) if tag == "0001_broken"
    ));

    // The first migration stays applied, the second is fully rolled back.
    assert_eq!(history_tags(adapter.as_ref()).await, ["0000_base"]);
    assert!(table_exists(adapter.as_ref(), "base").await);
    assert!(!table_exists(adapter.as_ref(), "half").await);

    let fixed = MigrationBundle::new()
        .with_entry("0000_base", "CREATE TABLE base (id INTEGER PRIMARY KEY);")
        .with_entry(
            "0001_broken",
            "CREATE TABLE half (id INTEGER);\nINSERT INTO half VALUES (1);",
        );
    let report = runner.run(&MigrationSource::Bundle(fixed)).await.unwrap();
    assert_eq!(report.applied, ["0001_broken"]);
    assert!(table_exists(adapter.as_ref(), "half").await);
}

#[tokio::test]
async fn migration_sql_with_semicolons_in_literals() {
    let adapter = adapter().await;
    let bundle = MigrationBundle::new().with_entry(
        "0000_seed",
        "-- seed data; not a statement\n\
         CREATE TABLE notes (body TEXT);\n\
         INSERT INTO notes VALUES ('a; b');\n\
         /* block; comment */\n\
         INSERT INTO notes VALUES ('it''s; fine');\n",
    );
    let mut runner = MigrationRunner::new(Arc::clone(&adapter));
    runner.run(&MigrationSource::Bundle(bundle)).await.unwrap();

    let result = adapter
        .exec(&Statement::raw("SELECT body FROM notes ORDER BY rowid"), None)
        .await;
    let bodies: Vec<Value> = result
        .data
        .unwrap()
        .into_iter()
        .map(|mut row| row.remove("body").unwrap())
        .collect();
    assert_eq!(bodies, [Value::from("a; b"), Value::from("it's; fine")]);
}

#[tokio::test]
async fn generated_column_with_expression_default_applies() {
    let adapter = adapter().await;
    let dir = tempfile::tempdir().unwrap();
    let base = SchemaDefinition::new("audit").column("events", "id", "integer primary key");
    generate(dir.path(), "initial", &base.clone().compile().unwrap()).unwrap();
    let next = base
        .column("events", "createdAt", "timestamp_ms not null default now")
        .column("events", "kind", "text not null default 'note'");
    let generated = generate(dir.path(), "stamp events", &next.compile().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(generated.warnings.len(), 2);

    let mut runner = MigrationRunner::new(Arc::clone(&adapter));
    let report = runner
        .run(&MigrationSource::Bundle(MigrationBundle::load(dir.path()).unwrap()))
        .await
        .unwrap();
    assert_eq!(report.applied, ["0000_initial", "0001_stamp_events"]);

    let columns = table_info(adapter.as_ref(), "events").await.unwrap();
    let created_at = columns.iter().find(|c| c.name == "createdAt").unwrap();
    assert!(!created_at.has_default);
    assert!(columns.iter().any(|c| c.name == "kind" && c.has_default));
}

// =============================================================================
// Synthesized migrations
// =============================================================================

#[tokio::test]
async fn synthesized_migration_without_bundle() {
    let adapter = adapter().await;
    let dir = tempfile::tempdir().unwrap();
    let schema = shop_v1().compile().unwrap();

    let source = MigrationSource::resolve(dir.path(), &schema).unwrap();
    assert!(source.is_synthesized());

    let mut runner = MigrationRunner::new(Arc::clone(&adapter));
    let report = runner.run(&source).await.unwrap();
    assert_eq!(report.applied, [INITIAL_TAG]);
    assert_eq!(history_tags(adapter.as_ref()).await, [INITIAL_TAG]);
}

#[tokio::test]
async fn synthesized_migration_refuses_existing_history() {
    let adapter = adapter().await;
    let mut runner = MigrationRunner::new(Arc::clone(&adapter));
    runner
        .run(&MigrationSource::Bundle(
            MigrationBundle::new().with_entry("0000_legacy", "CREATE TABLE legacy (id INTEGER);"),
        ))
        .await
        .unwrap();

    let result = runner
        .run(&MigrationSource::Synthesized(shop_v1().compile().unwrap()))
        .await;
    assert!(matches!(
        result,
        Err(MigrateError::SynthesizedWithHistory { .. })
    ));
    assert!(!table_exists(adapter.as_ref(), "users").await);
}

// =============================================================================
// Introspection
// =============================================================================

#[tokio::test]
async fn introspection_reproduces_compiled_columns() {
    let adapter = adapter().await;
    let schema = shop_v1().compile().unwrap();
    let mut runner = MigrationRunner::new(Arc::clone(&adapter));
    runner
        .run(&MigrationSource::Synthesized(schema.clone()))
        .await
        .unwrap();

    for table in &schema.tables {
        let live = table_info(adapter.as_ref(), &table.name).await.unwrap();
        assert_eq!(live, expected_columns(table), "table {}", table.name);
    }
    assert!(verify(adapter.as_ref(), &schema).await.unwrap().is_empty());

    let drift = verify(adapter.as_ref(), &shop_v2().compile().unwrap())
        .await
        .unwrap();
    assert_eq!(drift.len(), 2);
}

#[tokio::test]
async fn generated_files_follow_the_bundle_layout() {
    let dir = tempfile::tempdir().unwrap();
    generate(dir.path(), "initial", &shop_v1().compile().unwrap()).unwrap();
    let generated = generate(dir.path(), "add notes", &shop_v2().compile().unwrap())
        .unwrap()
        .unwrap();

    let journal: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("meta/_journal.json")).unwrap())
            .unwrap();
    assert_eq!(
        journal,
        serde_json::json!({"entries": [
            {"idx": 0, "tag": "0000_initial"},
            {"idx": 1, "tag": "0001_add_notes"}
        ]})
    );
    assert!(dir.path().join("meta/0001_add_notes_snapshot.json").is_file());
    assert_eq!(
        fs::read_to_string(generated.path).unwrap(),
        "ALTER TABLE users ADD COLUMN active INTEGER NOT NULL DEFAULT 1;\n\
         ALTER TABLE orders ADD COLUMN note TEXT;\n"
    );
}
