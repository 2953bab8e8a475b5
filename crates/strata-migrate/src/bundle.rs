//! Migration bundles: an ordered journal plus one SQL file per entry.
//!
//! On disk a bundle looks like:
//!
//! ```text
//! migrations/
//!   0000_initial.sql
//!   0001_add_orders.sql
//!   meta/
//!     _journal.json            {"entries": [{"idx": 0, "tag": "0000_initial"}, ...]}
//!     0000_initial_snapshot.json
//!     0001_add_orders_snapshot.json
//! ```
//!
//! Snapshots are the [`NormalizedSchema`] each migration leads to; [`generate`]
//! diffs the newest one against the current schema to write the next file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strata_core::{diff_schemas, DiffWarning, NormalizedSchema};
use tracing::{debug, info};

use crate::error::{MigrateError, Result};

/// Directory holding the journal and snapshots, relative to the bundle root.
pub const META_DIR: &str = "meta";

/// Journal file name inside [`META_DIR`].
pub const JOURNAL_FILE: &str = "_journal.json";

/// One journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Position in apply order.
    pub idx: u32,
    /// Migration tag; also the SQL file stem.
    pub tag: String,
}

/// The ordered list of migrations in a bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journal {
    /// Entries, kept sorted by `idx`.
    pub entries: Vec<JournalEntry>,
}

impl Journal {
    /// Returns the index the next entry should take.
    #[must_use]
    pub fn next_idx(&self) -> u32 {
        self.entries.last().map_or(0, |e| e.idx + 1)
    }
}

/// A migration ready to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Position in apply order.
    pub idx: u32,
    /// Unique tag recorded in the history table.
    pub tag: String,
    /// The full SQL script.
    pub sql: String,
}

/// An ordered set of migrations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationBundle {
    migrations: Vec<Migration>,
}

impl MigrationBundle {
    /// Creates an empty in-memory bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a migration, typically with SQL from `include_str!`.
    #[must_use]
    pub fn with_entry(mut self, tag: impl Into<String>, sql: impl Into<String>) -> Self {
        let idx = self.migrations.last().map_or(0, |m| m.idx + 1);
        self.migrations.push(Migration {
            idx,
            tag: tag.into(),
            sql: sql.into(),
        });
        self
    }

    /// Returns `true` if `dir` contains a journal.
    #[must_use]
    pub fn exists(dir: &Path) -> bool {
        journal_path(dir).is_file()
    }

    /// Loads the journal and every SQL file it names.
    ///
    /// # Errors
    ///
    /// Fails when the directory or a named SQL file is missing, the journal
    /// does not parse, or two entries share a tag or index.
    pub fn load(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(MigrateError::MigrationsDirNotFound(dir.to_path_buf()));
        }
        let journal = read_journal(dir)?;

        let mut migrations: Vec<Migration> = Vec::with_capacity(journal.entries.len());
        for entry in journal.entries {
            if migrations
                .iter()
                .any(|m| m.tag == entry.tag || m.idx == entry.idx)
            {
                return Err(MigrateError::InvalidBundle {
                    path: journal_path(dir),
                    message: format!("duplicate entry {} ({})", entry.idx, entry.tag),
                });
            }
            let path = dir.join(format!("{}.sql", entry.tag));
            if !path.is_file() {
                return Err(MigrateError::MissingSql(entry.tag));
            }
            let sql = fs::read_to_string(&path)?;
            debug!(tag = %entry.tag, path = %path.display(), "Loaded migration");
            migrations.push(Migration {
                idx: entry.idx,
                tag: entry.tag,
                sql,
            });
        }
        migrations.sort_by_key(|m| m.idx);
        Ok(Self { migrations })
    }

    /// Returns the migrations in ascending `idx` order.
    #[must_use]
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Returns the journal describing this bundle.
    #[must_use]
    pub fn journal(&self) -> Journal {
        Journal {
            entries: self
                .migrations
                .iter()
                .map(|m| JournalEntry {
                    idx: m.idx,
                    tag: m.tag.clone(),
                })
                .collect(),
        }
    }

    /// Returns `true` if the bundle holds no migration.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

/// A migration file written by [`generate`].
#[derive(Debug, Clone)]
pub struct GeneratedMigration {
    /// Tag of the new entry.
    pub tag: String,
    /// Path of the SQL file.
    pub path: PathBuf,
    /// Warnings emitted by the differ, also written as comments.
    pub warnings: Vec<DiffWarning>,
}

/// Writes the next migration of the bundle at `dir` so that it reaches
/// `schema`.
///
/// Returns `None` without touching the bundle when nothing changed since the
/// last snapshot.
///
/// # Errors
///
/// Fails on an empty or unusable `name`, an unreadable journal or snapshot,
/// or IO errors.
pub fn generate(
    dir: &Path,
    name: &str,
    schema: &NormalizedSchema,
) -> Result<Option<GeneratedMigration>> {
    let slug = slugify(name);
    if slug.is_empty() {
        return Err(MigrateError::InvalidBundle {
            path: dir.to_path_buf(),
            message: format!("migration name '{name}' has no usable characters"),
        });
    }

    let mut journal = if MigrationBundle::exists(dir) {
        read_journal(dir)?
    } else {
        Journal::default()
    };
    let previous = latest_snapshot(dir, &journal)?
        .unwrap_or_else(|| NormalizedSchema::empty(schema.name.clone()));

    let diff = diff_schemas(&previous, schema);
    if diff.is_empty() {
        info!("No changes detected");
        return Ok(None);
    }

    let idx = journal.next_idx();
    let tag = format!("{idx:04}_{slug}");
    fs::create_dir_all(dir.join(META_DIR))?;

    let path = dir.join(format!("{tag}.sql"));
    if path.exists() {
        return Err(MigrateError::InvalidBundle {
            path,
            message: "migration file already exists".to_string(),
        });
    }
    fs::write(&path, diff.to_sql())?;
    fs::write(
        snapshot_path(dir, &tag),
        serde_json::to_string_pretty(schema)?,
    )?;
    journal.entries.push(JournalEntry {
        idx,
        tag: tag.clone(),
    });
    fs::write(journal_path(dir), serde_json::to_string_pretty(&journal)?)?;

    info!(
        tag = %tag,
        statements = diff.statements.len(),
        warnings = diff.warnings.len(),
        "Generated migration"
    );
    Ok(Some(GeneratedMigration {
        tag,
        path,
        warnings: diff.warnings,
    }))
}

/// Reads the newest snapshot stored for an entry of `journal`.
///
/// # Errors
///
/// Fails when a snapshot file exists but cannot be read or parsed.
pub fn latest_snapshot(dir: &Path, journal: &Journal) -> Result<Option<NormalizedSchema>> {
    for entry in journal.entries.iter().rev() {
        let path = snapshot_path(dir, &entry.tag);
        if path.is_file() {
            let text = fs::read_to_string(&path)?;
            return Ok(Some(serde_json::from_str(&text)?));
        }
    }
    Ok(None)
}

fn read_journal(dir: &Path) -> Result<Journal> {
    let path = journal_path(dir);
    let text = fs::read_to_string(&path).map_err(|e| MigrateError::InvalidBundle {
        path: path.clone(),
        message: e.to_string(),
    })?;
    let mut journal: Journal =
        serde_json::from_str(&text).map_err(|e| MigrateError::InvalidBundle {
            path,
            message: e.to_string(),
        })?;
    journal.entries.sort_by_key(|e| e.idx);
    Ok(journal)
}

fn journal_path(dir: &Path) -> PathBuf {
    dir.join(META_DIR).join(JOURNAL_FILE)
}

fn snapshot_path(dir: &Path, tag: &str) -> PathBuf {
    dir.join(META_DIR).join(format!("{tag}_snapshot.json"))
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::SchemaDefinition;

    fn users_schema() -> NormalizedSchema {
        SchemaDefinition::new("app")
            .column("users", "id", "integer primary key")
            .column("users", "email", "text not null unique")
            .compile()
            .unwrap()
    }

    #[test]
    fn test_in_memory_bundle_orders_entries() {
        let bundle = MigrationBundle::new()
            .with_entry("0000_init", "CREATE TABLE a (id INTEGER);")
            .with_entry("0001_more", "CREATE TABLE b (id INTEGER);");
        let tags: Vec<_> = bundle.migrations().iter().map(|m| m.tag.as_str()).collect();
        assert_eq!(tags, ["0000_init", "0001_more"]);
        assert_eq!(bundle.journal().next_idx(), 2);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Add orders table"), "add_orders_table");
        assert_eq!(slugify("  --v2--  "), "v2");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_generate_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let generated = generate(dir.path(), "initial", &users_schema())
            .unwrap()
            .unwrap();
        assert_eq!(generated.tag, "0000_initial");
        assert!(generated.warnings.is_empty());

        let bundle = MigrationBundle::load(dir.path()).unwrap();
        assert_eq!(bundle.migrations().len(), 1);
        assert!(bundle.migrations()[0]
            .sql
            .contains("CREATE TABLE IF NOT EXISTS users"));
    }

    #[test]
    fn test_generate_is_a_noop_without_changes() {
        let dir = tempfile::tempdir().unwrap();
        generate(dir.path(), "initial", &users_schema()).unwrap();
        assert!(generate(dir.path(), "again", &users_schema())
            .unwrap()
            .is_none());
        assert_eq!(
            MigrationBundle::load(dir.path()).unwrap().migrations().len(),
            1
        );
    }

    #[test]
    fn test_generate_diffs_against_last_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        generate(dir.path(), "initial", &users_schema()).unwrap();

        let next = SchemaDefinition::new("app")
            .column("users", "id", "integer primary key")
            .column("users", "email", "text not null unique")
            .column("users", "nickname", "text")
            .compile()
            .unwrap();
        let generated = generate(dir.path(), "add nickname", &next)
            .unwrap()
            .unwrap();
        assert_eq!(generated.tag, "0001_add_nickname");

        let sql = fs::read_to_string(&generated.path).unwrap();
        assert_eq!(sql, "ALTER TABLE users ADD COLUMN nickname TEXT;\n");
    }

    #[test]
    fn test_load_rejects_missing_sql() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(META_DIR)).unwrap();
        fs::write(
            journal_path(dir.path()),
            r#"{"entries":[{"idx":0,"tag":"0000_gone"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            MigrationBundle::load(dir.path()),
            Err(MigrateError::MissingSql(tag)) if tag == "0000_gone"
        ));
    }

    #[test]
    fn test_load_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            MigrationBundle::load(&missing),
            Err(MigrateError::MigrationsDirNotFound(_))
        ));
    }
}
