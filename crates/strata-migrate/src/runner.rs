//! Applies migrations, each as one atomic batch.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use strata_core::sql::split_statements;
use strata_core::{NormalizedSchema, Statement};
use strata_exec::{Adapter, Db};
use tracing::{debug, info, warn};

use crate::bundle::{Migration, MigrationBundle};
use crate::error::{MigrateError, Result};
use crate::history::MigrationHistory;

/// Tag of the migration synthesized from a schema when no bundle exists.
pub const INITIAL_TAG: &str = "0000_initial";

/// Where the ordered migration list comes from.
#[derive(Debug, Clone)]
pub enum MigrationSource {
    /// A pre-built journal and its SQL files.
    Bundle(MigrationBundle),
    /// A single initial migration rendered from the current schema.
    Synthesized(NormalizedSchema),
}

impl MigrationSource {
    /// Loads the bundle at `dir`, or falls back to synthesizing from
    /// `schema` when the directory holds no journal.
    ///
    /// # Errors
    ///
    /// Propagates bundle loading errors.
    pub fn resolve(dir: &Path, schema: &NormalizedSchema) -> Result<Self> {
        if MigrationBundle::exists(dir) {
            Ok(Self::Bundle(MigrationBundle::load(dir)?))
        } else {
            debug!(dir = %dir.display(), "No bundle found, synthesizing initial migration");
            Ok(Self::Synthesized(schema.clone()))
        }
    }

    /// Returns the migrations in ascending `idx` order.
    #[must_use]
    pub fn migrations(&self) -> Vec<Migration> {
        match self {
            Self::Bundle(bundle) => bundle.migrations().to_vec(),
            Self::Synthesized(schema) => vec![Migration {
                idx: 0,
                tag: INITIAL_TAG.to_string(),
                sql: schema.to_sql(),
            }],
        }
    }

    /// Returns `true` for [`MigrationSource::Synthesized`].
    #[must_use]
    pub const fn is_synthesized(&self) -> bool {
        matches!(self, Self::Synthesized(_))
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Tags applied by this run, in order.
    pub applied: Vec<String>,
    /// Tags already recorded and left untouched.
    pub skipped: Vec<String>,
}

/// State of one migration against a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Position in apply order.
    pub idx: u32,
    /// Migration tag.
    pub tag: String,
    /// Whether the history table records it.
    pub applied: bool,
}

/// Applies pending migrations through an adapter.
pub struct MigrationRunner {
    history: MigrationHistory,
}

impl MigrationRunner {
    /// Creates a runner over `adapter`.
    #[must_use]
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self {
            history: MigrationHistory::new(adapter),
        }
    }

    /// Returns the history manager.
    #[must_use]
    pub const fn history(&self) -> &MigrationHistory {
        &self.history
    }

    /// Ensures the history table exists.
    ///
    /// # Errors
    ///
    /// Fails when the table cannot be created.
    pub async fn init(&mut self) -> Result<()> {
        self.history.ensure_table().await
    }

    /// Applies every pending migration of `source` in `idx` order.
    ///
    /// Each migration runs with its history insert as one batch; the first
    /// failure stops the run and leaves that migration unrecorded, so the
    /// next run retries it from scratch.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::SynthesizedWithHistory`] when a synthesized
    /// migration is pending against a non-empty history, and
    /// [`MigrateError::MigrationFailed`] for the first failed migration.
    pub async fn run(&mut self, source: &MigrationSource) -> Result<MigrationReport> {
        self.init().await?;
        let applied = self.applied_tags().await?;
        let mut report = MigrationReport::default();

        let migrations = source.migrations();
        let pending = migrations
            .iter()
            .filter(|m| !applied.contains(&m.tag))
            .count();
        if source.is_synthesized() && pending > 0 && !applied.is_empty() {
            return Err(MigrateError::SynthesizedWithHistory {
                applied: applied.len(),
            });
        }

        for migration in migrations {
            if applied.contains(&migration.tag) {
                debug!(tag = %migration.tag, "Already applied");
                report.skipped.push(migration.tag);
                continue;
            }
            self.apply(&migration).await?;
            report.applied.push(migration.tag);
        }

        if report.applied.is_empty() {
            info!("No migrations to apply");
        }
        Ok(report)
    }

    /// Lists every migration of `source` with its applied state.
    ///
    /// # Errors
    ///
    /// Fails when the history table cannot be read.
    pub async fn status(&mut self, source: &MigrationSource) -> Result<Vec<MigrationStatus>> {
        self.init().await?;
        let applied = self.applied_tags().await?;
        Ok(source
            .migrations()
            .into_iter()
            .map(|m| MigrationStatus {
                idx: m.idx,
                applied: applied.contains(&m.tag),
                tag: m.tag,
            })
            .collect())
    }

    async fn applied_tags(&mut self) -> Result<HashSet<String>> {
        Ok(self
            .history
            .get_applied()
            .await?
            .into_iter()
            .map(|m| m.tag)
            .collect())
    }

    async fn apply(&mut self, migration: &Migration) -> Result<()> {
        info!(tag = %migration.tag, "Applying migration");
        let statements: Vec<Statement> = split_statements(&migration.sql)
            .into_iter()
            .map(Statement::raw)
            .collect();
        for statement in &statements {
            debug!(tag = %migration.tag, sql = %statement.sql, "Migration statement");
        }

        let count = statements.len();
        let result = self.history.apply(&migration.tag, statements).await;
        if !result.success {
            let error = result
                .error
                .unwrap_or_else(|| "unknown error".to_string());
            warn!(tag = %migration.tag, error = %error, "Migration failed, rolled back");
            return Err(MigrateError::MigrationFailed {
                tag: migration.tag.clone(),
                error,
            });
        }
        info!(tag = %migration.tag, statements = count, "Applied migration");
        Ok(())
    }
}

/// Applies pending migrations, then binds the adapter to `schema`.
///
/// Query callers only receive the [`Db`] once the store is up to date.
///
/// # Errors
///
/// Propagates migration failures and [`strata_exec::ConfigError`]s.
pub async fn migrate_and_open(
    adapter: Arc<dyn Adapter>,
    source: &MigrationSource,
    schema: NormalizedSchema,
) -> Result<Db> {
    let mut runner = MigrationRunner::new(Arc::clone(&adapter));
    runner.run(source).await?;
    Ok(Db::new(adapter, schema)?)
}
