//! strata-migrate CLI
//!
//! Command-line tool for generating and applying migration bundles.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use strata_core::{NormalizedSchema, SchemaDefinition};
use strata_exec::{Adapter, SqliteAdapter};
use strata_migrate::introspect::{table_info, table_names, verify};
use strata_migrate::{generate, MigrationBundle, MigrationRunner, MigrationSource};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Journal-driven schema migrations.
#[derive(Parser)]
#[command(name = "strata-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// Migrations directory.
    #[arg(short, long, env = "STRATA_MIGRATIONS_DIR", default_value = "migrations")]
    migrations_dir: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the migrations history table.
    Init,

    /// Apply pending migrations.
    Migrate {
        /// Schema definition (JSON) used when no bundle exists.
        #[arg(short, long)]
        schema: Option<PathBuf>,
    },

    /// Show applied and pending migrations.
    Status {
        /// Schema definition (JSON) used when no bundle exists.
        #[arg(short, long)]
        schema: Option<PathBuf>,
    },

    /// Write the next migration from a schema definition.
    Generate {
        /// Schema definition (JSON).
        #[arg(short, long)]
        schema: PathBuf,

        /// Name of the migration.
        #[arg(short, long, default_value = "auto")]
        name: String,
    },

    /// Print the full DDL of a schema definition.
    Sql {
        /// Schema definition (JSON).
        #[arg(short, long)]
        schema: PathBuf,
    },

    /// Show the columns of live tables.
    Inspect {
        /// Only this table.
        table: Option<String>,

        /// Compare the live store with this schema definition (JSON).
        #[arg(short, long)]
        schema: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match &cli.command {
        Commands::Generate { schema, name } => {
            let schema = load_schema(schema)?;
            match generate(&cli.migrations_dir, name, &schema)? {
                Some(generated) => {
                    for warning in &generated.warnings {
                        warn!("{warning}");
                    }
                    info!("Created migration: {}", generated.path.display());
                }
                None => info!("Schema unchanged, nothing to generate."),
            }
            return Ok(());
        }
        Commands::Sql { schema } => {
            print!("{}", load_schema(schema)?.to_sql());
            return Ok(());
        }
        _ => {}
    }

    // Connect to database
    let options = SqliteConnectOptions::from_str(&cli.database)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    let adapter: Arc<dyn Adapter> = Arc::new(SqliteAdapter::new(pool));
    let mut runner = MigrationRunner::new(Arc::clone(&adapter));

    match cli.command {
        Commands::Init => {
            info!("Initializing migrations system...");
            runner.init().await?;
            info!("Migrations table created successfully.");
        }

        Commands::Migrate { schema } => {
            let source = resolve_source(&cli.migrations_dir, schema.as_deref())?;
            let report = runner.run(&source).await?;
            info!(
                "Applied {} migration(s), {} already up to date.",
                report.applied.len(),
                report.skipped.len()
            );
        }

        Commands::Status { schema } => {
            let source = resolve_source(&cli.migrations_dir, schema.as_deref())?;
            let status = runner.status(&source).await?;
            if status.is_empty() {
                info!("No migrations found.");
            } else {
                println!("\nMigrations:");
                println!("{:-<60}", "");
                for entry in &status {
                    let mark = if entry.applied { "X" } else { " " };
                    println!(" [{mark}] {:>4} {}", entry.idx, entry.tag);
                }
                println!();
            }
        }

        Commands::Inspect { table, schema } => {
            if let Some(path) = schema {
                let schema = load_schema(&path)?;
                let drift = verify(adapter.as_ref(), &schema).await?;
                if drift.is_empty() {
                    info!("Live schema matches '{}'.", schema.name);
                }
                for item in &drift {
                    warn!("{item}");
                }
            } else {
                let tables = match table {
                    Some(table) => vec![table],
                    None => table_names(adapter.as_ref()).await?,
                };
                for name in tables {
                    println!("\n{name}");
                    println!("{:-<60}", "");
                    for column in table_info(adapter.as_ref(), &name).await? {
                        println!(
                            " {:<24} {:<8} {}{}{}",
                            column.name,
                            column.column_type,
                            if column.primary_key { "PK " } else { "" },
                            if column.not_null { "NOT NULL " } else { "" },
                            if column.has_default { "DEFAULT" } else { "" },
                        );
                    }
                }
                println!();
            }
        }

        Commands::Generate { .. } | Commands::Sql { .. } => {}
    }

    Ok(())
}

fn load_schema(path: &Path) -> anyhow::Result<NormalizedSchema> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading schema definition {}", path.display()))?;
    let definition: SchemaDefinition = serde_json::from_str(&text)
        .with_context(|| format!("parsing schema definition {}", path.display()))?;
    Ok(definition.compile()?)
}

fn resolve_source(dir: &Path, schema: Option<&Path>) -> anyhow::Result<MigrationSource> {
    if MigrationBundle::exists(dir) {
        return Ok(MigrationSource::Bundle(MigrationBundle::load(dir)?));
    }
    let Some(path) = schema else {
        anyhow::bail!(
            "no migration bundle in {} and no --schema given",
            dir.display()
        );
    };
    Ok(MigrationSource::Synthesized(load_schema(path)?))
}
