//! strata-gateway CLI
//!
//! Serves configured databases over HTTP and issues per-database tokens.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use strata_gateway::{gateway_router, token, GatewayConfig, GatewayState};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// HTTP gateway for strata databases.
#[derive(Parser)]
#[command(name = "strata-gateway")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file.
    #[arg(short, long, env = "STRATA_GATEWAY_CONFIG", default_value = "strata-gateway.toml")]
    config: PathBuf,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the configured databases.
    Serve,

    /// Issue a token for one database.
    Token {
        /// Logical database name.
        db_name: String,

        /// Lifetime in seconds (defaults to `token_ttl_secs`).
        #[arg(long)]
        ttl_secs: Option<u64>,
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
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_ascii_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = GatewayConfig::load(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            let state = GatewayState::from_config(&config).await?;
            let app = gateway_router(state);

            let addr = config.socket_addr();
            let listener = TcpListener::bind(addr).await?;
            info!("HTTP server listening on {}", addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
            info!("Server has shut down gracefully.");
        }

        Commands::Token { db_name, ttl_secs } => {
            let ttl = Duration::from_secs(ttl_secs.unwrap_or(config.token_ttl_secs));
            if !config.databases.contains_key(&db_name) {
                tracing::warn!(db = %db_name, "Database is not served by this configuration");
            }
            println!("{}", token::issue(&db_name, &config.token_secret, ttl)?);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
