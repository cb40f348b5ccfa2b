//! jt-import - reference-data import service
//!
//! `serve` (default) exposes the HTTP trigger and event stream; `run` performs
//! one import from the command line and prints the summary as JSON.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};

use jt_common::bootstrap::ensure_roles_and_admin;
use jt_common::config::{database_path, resolve_root_folder, TomlConfig};
use jt_common::db::init_database;
use jt_common::events::EventBus;
use jt_import::{build_router, AppState, ImportOrchestrator};

/// Command-line arguments for jt-import
#[derive(Parser, Debug)]
#[command(name = "jt-import")]
#[command(about = "Reference-data import service for JobTrack")]
#[command(version)]
struct Args {
    /// Root folder holding the database and data files
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    /// Config file (defaults to the platform config location)
    #[arg(short, long, global = true, env = "JOBTRACK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Import once and exit
    Run {
        /// Organization file (defaults to the configured path)
        #[arg(long)]
        organizations: Option<PathBuf>,
        /// Posting file (defaults to the configured path)
        #[arg(long)]
        postings: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jt_import=info,jt_common=info,tower_http=info".into()),
        )
        .init();

    // Build identification first, before any database work
    info!(
        "Starting JobTrack Import (jt-import) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => TomlConfig::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TomlConfig::load().context("Failed to load config")?,
    };

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;
    info!("Root folder: {}", root_folder.display());

    let db_path = database_path(&root_folder);
    let pool = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    let outcome = ensure_roles_and_admin(&pool, config.admin.as_ref())
        .await
        .context("Bootstrap failed")?;
    if outcome.shared_secret == 0 {
        info!("API authentication disabled (shared_secret = 0)");
    }

    let event_bus = EventBus::new(100);
    let orchestrator =
        ImportOrchestrator::new(pool.clone(), event_bus.clone(), config.import.clone());

    match args.command.unwrap_or(Command::Serve { port: None }) {
        Command::Run {
            organizations,
            postings,
        } => {
            let organizations = organizations
                .unwrap_or_else(|| config.import.organizations_path(&root_folder));
            let postings = postings.unwrap_or_else(|| config.import.postings_path(&root_folder));

            match orchestrator.run(&organizations, &postings).await {
                Ok(summary) => {
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                    Ok(())
                }
                Err(e) if e.is_not_found() => {
                    anyhow::bail!("Import files not found: {}", e)
                }
                Err(e) => Err(e).context("Import processing failed"),
            }
        }
        Command::Serve { port } => {
            let port = port.unwrap_or(config.port);
            let state = AppState::new(
                pool,
                event_bus,
                orchestrator,
                root_folder,
                outcome.shared_secret,
            );
            let app = build_router(state);

            let addr = format!("{}:{}", config.bind_address, port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind to {}", addr))?;
            info!("jt-import listening on http://{}", addr);
            info!("Health check: http://{}/health", addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("Server error")?;

            info!("Server shutdown complete");
            Ok(())
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
