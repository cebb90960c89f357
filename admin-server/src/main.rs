mod auth;
mod cli;
mod config;
mod db;
mod error;
mod models;
mod routes;
mod services;
mod state;
mod ws;

use crate::config::AppConfig;
use crate::db::connection::create_pool;
use crate::db::migrate::migrate;
use crate::state::AppState;
use backup_core::utils::logger;
use backup_core::BackupKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about = "Job board backup administration", long_about = None)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the admin HTTP server (default)
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Create a backup artifact and record it
    Export {
        /// database, media or full
        #[arg(short, long, default_value = "database")]
        kind: BackupKind,

        /// Custom artifact name
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Restore data from an artifact file
    Restore {
        file: PathBuf,

        /// Confirm that current data will be replaced
        #[arg(long)]
        yes: bool,
    },
    /// Check that an artifact file is usable
    Validate { file: PathBuf },
    /// Show backup directory, database and media statistics
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let mut config = AppConfig::from_env()?;

    let log_level = args.log_level.as_deref().unwrap_or(&config.log_level);
    logger::init(log_level)?;

    // Ensure data directories exist
    std::fs::create_dir_all(&config.data_dir)?;
    std::fs::create_dir_all(&config.backups_dir)?;
    std::fs::create_dir_all(&config.media_root)?;
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Initialize database
    let pool = create_pool(&config.db_path)?;
    migrate(&pool)?;

    let command = args.command.unwrap_or(Command::Serve { port: None });
    let code = match command {
        Command::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            serve(pool, config).await?;
            ExitCode::SUCCESS
        }
        Command::Export { kind, name } => {
            tokio::task::spawn_blocking(move || cli::export(&pool, &config, kind, name.as_deref())).await?
        }
        Command::Restore { file, yes } => {
            tokio::task::spawn_blocking(move || cli::restore(&pool, &config, &file, yes)).await?
        }
        Command::Validate { file } => {
            tokio::task::spawn_blocking(move || cli::validate(&pool, &config, &file)).await?
        }
        Command::Info => tokio::task::spawn_blocking(move || cli::info(&pool, &config)).await?,
    };

    Ok(code)
}

async fn serve(pool: db::connection::DbPool, config: AppConfig) -> anyhow::Result<()> {
    tracing::info!(
        "Starting jobboard-admin v{} on port {}",
        env!("CARGO_PKG_VERSION"),
        config.port
    );
    tracing::info!(
        "Backups in {}, media in {}",
        config.backups_dir.display(),
        config.media_root.display()
    );
    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN is not set; listening on loopback only");
    }

    let addr = config.bind_address();
    let state = Arc::new(AppState::new(pool, config));
    let app = routes::create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    // Graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.shutdown.clone()))
        .await?;

    tracing::info!("Shutting down...");
    db::connection::close_pool(&state.db);
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl+c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
        _ = cancel.cancelled() => {},
    }

    cancel.cancel();
}
