//! Time-ordered content hub server.
//!
//! Stores items in channels under time-ordered keys, delivers new items to
//! webhooks in key order, and replicates channels from other hubs.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::file::StorageBackend;
use config::{ConfigLoader, get_database_url};
use server::{build_router, run_server};
use shutdown::Shutdown;
use sqlx::postgres::PgPoolOptions;
use state::Hub;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Time-ordered content hub
#[derive(Parser, Debug)]
#[command(name = "hub-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./hub-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting hub-server v{}", env!("CARGO_PKG_VERSION"));

    let config_loader = ConfigLoader::new(&args.config, args.listen);
    let config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let db_pool = match config.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; content is lost on shutdown");
            None
        }
        StorageBackend::Postgres => {
            let database_url = get_database_url().map_err(|e| {
                tracing::error!("DATABASE_URL environment variable not set");
                e
            })?;

            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .connect(&database_url)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to database: {}", e);
                    e
                })?;
            tracing::info!("Database connection established");

            if args.migrate {
                tracing::info!("Running database migrations...");
                sqlx::migrate!("../migrations")
                    .run(&pool)
                    .await
                    .map_err(|e| {
                        tracing::error!("Failed to run migrations: {}", e);
                        e
                    })?;
                tracing::info!("Migrations completed successfully");
            }
            Some(pool)
        }
    };

    let hub = Hub::build(&config, db_pool.clone())?;

    // Background workers
    let shutdown = Shutdown::new();
    let processor = tokio::spawn(hub.processor.clone().run(shutdown.subscribe()));
    let replication = hub.state.replication.election(hub.coordinator.clone());
    replication.start();

    let router = build_router(hub.state.clone());

    tracing::info!("Starting HTTP server on {}", config.listen);
    let result = run_server(router, config.listen).await;

    tracing::info!("Stopping background workers...");
    shutdown.trigger();
    replication.close().await;
    if let Err(e) = processor.await {
        tracing::error!(error = %e, "Webhook processor task failed");
    }

    if let Some(pool) = db_pool {
        tracing::info!("Closing database connections...");
        pool.close().await;
    }
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
