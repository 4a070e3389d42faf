//! Switchboard - control plane for a fleet of tunnel edge nodes
//!
//! `serve` runs the operator API; `sample` runs the occupancy sampler.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use switchboard_api::{ApiServer, ApiServerConfig, AppState};
use switchboard_control::{
    ControlChannel, PresenceRegistry, SlidingWindowLimiter, DEFAULT_SCAN_BATCH,
};
use switchboard_sampler::{DatabaseSink, OccupancySampler};
use switchboard_store::{CoordinationStore, RedisStore};
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

/// Switchboard - control plane for a fleet of tunnel edge nodes
#[derive(Parser, Debug)]
#[command(name = "switchboard")]
#[command(about = "Observe, stop and rate limit tunnels across the edge fleet")]
#[command(version = env!("GIT_TAG"))]
#[command(long_version = concat!(env!("GIT_TAG"), "\nCommit: ", env!("GIT_HASH"), "\nBuilt: ", env!("BUILD_TIME")))]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Coordination store (Redis) URL
    #[arg(
        long,
        global = true,
        env = "REDIS_URL",
        default_value = "redis://localhost:6379"
    )]
    redis_url: String,

    /// Keys walked per SCAN round trip when counting online tunnels
    #[arg(long, global = true, env = "SCAN_BATCH", default_value_t = DEFAULT_SCAN_BATCH)]
    scan_batch: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator API (tunnel status, stop, health)
    Serve {
        /// API server bind address
        #[arg(long, env = "API_ADDR", default_value = "127.0.0.1:3080")]
        api_addr: SocketAddr,

        /// Tunnel record database URL
        #[arg(long, env = "DATABASE_URL", default_value = "sqlite::memory:")]
        database_url: String,

        /// Disable CORS
        #[arg(long)]
        no_cors: bool,

        /// Create the tunnels table if missing (local development stores only;
        /// the dashboard owns the production schema)
        #[arg(long, env = "MIGRATE_RECORDS")]
        migrate_records: bool,
    },

    /// Run the occupancy sampler
    Sample {
        /// Analytics database URL
        #[arg(
            long,
            env = "ANALYTICS_DATABASE_URL",
            default_value = "postgres://localhost:5432/switchboard"
        )]
        analytics_database_url: String,

        /// Seconds between samples
        #[arg(long, env = "SAMPLE_INTERVAL_SECS", default_value_t = 60)]
        sample_interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let store: Arc<dyn CoordinationStore> = Arc::new(
        RedisStore::connect(&cli.redis_url)
            .await
            .context("Failed to connect to Redis")?,
    );
    let registry = PresenceRegistry::new(store.clone()).with_scan_batch(cli.scan_batch);

    match cli.command {
        Commands::Serve {
            api_addr,
            database_url,
            no_cors,
            migrate_records,
        } => {
            info!("Switchboard API starting...");

            let db = open_record_store(&database_url, migrate_records).await?;

            let state = AppState {
                registry,
                channel: ControlChannel::new(store.clone()),
                limiter: SlidingWindowLimiter::new(store),
                db,
            };
            let config = ApiServerConfig {
                bind_addr: api_addr,
                enable_cors: !no_cors,
            };
            let server = ApiServer::new(config, state);

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down...");
                }
                result = server.start() => {
                    if let Err(e) = result {
                        error!("API server error: {:#}", e);
                        return Err(e);
                    }
                }
            }
        }

        Commands::Sample {
            analytics_database_url,
            sample_interval_secs,
        } => {
            info!("Switchboard sampler starting...");

            let db = switchboard_db::connect(&analytics_database_url)
                .await
                .context("Failed to connect to analytics database")?;
            switchboard_db::migrate_analytics(&db)
                .await
                .context("Failed to ensure analytics table")?;

            let sampler = Arc::new(OccupancySampler::new(
                registry,
                Arc::new(DatabaseSink::new(db)),
            ));
            let period = Duration::from_secs(sample_interval_secs.max(1));

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down...");
                }
                _ = sampler.run(period) => {}
            }
        }
    }

    info!("Switchboard stopped");
    Ok(())
}

/// Connect to the tunnel record store
///
/// The store is read-only unless `migrate_records` is set, in which case the
/// tunnels table is created for a local development database.
async fn open_record_store(
    database_url: &str,
    migrate_records: bool,
) -> Result<switchboard_db::DatabaseConnection> {
    let db = switchboard_db::connect(database_url)
        .await
        .context("Failed to connect to tunnel database")?;

    if migrate_records {
        switchboard_db::migrate(&db)
            .await
            .context("Failed to run tunnel database migrations")?;
    } else if !switchboard_db::has_table(&db, "tunnels")
        .await
        .context("Failed to inspect tunnel database")?
    {
        warn!("Tunnel database has no tunnels table; status and stop will fail until it exists");
    }

    Ok(db)
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Failed to initialize logging filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
