use std::sync::Arc;

use clap::Parser;
use tickytiz_auth_postgres::PostgresAuthStorage;
use tickytiz_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};
use tickytiz_server::{
    AppState, TickytizServer, create_cache_backend, create_redis_pool, create_revocation_store,
};

/// Tickytiz ticketing backend.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "TICKYTIZ_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: String,
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    // Initialize tracing early with the default level
    tickytiz_server::observability::init_tracing();

    let cli = Cli::parse();

    let cfg = match load_config(Some(&cli.config)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(path = %cli.config, "Configuration loaded");
    tickytiz_server::observability::apply_logging_level(&cfg.logging.level);

    tickytiz_server::metrics::init_metrics();

    if let Err(err) = run(cfg).await {
        tracing::error!(error = %err, "Server initialization failed");
        eprintln!("Server error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cfg: tickytiz_server::AppConfig) -> anyhow::Result<()> {
    let storage =
        PostgresAuthStorage::connect(&cfg.storage.postgres.url, cfg.storage.postgres.pool_size)
            .await?;
    storage.migrate().await?;
    tracing::info!("PostgreSQL connected");

    let redis_pool = create_redis_pool(&cfg.redis).await;
    let cache_backend = create_cache_backend(redis_pool.as_ref(), &cfg.redis, &cfg.cache);
    let revoked_tokens = create_revocation_store(redis_pool.as_ref(), &cfg)?;

    let state = AppState::new(
        &cfg,
        Arc::new(storage.account_storage()),
        revoked_tokens,
        cache_backend,
    )?;

    TickytizServer::new(&cfg, state).run().await
}
