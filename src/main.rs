use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use chainwatch_indexer::api::{self, AppState};
use chainwatch_indexer::config::Config;
use chainwatch_indexer::network::status::NetworkStatusAggregator;
use chainwatch_indexer::pipeline::orchestrator::Orchestrator;
use chainwatch_indexer::rpc::pool::ConnectionPool;
use chainwatch_indexer::rpc::query::QueryLayer;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Initialize structured logging (set RUST_LOG=info for output)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    tracing::info!("ChainWatch Indexer starting");

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = Config::load(&config_path)?;
    tracing::info!(
        endpoints = config.rpc.endpoints().len(),
        "Configuration loaded from {}",
        config_path
    );

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_millis(config.rpc.request_timeout_ms))
        .pool_max_idle_per_host(config.rpc.pool_size)
        .build()
        .map_err(|e| eyre::eyre!("Failed to build HTTP client: {}", e))?;

    let pool = Arc::new(ConnectionPool::new(&config.rpc.endpoints(), http));
    pool.initialize().await?;
    tracing::info!(endpoints = pool.len(), "Connection pool initialized");

    let query = Arc::new(QueryLayer::with_config(
        pool.clone(),
        config.rpc.ingestion_commitment,
        config.rpc.tip_probe_commitment,
        config.rpc.max_retries,
    ));
    let orchestrator = Arc::new(Orchestrator::new(query.clone()));
    let status_aggregator = Arc::new(NetworkStatusAggregator::new(pool.clone()));

    let state = Arc::new(AppState {
        orchestrator,
        query,
        status_aggregator,
    });

    let shutdown = CancellationToken::new();
    let server_shutdown = shutdown.clone();
    let bind_address = config.api.bind_address.clone();

    tracing::info!(addr = %bind_address, "Starting API server. Press Ctrl+C to stop.");

    let server =
        tokio::spawn(async move { api::serve(state, &bind_address, server_shutdown).await });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping API server...");
    shutdown.cancel();
    server.await??;

    tracing::info!("ChainWatch Indexer stopped gracefully");
    Ok(())
}
