pub mod handlers;
pub mod types;

use std::sync::Arc;

use axum::{routing::get, Router};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::network::status::NetworkStatusAggregator;
use crate::pipeline::orchestrator::Orchestrator;
use crate::rpc::query::QueryLayer;

/// Shared state handed to every handler. No handler touches the
/// orchestrator/query layer/status aggregator's internals directly — each
/// is a thin delegator (§6) into these three components.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub query: Arc<QueryLayer>,
    pub status_aggregator: Arc<NetworkStatusAggregator>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/analytics/mints/recent", get(handlers::recent_mints))
        .route("/analytics/mints/analyze/{mint}", get(handlers::analyze_mint))
        .route("/analytics/mints/stats", get(handlers::mint_stats))
        .route("/network-status", get(handlers::network_status))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serves the API until `shutdown` is cancelled, matching the teacher's
/// `CancellationToken`-driven shutdown (generalized from `main.rs`'s
/// per-chain-indexer handoff to this crate's single HTTP listener).
pub async fn serve(
    state: Arc<AppState>,
    bind_address: &str,
    shutdown: CancellationToken,
) -> eyre::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    tracing::info!(addr = %bind_address, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
