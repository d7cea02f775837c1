//! Black-box coalescing/caching scenarios for the block pipeline
//! orchestrator, wired up through a real (but endpoint-less) connection
//! pool the way `main.rs` builds it.

use std::sync::Arc;

use chainwatch_indexer::pipeline::orchestrator::Orchestrator;
use chainwatch_indexer::rpc::pool::ConnectionPool;
use chainwatch_indexer::rpc::query::QueryLayer;
use chainwatch_indexer::rpc::types::Commitment;

fn orchestrator_with_no_endpoints() -> Arc<Orchestrator> {
    let pool = Arc::new(ConnectionPool::new(&[], reqwest::Client::new()));
    let query = Arc::new(QueryLayer::new(pool, Commitment::Finalized));
    Arc::new(Orchestrator::new(query))
}

#[tokio::test]
async fn a_failed_probe_never_poisons_the_result_cache() {
    let orchestrator = orchestrator_with_no_endpoints();

    let first = orchestrator.analyze_recent_blocks(1).await;
    assert_eq!(first["success"], false);

    // A second call for the same N must re-probe rather than replay a
    // cached failure, since `finish` only commits successful results.
    let second = orchestrator.analyze_recent_blocks(1).await;
    assert_eq!(second["success"], false);
    assert_eq!(first["error"], second["error"]);
}

#[tokio::test]
async fn requests_for_a_background_sized_n_return_a_processing_started_envelope() {
    let orchestrator = orchestrator_with_no_endpoints();

    // n=5 exceeds the synchronous threshold, so this dispatches a
    // background task and returns immediately rather than blocking the
    // caller on the fetch.
    let response = orchestrator.analyze_recent_blocks(5).await;
    assert_eq!(response["message"], "processing started");
    assert_eq!(response["blocks_requested"], 5);
}

#[tokio::test]
async fn independent_small_n_requests_do_not_share_cached_failures() {
    let orchestrator = orchestrator_with_no_endpoints();

    let for_one = orchestrator.analyze_recent_blocks(1).await;
    let for_two = orchestrator.analyze_recent_blocks(2).await;

    assert_eq!(for_one["success"], false);
    assert_eq!(for_two["success"], false);
}
