use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;

use crate::handlers::mint::{is_admissible_address, is_pump_suffixed};

use super::types::{ErrorEnvelope, MintStatsParams, NetworkStatusParams, RecentMintsParams};
use super::AppState;

type ApiResult = Result<Json<Value>, (StatusCode, Json<ErrorEnvelope>)>;

fn api_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorEnvelope>) {
    (status, Json(ErrorEnvelope::new(message)))
}

const MIN_RECENT_BLOCKS: u64 = 1;
const MAX_RECENT_BLOCKS: u64 = 20;

/// `GET /analytics/mints/recent?blocks=N` (1≤N≤20, §6) — thin delegator to
/// the orchestrator, which owns all caching/coalescing logic.
pub async fn recent_mints(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentMintsParams>,
) -> ApiResult {
    let blocks = params.blocks.unwrap_or(5);
    if !(MIN_RECENT_BLOCKS..=MAX_RECENT_BLOCKS).contains(&blocks) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("blocks must be between {MIN_RECENT_BLOCKS} and {MAX_RECENT_BLOCKS}"),
        ));
    }
    Ok(Json(state.orchestrator.analyze_recent_blocks(blocks).await))
}

/// `GET /analytics/mints/analyze/{mint}` (§6) — supply + account metadata
/// + pump-suffix heuristic for a single mint address.
pub async fn analyze_mint(
    State(state): State<Arc<AppState>>,
    Path(mint): Path<String>,
) -> ApiResult {
    if !is_admissible_address(&mint) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("'{mint}' is not an admissible mint address"),
        ));
    }

    let (supply, account_info) =
        tokio::join!(state.query.get_token_supply(&mint), state.query.get_account_info(&mint));

    let supply = match supply {
        Ok(value) => value,
        Err(crate::error::ErrorKind::InvalidParameters(_)) => {
            return Err(api_error(StatusCode::NOT_FOUND, format!("mint '{mint}' not found")));
        }
        Err(err) => return Err(api_error(StatusCode::SERVICE_UNAVAILABLE, err.to_string())),
    };

    let account_info = account_info.unwrap_or(Value::Null);

    Ok(Json(serde_json::json!({
        "success": true,
        "mint": mint,
        "supply": supply,
        "account_info": account_info,
        "is_pump_token": is_pump_suffixed(&mint),
    })))
}

const STATS_WINDOW_BLOCKS: u64 = 20;

/// `GET /analytics/mints/stats?timeframe=1h|24h|7d` (§6). With no
/// persistence layer (Non-goals, §10) this reports over the orchestrator's
/// full cached recent-block window rather than a true historical
/// aggregate — the requested timeframe is echoed back as a label, not used
/// to widen the query beyond what §4.11's admission bound allows.
pub async fn mint_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MintStatsParams>,
) -> ApiResult {
    let timeframe = params.timeframe.unwrap_or_else(|| "1h".to_string());
    if !["1h", "24h", "7d"].contains(&timeframe.as_str()) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("unsupported timeframe '{timeframe}', expected 1h, 24h, or 7d"),
        ));
    }

    let mut result = state.orchestrator.analyze_recent_blocks(STATS_WINDOW_BLOCKS).await;
    if let Value::Object(map) = &mut result {
        map.insert("timeframe".to_string(), Value::from(timeframe));
    }
    Ok(Json(result))
}

/// `GET /network-status?summary_only=bool` (§6) — thin delegator to the
/// network status aggregator.
pub async fn network_status(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NetworkStatusParams>,
) -> Json<Value> {
    let summary_only = params.summary_only.unwrap_or(false);
    let status = state.status_aggregator.get_comprehensive_status(summary_only).await;
    Json(serde_json::json!({ "success": true, "status": status }))
}
