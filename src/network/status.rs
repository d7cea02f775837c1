//! Network Status Aggregator (C10, §4.10): fans out cluster-nodes / epoch /
//! performance / vote-accounts queries in parallel (version distribution is
//! derived from the cluster-nodes field rather than a separate query),
//! caches each field independently by its own TTL, and degrades gracefully
//! to a stale value (or a documented default) rather than failing the whole
//! composite report.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::network::cache::TtlCache;
use crate::rpc::pool::ConnectionPool;

const NODES_TTL: Duration = Duration::from_secs(5 * 60);
const STAKES_TTL: Duration = Duration::from_secs(5 * 60);
const PERFORMANCE_TTL: Duration = Duration::from_secs(60);
const EPOCH_TTL: Duration = Duration::from_secs(60);

const NODES_TIMEOUT: Duration = Duration::from_secs(5);
const VOTE_ACCOUNTS_TIMEOUT: Duration = Duration::from_secs(4);
const EPOCH_TIMEOUT: Duration = Duration::from_secs(3);
const PERFORMANCE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Error,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatorInfo {
    pub vote_pubkey: String,
    pub activated_stake: u64,
    pub delinquent: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub num_slots: u64,
    pub num_transactions: u64,
    pub sample_period_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StakeConcentration {
    pub top_10_pct: f64,
    pub top_20_pct: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub slots_per_second: f64,
    pub avg_slot_time_ms: f64,
    pub transactions_per_second: f64,
}

/// Tally of `getClusterNodes`' per-node `version` field, with `latest_version`
/// the numerically-largest semver among non-"unknown" entries (§4.10).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionDistribution {
    pub counts: HashMap<String, u64>,
    pub latest_version: Option<String>,
}

/// The composite report returned by [`NetworkStatusAggregator::get_comprehensive_status`].
/// Every field carries a usable default so callers never have to branch
/// on absence (§4.10) — a field that failed to fetch and had no stale
/// cached value shows up as zero/"unknown", not as a missing key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub health: Option<HealthState>,
    pub cluster_node_count: u64,
    pub version_distribution: VersionDistribution,
    pub epoch: u64,
    pub slot_index: u64,
    pub slots_in_epoch: u64,
    pub performance: PerformanceSummary,
    pub validator_count: u64,
    pub delinquent_validator_count: u64,
    pub stake_concentration: StakeConcentration,
    pub failed_fields: Vec<String>,
}

/// Identifies which of the five parallel fields a fetch targets, also used
/// as the TTL cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    Nodes,
    Epoch,
    Performance,
    VoteAccounts,
}

pub struct NetworkStatusAggregator {
    pool: std::sync::Arc<ConnectionPool>,
    cache: TtlCache<Field, Value>,
}

impl NetworkStatusAggregator {
    pub fn new(pool: std::sync::Arc<ConnectionPool>) -> Self {
        Self {
            pool,
            cache: TtlCache::new(),
        }
    }

    /// Fans out all five RPC calls in parallel, each under its own
    /// per-field timeout; on success updates the cache, on timeout/error
    /// falls back to the last stale value, and only counts a field as
    /// failed when there is neither (§4.10).
    pub async fn get_comprehensive_status(&self, summary_only: bool) -> NetworkStatus {
        let (nodes, epoch, performance, vote_accounts) = tokio::join!(
            self.fetch_field(Field::Nodes, "getClusterNodes", Value::Null, NODES_TTL, NODES_TIMEOUT),
            self.fetch_field(Field::Epoch, "getEpochInfo", Value::Null, EPOCH_TTL, EPOCH_TIMEOUT),
            self.fetch_field(
                Field::Performance,
                "getRecentPerformanceSamples",
                serde_json::json!([5]),
                PERFORMANCE_TTL,
                PERFORMANCE_TIMEOUT,
            ),
            self.fetch_field(
                Field::VoteAccounts,
                "getVoteAccounts",
                Value::Null,
                STAKES_TTL,
                VOTE_ACCOUNTS_TIMEOUT,
            ),
        );

        let mut failed_fields = Vec::new();
        let mut status = NetworkStatus::default();

        match nodes {
            Some(v) => {
                let nodes = v.as_array().cloned().unwrap_or_default();
                status.cluster_node_count = nodes.len() as u64;
                status.version_distribution = build_version_distribution(&nodes);
            }
            None => failed_fields.push("nodes".to_string()),
        }

        match epoch {
            Some(v) => {
                status.epoch = v.get("epoch").and_then(Value::as_u64).unwrap_or(0);
                status.slot_index = v.get("slotIndex").and_then(Value::as_u64).unwrap_or(0);
                status.slots_in_epoch = v.get("slotsInEpoch").and_then(Value::as_u64).unwrap_or(0);
            }
            None => failed_fields.push("epoch".to_string()),
        }

        match performance {
            Some(v) => status.performance = summarize_performance(&v),
            None => failed_fields.push("performance".to_string()),
        }

        match vote_accounts {
            Some(v) => {
                let current = v.get("current").and_then(Value::as_array).cloned().unwrap_or_default();
                let delinquent = v
                    .get("delinquent")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                status.validator_count = (current.len() + delinquent.len()) as u64;
                status.delinquent_validator_count = delinquent.len() as u64;
                status.stake_concentration = stake_concentration(&current, &delinquent);
            }
            None => failed_fields.push("vote_accounts".to_string()),
        }

        status.failed_fields = failed_fields;
        status.health = Some(classify_health(status.failed_fields.len()));

        if summary_only {
            status.version_distribution.counts.clear();
        }

        status
    }

    /// Checks the cache first; on a miss, issues the RPC under `timeout`;
    /// on success updates the cache; on timeout or error, falls back to a
    /// stale cached value if one exists, returning `None` only when there
    /// is no fresh value and no stale one either (§4.10).
    async fn fetch_field(
        &self,
        field: Field,
        method: &str,
        params: Value,
        ttl: Duration,
        timeout: Duration,
    ) -> Option<Value> {
        if let Some(cached) = self.cache.get(&field).await {
            return Some(cached);
        }

        let client = match self.pool.get_client().await {
            Ok(client) => client,
            Err(_) => return self.cache.get_even_if_stale(&field).await,
        };

        match tokio::time::timeout(timeout, client.call(method, params)).await {
            Ok(Ok(value)) => {
                self.cache.insert(field, value.clone(), ttl).await;
                Some(value)
            }
            Ok(Err(err)) => {
                tracing::debug!(method, error = %err, "network status field fetch failed, falling back to stale cache");
                self.cache.get_even_if_stale(&field).await
            }
            Err(_) => {
                tracing::debug!(method, "network status field fetch timed out");
                self.cache.get_even_if_stale(&field).await
            }
        }
    }
}

/// `healthy` if zero fields failed, `degraded` if ≤ 2, else `error` (§4.10).
fn classify_health(failed_count: usize) -> HealthState {
    match failed_count {
        0 => HealthState::Healthy,
        1..=2 => HealthState::Degraded,
        _ => HealthState::Error,
    }
}

/// `slots_per_second = total_slots/total_time`, `avg_slot_time_ms = 1000/slots_per_second`,
/// `tps = total_transactions/total_time` (§4.10).
fn summarize_performance(samples: &Value) -> PerformanceSummary {
    let samples = samples.as_array().cloned().unwrap_or_default();
    let total_slots: u64 = samples.iter().filter_map(|s| s.get("numSlots")?.as_u64()).sum();
    let total_txs: u64 = samples
        .iter()
        .filter_map(|s| s.get("numTransactions")?.as_u64())
        .sum();
    let total_time: u64 = samples
        .iter()
        .filter_map(|s| s.get("samplePeriodSecs")?.as_u64())
        .sum();

    if total_time == 0 {
        return PerformanceSummary::default();
    }
    let slots_per_second = total_slots as f64 / total_time as f64;
    let avg_slot_time_ms = if slots_per_second > 0.0 {
        1000.0 / slots_per_second
    } else {
        0.0
    };
    PerformanceSummary {
        slots_per_second,
        avg_slot_time_ms,
        transactions_per_second: total_txs as f64 / total_time as f64,
    }
}

/// Tallies each cluster node's `version` field (missing/null counted as
/// "unknown") and picks `latest_version` as the numerically-largest semver
/// among the non-"unknown" entries (§4.10).
fn build_version_distribution(nodes: &[Value]) -> VersionDistribution {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for node in nodes {
        let version = node
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        *counts.entry(version.to_string()).or_insert(0) += 1;
    }

    let latest_version = counts
        .keys()
        .filter(|v| v.as_str() != "unknown")
        .filter_map(|v| parse_semver(v).map(|key| (key, v.clone())))
        .max_by_key(|(key, _)| *key)
        .map(|(_, v)| v);

    VersionDistribution {
        counts,
        latest_version,
    }
}

/// Parses the `major.minor.patch` prefix of a semver string, ignoring any
/// `-` pre-release/build suffix. Missing minor/patch components default to 0.
fn parse_semver(version: &str) -> Option<(u64, u64, u64)> {
    let core = version.split('-').next().unwrap_or(version);
    let mut parts = core.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().map(str::parse).transpose().ok()?.unwrap_or(0);
    let patch = parts.next().map(str::parse).transpose().ok()?.unwrap_or(0);
    Some((major, minor, patch))
}

/// Sorts by activated stake descending and reports top-10/top-20 stake as
/// a percentage of the total (§4.10).
fn stake_concentration(current: &[Value], delinquent: &[Value]) -> StakeConcentration {
    let mut stakes: Vec<u64> = current
        .iter()
        .chain(delinquent.iter())
        .filter_map(|v| v.get("activatedStake")?.as_u64())
        .collect();
    stakes.sort_unstable_by(|a, b| b.cmp(a));

    let total: u64 = stakes.iter().sum();
    if total == 0 {
        return StakeConcentration::default();
    }
    let top = |n: usize| -> f64 { stakes.iter().take(n).sum::<u64>() as f64 / total as f64 * 100.0 };
    StakeConcentration {
        top_10_pct: top(10),
        top_20_pct: top(20),
    }
}
