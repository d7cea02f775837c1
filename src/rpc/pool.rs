//! Connection Pool (§4.3): holds every configured endpoint and picks which
//! one serves the next call. Selection is guarded by a single mutex that is
//! released before any I/O happens — the lock only ever protects the
//! bookkeeping used to rank endpoints, never a network round trip.

use std::sync::Arc;

use reqwest::Client as HttpClient;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::ErrorKind;
use crate::rpc::client::RpcEndpointClient;

struct PoolState {
    round_robin_cursor: usize,
}

pub struct ConnectionPool {
    endpoints: Vec<Arc<RpcEndpointClient>>,
    state: Mutex<PoolState>,
}

impl ConnectionPool {
    pub fn new(urls: &[String], http: HttpClient) -> Self {
        let endpoints = urls
            .iter()
            .map(|url| Arc::new(RpcEndpointClient::new(url.clone(), http.clone())))
            .collect();
        Self {
            endpoints,
            state: Mutex::new(PoolState {
                round_robin_cursor: 0,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Probes every endpoint once at startup. Logs per-endpoint failures at
    /// `warn!` but only returns an error if every endpoint is unreachable —
    /// a partially-up pool is still a usable pool (§4.3).
    pub async fn initialize(&self) -> Result<(), ErrorKind> {
        let mut healthy = 0usize;
        for endpoint in &self.endpoints {
            match endpoint.connect().await {
                Ok(()) => {
                    healthy += 1;
                    debug!(url = endpoint.url(), "endpoint healthy");
                }
                Err(err) => {
                    warn!(url = endpoint.url(), error = %err, "endpoint failed initial health check");
                }
            }
        }
        if healthy == 0 && !self.endpoints.is_empty() {
            return Err(ErrorKind::NodeUnhealthy);
        }
        Ok(())
    }

    /// Selects the best available endpoint: filters out anything currently
    /// cooling down from rate limiting, then ranks survivors by
    /// `(error_count, average_latency_ms)` ascending, breaking ties with a
    /// round-robin cursor so load spreads across equally-good endpoints.
    pub async fn get_client(&self) -> Result<Arc<RpcEndpointClient>, ErrorKind> {
        if self.endpoints.is_empty() {
            return Err(ErrorKind::NodeUnhealthy);
        }

        let mut ranked = Vec::with_capacity(self.endpoints.len());
        for endpoint in &self.endpoints {
            if endpoint.in_cooldown().await {
                continue;
            }
            let latency = endpoint.average_latency_ms().await.unwrap_or(0);
            ranked.push((endpoint.error_count(), latency, endpoint.clone()));
        }

        if ranked.is_empty() {
            return Err(ErrorKind::NodeUnhealthy);
        }

        let mut state = self.state.lock().await;
        ranked.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        let best = (ranked[0].0, ranked[0].1);
        let tied: Vec<_> = ranked
            .iter()
            .filter(|(errors, latency, _)| (*errors, *latency) == best)
            .collect();
        let chosen = &tied[state.round_robin_cursor % tied.len()];
        state.round_robin_cursor = state.round_robin_cursor.wrapping_add(1);
        Ok(chosen.2.clone())
    }

    pub fn endpoints(&self) -> &[Arc<RpcEndpointClient>] {
        &self.endpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_pool_reports_node_unhealthy() {
        let pool = ConnectionPool::new(&[], HttpClient::new());
        assert!(pool.get_client().await.is_err());
    }

    #[tokio::test]
    async fn single_endpoint_pool_selects_it() {
        let pool = ConnectionPool::new(&["https://a.example.invalid".into()], HttpClient::new());
        let client = pool.get_client().await.unwrap();
        assert_eq!(client.url(), "https://a.example.invalid");
    }

    #[tokio::test]
    async fn round_robin_alternates_among_tied_endpoints() {
        let pool = ConnectionPool::new(
            &[
                "https://a.example.invalid".into(),
                "https://b.example.invalid".into(),
            ],
            HttpClient::new(),
        );
        let first = pool.get_client().await.unwrap().url().to_string();
        let second = pool.get_client().await.unwrap().url().to_string();
        assert_ne!(first, second);
    }
}
