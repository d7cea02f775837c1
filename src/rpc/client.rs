//! RPC Endpoint Client (§4.2): a single upstream JSON-RPC endpoint, its
//! HTTP transport, and the bookkeeping the Connection Pool needs to pick
//! between endpoints (rolling latency, error count, rate-limit state).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use reqwest::Client as HttpClient;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::ErrorKind;
use crate::rpc::classify::{classify_http_status, classify_rpc_error};
use crate::rpc::rate_limit::{parse_retry_after, RateLimitState};
use crate::rpc::types::{JsonRpcRequest, RpcEnvelope};

const LATENCY_WINDOW: usize = 10;

/// One upstream JSON-RPC endpoint and everything needed to judge its health.
pub struct RpcEndpointClient {
    url: String,
    http: HttpClient,
    rate_limit: Mutex<RateLimitState>,
    latency_samples_ms: Mutex<VecDeque<u64>>,
    error_count: AtomicU64,
}

impl RpcEndpointClient {
    pub fn new(url: impl Into<String>, http: HttpClient) -> Self {
        Self {
            url: url.into(),
            http,
            rate_limit: Mutex::new(RateLimitState::new()),
            latency_samples_ms: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW)),
            error_count: AtomicU64::new(0),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the Connection Pool should skip this endpoint for now.
    pub async fn should_backoff(&self) -> bool {
        self.rate_limit.lock().await.should_backoff()
    }

    /// Narrower than `should_backoff`: true only while in an explicit
    /// cooldown, not merely low on budget (§4.3 step 1).
    pub async fn in_cooldown(&self) -> bool {
        self.rate_limit.lock().await.in_cooldown()
    }

    pub async fn cooldown_remaining(&self) -> Option<Duration> {
        self.rate_limit.lock().await.cooldown_remaining()
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub async fn average_latency_ms(&self) -> Option<u64> {
        let samples = self.latency_samples_ms.lock().await;
        if samples.is_empty() {
            None
        } else {
            Some(samples.iter().sum::<u64>() / samples.len() as u64)
        }
    }

    /// A cheap liveness probe used when the pool brings an endpoint back
    /// out of cooldown (§4.2, §4.3).
    pub async fn connect(&self) -> Result<(), ErrorKind> {
        self.call("getHealth", Value::Null).await.map(|_| ())
    }

    /// Issues one JSON-RPC call, recording latency/error/rate-limit
    /// bookkeeping. Retrying a failed call is the Query Layer's job, not
    /// this one (§4.2 vs §4.5).
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ErrorKind> {
        let request = JsonRpcRequest::new(method, params);
        let started = Instant::now();

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                ErrorKind::TransportError(e.to_string())
            })?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.record_latency(elapsed_ms).await;

        let status = response.status();
        {
            let mut rate_limit = self.rate_limit.lock().await;
            rate_limit.update_from_headers(response.headers());
            if status.as_u16() == 429 {
                rate_limit.record_rate_limited(parse_retry_after(response.headers()));
            } else {
                rate_limit.record_success();
            }
        }

        if !status.is_success() {
            self.error_count.fetch_add(1, Ordering::Relaxed);
            let retry_after = parse_retry_after(response.headers()).map(|d| d.as_secs());
            return Err(classify_http_status(status.as_u16(), retry_after));
        }

        let body: RpcEnvelope = response
            .json()
            .await
            .map_err(|e| ErrorKind::ParseError(e.to_string()))?;

        body.into_result().map_err(|rpc_err| {
            self.error_count.fetch_add(1, Ordering::Relaxed);
            classify_rpc_error(&rpc_err)
        })
    }

    async fn record_latency(&self, elapsed_ms: u64) {
        let mut samples = self.latency_samples_ms.lock().await;
        if samples.len() == LATENCY_WINDOW {
            samples.pop_front();
        }
        samples.push_back(elapsed_ms);
    }
}
