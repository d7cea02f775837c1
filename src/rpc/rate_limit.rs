//! Per-endpoint rate-limit tracking (§3, §4.1).
//!
//! The tracker derives its state from the server's own accounting
//! (response headers) rather than a client-side token bucket, so it can
//! never drift from what the endpoint is actually enforcing.

use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;

const METHOD_REMAINING_THRESHOLD: u64 = 5;
const RPS_REMAINING_THRESHOLD: u64 = 10;
const CONN_REMAINING_THRESHOLD: u64 = 3;
const DEFAULT_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RateLimitState {
    method_limit: Option<u64>,
    method_remaining: Option<u64>,
    rps_limit: Option<u64>,
    rps_remaining: Option<u64>,
    conn_limit: Option<u64>,
    conn_remaining: Option<u64>,
    cooldown_until: Option<Instant>,
    last_update: Option<Instant>,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self {
            method_limit: None,
            method_remaining: None,
            rps_limit: None,
            rps_remaining: None,
            conn_limit: None,
            conn_remaining: None,
            cooldown_until: None,
            last_update: None,
        }
    }
}

impl RateLimitState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds `ratelimit-method-{limit,remaining}`, `ratelimit-rps-{limit,remaining}`,
    /// and `ratelimit-conn-{limit,remaining}` into the tracker. Absent headers
    /// leave the prior values intact — not every endpoint emits all of them
    /// on every response (§4.1).
    pub fn update_from_headers(&mut self, headers: &HeaderMap) {
        let mut saw_any = false;
        if let Some(v) = parse_header_u64(headers, "x-ratelimit-method-remaining") {
            self.method_remaining = Some(v);
            saw_any = true;
        }
        if let Some(v) = parse_header_u64(headers, "x-ratelimit-method-limit") {
            self.method_limit = Some(v);
        }
        if let Some(v) = parse_header_u64(headers, "x-ratelimit-rps-remaining") {
            self.rps_remaining = Some(v);
            saw_any = true;
        }
        if let Some(v) = parse_header_u64(headers, "x-ratelimit-rps-limit") {
            self.rps_limit = Some(v);
        }
        if let Some(v) = parse_header_u64(headers, "x-ratelimit-conn-remaining") {
            self.conn_remaining = Some(v);
            saw_any = true;
        }
        if let Some(v) = parse_header_u64(headers, "x-ratelimit-conn-limit") {
            self.conn_limit = Some(v);
        }
        if saw_any {
            self.last_update = Some(Instant::now());
        } else {
            tracing::debug!("endpoint response carried no rate-limit headers");
        }
    }

    /// Puts the endpoint into cooldown, honoring an explicit `retry-after`
    /// if the caller has one, else falling back to a 60s default (§4.3).
    pub fn record_rate_limited(&mut self, retry_after: Option<Duration>) {
        let cooldown = retry_after.unwrap_or(DEFAULT_RATE_LIMIT_COOLDOWN);
        self.cooldown_until = Some(Instant::now() + cooldown);
    }

    pub fn record_success(&mut self) {}

    /// True if currently cooling down, or any tracked budget has dropped
    /// below its threshold (method<5, rps<10, conn<3 — §4.1 defaults).
    pub fn should_backoff(&self) -> bool {
        if let Some(until) = self.cooldown_until {
            if Instant::now() < until {
                return true;
            }
        }
        below_threshold(self.method_remaining, METHOD_REMAINING_THRESHOLD)
            || below_threshold(self.rps_remaining, RPS_REMAINING_THRESHOLD)
            || below_threshold(self.conn_remaining, CONN_REMAINING_THRESHOLD)
    }

    /// True only while an explicit cooldown (e.g. a 429's Retry-After) is
    /// still in effect. Unlike `should_backoff`, a merely low budget does
    /// not count — the pool uses this to decide whether an endpoint is
    /// selectable at all (§4.3 step 1).
    pub fn in_cooldown(&self) -> bool {
        self.cooldown_until
            .is_some_and(|until| Instant::now() < until)
    }

    /// How long until the endpoint is usable again, if currently cooling down.
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        self.cooldown_until.and_then(|until| {
            let now = Instant::now();
            if until > now {
                Some(until - now)
            } else {
                None
            }
        })
    }

    /// Cooldown-remaining if currently cooling down; else a dynamic value
    /// that grows as any budget approaches exhaustion, per §4.1's formula:
    /// `base = 1s + 0.5s*(5-method_remaining) + 0.2s*(10-rps_remaining) + 1s*(3-conn_remaining)`,
    /// capped at 30s.
    pub fn backoff_duration(&self) -> Duration {
        if let Some(remaining) = self.cooldown_remaining() {
            return remaining;
        }
        let method_term = 0.5 * deficit(self.method_remaining, METHOD_REMAINING_THRESHOLD) as f64;
        let rps_term = 0.2 * deficit(self.rps_remaining, RPS_REMAINING_THRESHOLD) as f64;
        let conn_term = 1.0 * deficit(self.conn_remaining, CONN_REMAINING_THRESHOLD) as f64;
        let seconds = 1.0 + method_term + rps_term + conn_term;
        Duration::from_secs_f64(seconds).min(MAX_BACKOFF)
    }

    pub fn method_remaining(&self) -> Option<u64> {
        self.method_remaining
    }
}

fn below_threshold(value: Option<u64>, threshold: u64) -> bool {
    value.map(|v| v < threshold).unwrap_or(false)
}

/// How far `value` sits below `threshold`, or 0 if at/above it or unknown.
fn deficit(value: Option<u64>, threshold: u64) -> u64 {
    value.map(|v| threshold.saturating_sub(v)).unwrap_or(0)
}

fn parse_header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Parses a `retry-after` header, which may be either a delay in seconds
/// or an HTTP-date; only the seconds form is supported (§4.1 — the common
/// case for Solana RPC providers).
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
