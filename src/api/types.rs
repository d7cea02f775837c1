//! HTTP request/response shapes for the four endpoints of §6. Handlers
//! deserialize query params through these and serialize the documented
//! `{success, ...}` / `{success:false, error, errors}` envelopes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct RecentMintsParams {
    pub blocks: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct MintStatsParams {
    pub timeframe: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NetworkStatusParams {
    pub summary_only: Option<bool>,
}

/// The documented boundary error shape (§6): `{success:false, error, errors}`.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
    pub errors: Vec<String>,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
            errors: Vec::new(),
        }
    }
}
