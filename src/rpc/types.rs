use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON-RPC 2.0 request envelope, as issued to an endpoint.
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: String,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: uuid::Uuid::new_v4().to_string(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC error object, as reported by the upstream node.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// The raw JSON-RPC response envelope. Some methods (e.g. `getSlot`) may
/// also come back as a bare value rather than `{result: ...}`; callers
/// unify both shapes at ingress via [`RpcEnvelope::into_result`].
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// A response body that may be a bare scalar/object or a `{result, error}`
/// envelope. The decoder normalizes both into one shape at ingress so the
/// rest of the system reads a single form (spec §9 "Dynamic shapes").
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RpcEnvelope {
    Enveloped(JsonRpcResponse),
    Bare(Value),
}

impl RpcEnvelope {
    /// Collapse into a plain `Result`, unifying the bare-value and
    /// enveloped-error response shapes the upstream node may return.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self {
            RpcEnvelope::Enveloped(JsonRpcResponse {
                result: Some(v), ..
            }) => Ok(v),
            RpcEnvelope::Enveloped(JsonRpcResponse {
                error: Some(e), ..
            }) => Err(e),
            RpcEnvelope::Enveloped(JsonRpcResponse { .. }) => Ok(Value::Null),
            RpcEnvelope::Bare(v) => Ok(v),
        }
    }
}

/// Commitment level, ordered `Processed < Confirmed < Finalized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        }
    }
}

/// One instruction in a transaction's message, normalized from any of the
/// three encountered wire shapes (§3, §4.7):
///   1. `programIdIndex` + index-based `accounts` into `account_keys`
///   2. inline `programId` + string `accounts`
///   3. a "parsed" object carrying `program`/`program_id`
#[derive(Debug, Clone)]
pub struct Instruction {
    pub program_id: String,
    pub accounts: Vec<String>,
    pub data: Vec<u8>,
    pub parsed: Option<ParsedInstruction>,
}

#[derive(Debug, Clone)]
pub struct ParsedInstruction {
    pub instruction_type: String,
    pub info: Value,
}

/// A transaction, normalized from either "raw" or "jsonParsed" encodings.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    pub signatures: Vec<String>,
    pub account_keys: Vec<String>,
    pub instructions: Vec<Instruction>,
    pub err: Option<Value>,
    pub log_messages: Vec<String>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub pre_token_balances: Vec<TokenBalance>,
    pub post_token_balances: Vec<TokenBalance>,
    /// Cross-program invocations, grouped by the index of the top-level
    /// instruction that triggered them, in the order the RPC reported them.
    pub inner_instructions: Vec<InnerInstructionGroup>,
    pub compute_units_consumed: Option<u64>,
}

impl Transaction {
    /// A vote transaction is identified by its first top-level instruction
    /// targeting the vote program; extractors skip these by default (§3).
    pub fn is_vote(&self) -> bool {
        self.instructions
            .first()
            .map(|ix| ix.program_id == crate::programs::registry::VOTE_PROGRAM_ID)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct InnerInstructionGroup {
    pub index: usize,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone)]
pub struct TokenBalance {
    pub account_index: usize,
    pub mint: String,
    pub owner: Option<String>,
    pub amount: String,
    pub decimals: u8,
}

/// A block, normalized from either "raw" or "jsonParsed" sources (§3).
/// `transactions` is empty (not absent) when the RPC omits the field but
/// reports a `blockTime` — an empty block is not a failure (§4.5, §8).
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub slot: u64,
    pub block_time: Option<i64>,
    pub parent_slot: Option<u64>,
    pub block_height: Option<u64>,
    pub transactions: Vec<Transaction>,
}
