//! Query Layer (§4.5): the only part of the system that knows how to turn
//! raw `getBlock`/`getSlot`/`getSignaturesForAddress` JSON into the
//! normalized [`Block`]/[`Transaction`] shapes, and the only part that
//! retries. Everything above this layer deals in `Result<T, ErrorKind>`,
//! never in JSON-RPC wire shapes.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ErrorKind;
use crate::rpc::pool::ConnectionPool;
use crate::rpc::types::{
    Block, Commitment, InnerInstructionGroup, Instruction, ParsedInstruction, TokenBalance,
    Transaction,
};

/// Exponential backoff parameters: `delay_n = min(max_delay, initial * factor^n)` (§4.5).
const INITIAL_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(8);
const BACKOFF_FACTOR: u32 = 2;

/// Fallback retry budget when nothing more specific is configured (§4.5).
pub const DEFAULT_RETRIES: u32 = 3;

/// Sufficient-confirmations threshold for [`QueryLayer::wait_for_block_availability`] (§4.5).
const CONFIRMATION_SLOT_DISTANCE: u64 = 150;
const DEFAULT_WAIT_FOR_AVAILABILITY: Duration = Duration::from_secs(10);

/// Constructor parameters for [`QueryLayer::get_latest_available_block`],
/// resolved as fixed values rather than implied semantics (§9 Open Questions).
const LATEST_BLOCK_START_OFFSET: u64 = 20;
const LATEST_BLOCK_PROBE_COUNT: u64 = 20;
const LATEST_BLOCK_PROBE_DELAY: Duration = Duration::from_millis(500);

/// Default inter-batch delay for [`QueryLayer::get_program_transactions`] (§4.5, §5).
const PROGRAM_TX_BATCH_DELAY: Duration = Duration::from_secs(5);
const PROGRAM_TX_BATCH_SIZE: usize = 20;

/// Optional filters for [`QueryLayer::get_signatures_for_address`] (§4.5).
#[derive(Debug, Clone, Default)]
pub struct SignatureQueryOptions {
    pub before: Option<String>,
    pub until: Option<String>,
    pub min_slot: Option<u64>,
    pub max_slot: Option<u64>,
    pub limit: Option<usize>,
}

pub struct QueryLayer {
    pool: Arc<ConnectionPool>,
    commitment: Commitment,
    tip_probe_commitment: Commitment,
    max_retries: u32,
}

impl QueryLayer {
    pub fn new(pool: Arc<ConnectionPool>, commitment: Commitment) -> Self {
        Self::with_config(pool, commitment, commitment, DEFAULT_RETRIES)
    }

    /// `commitment` governs block/transaction/account queries; `tip_probe_commitment`
    /// governs `getSlot` calls that just want the cluster tip (§4.5, §6's
    /// finalized-for-ingestion / confirmed-for-tip-probing split).
    pub fn with_config(
        pool: Arc<ConnectionPool>,
        commitment: Commitment,
        tip_probe_commitment: Commitment,
        max_retries: u32,
    ) -> Self {
        Self {
            pool,
            commitment,
            tip_probe_commitment,
            max_retries,
        }
    }

    pub async fn get_slot(&self) -> Result<u64, ErrorKind> {
        let params = serde_json::json!([{ "commitment": self.tip_probe_commitment.as_str() }]);
        let value = self
            .call_with_retry("getSlot", params, self.max_retries)
            .await?;
        value
            .as_u64()
            .ok_or_else(|| ErrorKind::ParseError("getSlot did not return an integer".to_string()))
    }

    /// Issues `getBlock`. Returns `Ok(None)` when the RPC result itself is
    /// `null` — the slot simply produced no block, not a failure (§4.5,
    /// §8's "transactions=null" boundary case).
    pub async fn get_block(&self, slot: u64) -> Result<Option<Block>, ErrorKind> {
        let params = serde_json::json!([
            slot,
            {
                "commitment": self.commitment.as_str(),
                "encoding": "jsonParsed",
                "transactionDetails": "full",
                "rewards": false,
                "maxSupportedTransactionVersion": 0,
            }
        ]);
        let value = self
            .call_with_retry("getBlock", params, self.max_retries)
            .await?;
        parse_block(slot, value)
    }

    /// Wraps [`Self::get_block`]; if the result is still absent after
    /// retrying the retryable errors, reports "not available" rather than
    /// handing back an ambiguous `None` (§4.5).
    pub async fn get_block_with_retry(&self, slot: u64) -> Result<Block, ErrorKind> {
        match self.get_block(slot).await? {
            Some(block) => Ok(block),
            None => Err(ErrorKind::BlockNotAvailable),
        }
    }

    /// Polls `get_slot` until the cluster tip has advanced at least
    /// [`CONFIRMATION_SLOT_DISTANCE`] slots past `slot`, or `max_wait`
    /// elapses (§4.5).
    pub async fn wait_for_block_availability(
        &self,
        slot: u64,
        max_wait: Duration,
    ) -> Result<bool, ErrorKind> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            let tip = self.get_slot().await?;
            if tip.saturating_sub(slot) >= CONFIRMATION_SLOT_DISTANCE {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    /// Defaults to a 10s wait, matching §4.5's documented default.
    pub async fn wait_for_block_availability_default(&self, slot: u64) -> Result<bool, ErrorKind> {
        self.wait_for_block_availability(slot, DEFAULT_WAIT_FOR_AVAILABILITY)
            .await
    }

    /// Walks backward from `tip - LATEST_BLOCK_START_OFFSET`, one slot at a
    /// time, for up to `LATEST_BLOCK_PROBE_COUNT` attempts with a 0.5s
    /// inter-attempt delay, returning the first slot that actually
    /// produced a block (§4.5, §9).
    pub async fn get_latest_available_block(&self) -> Result<Block, ErrorKind> {
        let tip = self.get_slot().await?;
        let start = tip.saturating_sub(LATEST_BLOCK_START_OFFSET);
        for offset in 0..LATEST_BLOCK_PROBE_COUNT {
            let candidate = start.saturating_sub(offset);
            match self.get_block(candidate).await {
                Ok(Some(block)) => return Ok(block),
                Ok(None) => {
                    debug!(slot = candidate, "slot produced no block, probing earlier");
                }
                Err(err) if err.retryable() => {
                    debug!(slot = candidate, error = %err, "transient error probing earlier");
                }
                Err(err) => return Err(err),
            }
            tokio::time::sleep(LATEST_BLOCK_PROBE_DELAY).await;
        }
        Err(ErrorKind::MissingBlocks)
    }

    /// Fetches `[start, end]` in parallel batches of `batch_size`,
    /// capturing per-slot failures instead of aborting the whole range
    /// (§4.5).
    pub async fn get_multiple_blocks(
        &self,
        start: u64,
        end: u64,
        batch_size: usize,
    ) -> Vec<(u64, Result<Option<Block>, ErrorKind>)> {
        let slots: Vec<u64> = (start..=end).collect();
        let mut results = Vec::with_capacity(slots.len());
        for chunk in slots.chunks(batch_size.max(1)) {
            let futures = chunk.iter().map(|&slot| async move { (slot, self.get_block(slot).await) });
            results.extend(join_all(futures).await);
        }
        results
    }

    pub async fn get_signatures_for_address(
        &self,
        address: &str,
        options: &SignatureQueryOptions,
    ) -> Result<Vec<String>, ErrorKind> {
        let mut filter = serde_json::Map::new();
        filter.insert(
            "limit".to_string(),
            serde_json::json!(options.limit.unwrap_or(1000)),
        );
        filter.insert(
            "commitment".to_string(),
            serde_json::json!(self.commitment.as_str()),
        );
        if let Some(before) = &options.before {
            filter.insert("before".to_string(), serde_json::json!(before));
        }
        if let Some(until) = &options.until {
            filter.insert("until".to_string(), serde_json::json!(until));
        }
        if let Some(min_slot) = options.min_slot {
            filter.insert("minContextSlot".to_string(), serde_json::json!(min_slot));
        }
        let params = serde_json::json!([address, Value::Object(filter)]);
        let value = self
            .call_with_retry("getSignaturesForAddress", params, self.max_retries)
            .await?;
        let entries = value.as_array().ok_or_else(|| {
            ErrorKind::ParseError("getSignaturesForAddress did not return an array".to_string())
        })?;
        Ok(entries
            .iter()
            .filter(|entry| {
                options
                    .max_slot
                    .map(|max| entry.get("slot").and_then(Value::as_u64).map_or(true, |s| s <= max))
                    .unwrap_or(true)
            })
            .filter_map(|entry| entry.get("signature")?.as_str().map(str::to_string))
            .collect())
    }

    /// Paginates over signatures for `program_id`, then resolves each in
    /// batches of [`PROGRAM_TX_BATCH_SIZE`] with a
    /// [`PROGRAM_TX_BATCH_DELAY`] pause between batches to stay under
    /// upstream rate limits (§4.5, §5 Backpressure).
    pub async fn get_program_transactions(
        &self,
        program_id: &str,
        options: &SignatureQueryOptions,
    ) -> Result<Vec<Transaction>, ErrorKind> {
        let signatures = self.get_signatures_for_address(program_id, options).await?;
        let mut transactions = Vec::with_capacity(signatures.len());
        for (batch_index, chunk) in signatures.chunks(PROGRAM_TX_BATCH_SIZE).enumerate() {
            if batch_index > 0 {
                tokio::time::sleep(PROGRAM_TX_BATCH_DELAY).await;
            }
            let futures = chunk.iter().map(|sig| self.get_transaction(sig));
            let results = join_all(futures).await;
            transactions.extend(results.into_iter().filter_map(Result::ok));
        }
        Ok(transactions)
    }

    /// Issues `getTokenSupply` for a mint address, used by the single-mint
    /// analysis endpoint (§6) alongside [`Self::get_account_info`].
    pub async fn get_token_supply(&self, mint: &str) -> Result<Value, ErrorKind> {
        let params = serde_json::json!([mint, { "commitment": self.commitment.as_str() }]);
        self.call_with_retry("getTokenSupply", params, self.max_retries).await
    }

    /// Issues `getAccountInfo` with `jsonParsed` encoding, used to read a
    /// mint's metadata/authority fields for single-mint analysis (§6).
    pub async fn get_account_info(&self, address: &str) -> Result<Value, ErrorKind> {
        let params = serde_json::json!([
            address,
            { "commitment": self.commitment.as_str(), "encoding": "jsonParsed" }
        ]);
        self.call_with_retry("getAccountInfo", params, self.max_retries).await
    }

    async fn get_transaction(&self, signature: &str) -> Result<Transaction, ErrorKind> {
        let params = serde_json::json!([
            signature,
            { "commitment": self.commitment.as_str(), "encoding": "jsonParsed", "maxSupportedTransactionVersion": 0 }
        ]);
        let value = self
            .call_with_retry("getTransaction", params, self.max_retries)
            .await?;
        if value.is_null() {
            return Err(ErrorKind::BlockNotAvailable);
        }
        parse_transaction(&value)
    }

    /// Generalizes the source system's exponential-backoff retry loop:
    /// `delay_n = min(max_delay, initial * factor^n)`, only retrying
    /// `ErrorKind::retryable` outcomes (§4.5).
    async fn call_with_retry(
        &self,
        method: &str,
        params: Value,
        max_attempts: u32,
    ) -> Result<Value, ErrorKind> {
        let mut attempt = 0;
        let mut delay = INITIAL_DELAY;
        loop {
            attempt += 1;
            let client = self.pool.get_client().await?;
            match client.call(method, params.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) if err.retryable() && attempt <= max_attempts => {
                    let wait = err.retry_after_hint().map(Duration::from_secs).unwrap_or(delay);
                    warn!(method, attempt, error = %err, "retrying rpc call");
                    tokio::time::sleep(wait).await;
                    delay = (delay * BACKOFF_FACTOR).min(MAX_DELAY);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Normalizes a `getBlock` result. `Ok(None)` means the RPC returned
/// `null` — the slot produced no block — which is a valid outcome, not an
/// error (§4.5, §8).
fn parse_block(slot: u64, value: Value) -> Result<Option<Block>, ErrorKind> {
    if value.is_null() {
        return Ok(None);
    }
    let block_time = value.get("blockTime").and_then(Value::as_i64);
    let parent_slot = value.get("parentSlot").and_then(Value::as_u64);
    let block_height = value.get("blockHeight").and_then(Value::as_u64);
    let transactions = value
        .get("transactions")
        .and_then(Value::as_array)
        .map(|txs| {
            txs.iter()
                .filter_map(|tx| parse_transaction(tx).ok())
                .collect()
        })
        .unwrap_or_default();

    Ok(Some(Block {
        slot,
        block_time,
        parent_slot,
        block_height,
        transactions,
    }))
}

/// Normalizes one entry of `transactions` in a `getBlock` response, or the
/// body of a `getTransaction` response — both share the
/// `{transaction, meta}` shape under "jsonParsed" encoding (§3, §4.7).
fn parse_transaction(value: &Value) -> Result<Transaction, ErrorKind> {
    let tx = value.get("transaction").unwrap_or(value);
    let meta = value.get("meta");

    let signatures = tx
        .get("signatures")
        .and_then(Value::as_array)
        .map(|v| v.iter().filter_map(|s| s.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let message = tx.get("message");
    let account_keys = message
        .and_then(|m| m.get("accountKeys"))
        .and_then(Value::as_array)
        .map(|v| v.iter().filter_map(extract_account_key).collect::<Vec<_>>())
        .unwrap_or_default();

    let instructions = message
        .and_then(|m| m.get("instructions"))
        .and_then(Value::as_array)
        .map(|v| {
            v.iter()
                .map(|ix| parse_instruction(ix, &account_keys))
                .collect()
        })
        .unwrap_or_default();

    let inner_instructions = meta
        .and_then(|m| m.get("innerInstructions"))
        .and_then(Value::as_array)
        .map(|groups| {
            groups
                .iter()
                .filter_map(|group| {
                    let index = group.get("index")?.as_u64()? as usize;
                    let instructions = group
                        .get("instructions")
                        .and_then(Value::as_array)
                        .map(|v| v.iter().map(|ix| parse_instruction(ix, &account_keys)).collect())
                        .unwrap_or_default();
                    Some(InnerInstructionGroup { index, instructions })
                })
                .collect()
        })
        .unwrap_or_default();

    let pre_token_balances = parse_token_balances(meta, "preTokenBalances");
    let post_token_balances = parse_token_balances(meta, "postTokenBalances");

    Ok(Transaction {
        signatures,
        account_keys,
        instructions,
        err: meta.and_then(|m| m.get("err")).cloned(),
        log_messages: meta
            .and_then(|m| m.get("logMessages"))
            .and_then(Value::as_array)
            .map(|v| v.iter().filter_map(|s| s.as_str().map(str::to_string)).collect())
            .unwrap_or_default(),
        pre_balances: parse_u64_array(meta, "preBalances"),
        post_balances: parse_u64_array(meta, "postBalances"),
        pre_token_balances,
        post_token_balances,
        inner_instructions,
        compute_units_consumed: meta.and_then(|m| m.get("computeUnitsConsumed")).and_then(Value::as_u64),
    })
}

fn extract_account_key(entry: &Value) -> Option<String> {
    entry
        .as_str()
        .map(str::to_string)
        .or_else(|| entry.get("pubkey").and_then(Value::as_str).map(str::to_string))
}

/// Normalizes one instruction out of any of the three wire shapes named in
/// §3/§4.7, applying the decoder's precedence rules in order:
///   1. `programIdIndex`, if in range of `account_keys`.
///   2. Inline `programId` string.
///   3. The last entry of `accounts`, if it indexes into `account_keys`
///      (compatibility with a legacy shape).
///   4. Otherwise the instruction is rejected: `program_id` is left empty
///      and `handlers::decoder::InstructionDecoder` counts it, rather than
///      this layer raising an exception (§4.7).
/// Out-of-range account indices are dropped with a debug log, never a panic.
fn parse_instruction(value: &Value, account_keys: &[String]) -> Instruction {
    let program_id = value
        .get("programIdIndex")
        .and_then(Value::as_u64)
        .and_then(|idx| account_keys.get(idx as usize).cloned())
        .or_else(|| value.get("programId").and_then(Value::as_str).map(str::to_string))
        .or_else(|| {
            value.get("accounts").and_then(Value::as_array).and_then(|accounts| {
                accounts.last().and_then(|last| {
                    last.as_u64()
                        .and_then(|idx| account_keys.get(idx as usize).cloned())
                        .or_else(|| last.as_str().map(str::to_string))
                })
            })
        })
        .unwrap_or_default();

    if program_id.is_empty() {
        debug!("instruction has no resolvable program id, will be rejected by the decoder");
    }

    let accounts = value
        .get("accounts")
        .and_then(Value::as_array)
        .map(|v| {
            v.iter()
                .filter_map(|entry| {
                    entry
                        .as_u64()
                        .and_then(|idx| account_keys.get(idx as usize).cloned())
                        .or_else(|| entry.as_str().map(str::to_string))
                })
                .collect()
        })
        .unwrap_or_default();

    let data = value
        .get("data")
        .and_then(Value::as_str)
        .map(|s| bs58::decode(s).into_vec().unwrap_or_default())
        .unwrap_or_default();

    let parsed = value.get("parsed").map(|parsed| {
        let instruction_type = parsed
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let info = parsed.get("info").cloned().unwrap_or(Value::Null);
        ParsedInstruction { instruction_type, info }
    });

    Instruction {
        program_id,
        accounts,
        data,
        parsed,
    }
}

fn parse_u64_array(meta: Option<&Value>, field: &str) -> Vec<u64> {
    meta.and_then(|m| m.get(field))
        .and_then(Value::as_array)
        .map(|v| v.iter().filter_map(Value::as_u64).collect())
        .unwrap_or_default()
}

fn parse_token_balances(meta: Option<&Value>, field: &str) -> Vec<TokenBalance> {
    meta.and_then(|m| m.get(field))
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    Some(TokenBalance {
                        account_index: entry.get("accountIndex")?.as_u64()? as usize,
                        mint: entry.get("mint")?.as_str()?.to_string(),
                        owner: entry.get("owner").and_then(Value::as_str).map(str::to_string),
                        amount: entry
                            .get("uiTokenAmount")
                            .and_then(|a| a.get("amount"))
                            .and_then(Value::as_str)
                            .unwrap_or("0")
                            .to_string(),
                        decimals: entry
                            .get("uiTokenAmount")
                            .and_then(|a| a.get("decimals"))
                            .and_then(Value::as_u64)
                            .unwrap_or(0) as u8,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_block_result_is_ok_none_not_error() {
        let result = parse_block(100, Value::Null).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn block_with_no_transactions_field_is_empty_not_error() {
        let value = serde_json::json!({ "blockTime": 1000, "parentSlot": 99 });
        let block = parse_block(100, value).unwrap().unwrap();
        assert_eq!(block.slot, 100);
        assert!(block.transactions.is_empty());
    }

    #[test]
    fn instruction_resolves_program_id_from_index() {
        let keys = vec!["ProgA".to_string(), "ProgB".to_string()];
        let ix = serde_json::json!({ "programIdIndex": 1, "accounts": [0] });
        let parsed = parse_instruction(&ix, &keys);
        assert_eq!(parsed.program_id, "ProgB");
        assert_eq!(parsed.accounts, vec!["ProgA".to_string()]);
    }

    #[test]
    fn instruction_prefers_inline_program_id() {
        let ix = serde_json::json!({ "programId": "InlineProg", "accounts": ["X"] });
        let parsed = parse_instruction(&ix, &[]);
        assert_eq!(parsed.program_id, "InlineProg");
        assert_eq!(parsed.accounts, vec!["X".to_string()]);
    }

    #[test]
    fn parsed_instruction_info_is_preserved() {
        let ix = serde_json::json!({
            "programId": "TokenProg",
            "parsed": { "type": "transfer", "info": { "amount": "42" } }
        });
        let parsed = parse_instruction(&ix, &[]);
        let info = parsed.parsed.unwrap();
        assert_eq!(info.instruction_type, "transfer");
        assert_eq!(info.info["amount"], "42");
    }

    #[test]
    fn transaction_err_field_is_preserved_verbatim() {
        let value = serde_json::json!({
            "transaction": { "signatures": ["sig1"], "message": { "accountKeys": [], "instructions": [] } },
            "meta": { "err": { "InstructionError": [0, "Custom"] } }
        });
        let tx = parse_transaction(&value).unwrap();
        assert!(tx.err.is_some());
    }
}
