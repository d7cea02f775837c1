//! Handler Framework (§4.6): the abstract contract every extractor (mint,
//! token balances, NFT, DeFi, governance, validator, wallet activity,
//! program stats) implements, plus the composing wrapper that adds
//! statistics and per-handler error trapping without handlers inheriting
//! from one another (§9 "Inheritance of handlers → interface + composition").

pub mod decoder;
pub mod defi;
pub mod governance;
pub mod mint;
pub mod nft;
pub mod program_stats;
pub mod token_balances;
pub mod validator;
pub mod wallet_activity;

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::error::ErrorKind;
use crate::rpc::types::{Block, Instruction, Transaction};

/// Abstract interface every extractor implements (§4.6). Associated
/// outputs are plain `serde_json::Value` rather than handler-specific
/// types: every handler ultimately feeds a JSON HTTP response, and a
/// uniform shape lets the orchestrator run a heterogeneous set of
/// handlers over the same block batch without a trait object per kind.
pub trait BlockHandler: Send {
    /// Processes one block and returns a summary of what this handler did
    /// with it. Must not propagate instruction/transaction-level errors —
    /// those are counted into this handler's own statistics instead (§7).
    fn process_block(&mut self, block: &Block) -> Value;

    /// Adapts a raw RPC outcome (success value or classified error) into
    /// this handler's own success/failure bookkeeping.
    fn process_result(&mut self, result: &Result<Value, ErrorKind>) -> Value;

    /// Statistics and accumulated results since the last `reset()`.
    fn get_results(&self) -> Value;

    /// Clears all accumulated state. Does not affect in-flight processing.
    fn reset(&mut self);

    fn name(&self) -> &'static str;
}

/// Monotonically accumulating per-handler counters (§3 "Handler statistics"),
/// reused by every concrete extractor in `handlers::*`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HandlerStats {
    pub total_processed: u64,
    pub success: u64,
    pub failure: u64,
    pub skipped: u64,
    pub error_histogram: HashMap<String, u64>,
}

impl HandlerStats {
    pub fn record_success(&mut self) {
        self.total_processed += 1;
        self.success += 1;
    }

    pub fn record_failure(&mut self, error_kind: &str) {
        self.total_processed += 1;
        self.failure += 1;
        *self.error_histogram.entry(error_kind.to_string()).or_insert(0) += 1;
    }

    pub fn record_skipped(&mut self) {
        self.total_processed += 1;
        self.skipped += 1;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Composes statistics aggregation and panic/error trapping around any
/// `BlockHandler` (§4.6, §7, §9) — the "interface + composition" answer to
/// the source's handler class hierarchy.
pub struct StatsWrapper<H: BlockHandler> {
    inner: H,
    blocks_failed: u64,
}

impl<H: BlockHandler> StatsWrapper<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            blocks_failed: 0,
        }
    }

    pub fn blocks_failed(&self) -> u64 {
        self.blocks_failed
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

impl<H: BlockHandler> BlockHandler for StatsWrapper<H> {
    fn process_block(&mut self, block: &Block) -> Value {
        let slot = block.slot;
        let name = self.inner.name();
        match catch_unwind(AssertUnwindSafe(|| self.inner.process_block(block))) {
            Ok(summary) => summary,
            Err(_) => {
                self.blocks_failed += 1;
                error!(handler = name, slot, "handler panicked processing block");
                serde_json::json!({ "error": "handler panicked", "slot": slot })
            }
        }
    }

    fn process_result(&mut self, result: &Result<Value, ErrorKind>) -> Value {
        self.inner.process_result(result)
    }

    fn get_results(&self) -> Value {
        self.inner.get_results()
    }

    fn reset(&mut self) {
        self.blocks_failed = 0;
        self.inner.reset();
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

/// Orders a transaction's instructions the way §5 requires: top-level
/// instructions first (in source order), then each `inner_instructions`
/// group's instructions, in the order the RPC reported the groups.
pub fn ordered_instructions(tx: &Transaction) -> Vec<&Instruction> {
    let mut all: Vec<&Instruction> = tx.instructions.iter().collect();
    for group in &tx.inner_instructions {
        all.extend(group.instructions.iter());
    }
    all
}

/// Vote transactions are skipped by every extractor by default (§3, §8
/// scenario 4); callers should increment their own `skipped` counter when
/// this returns true.
pub fn is_skippable(tx: &Transaction) -> bool {
    tx.is_vote()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::types::Transaction;

    struct PanicHandler;
    impl BlockHandler for PanicHandler {
        fn process_block(&mut self, _block: &Block) -> Value {
            panic!("boom")
        }
        fn process_result(&mut self, _result: &Result<Value, ErrorKind>) -> Value {
            Value::Null
        }
        fn get_results(&self) -> Value {
            Value::Null
        }
        fn reset(&mut self) {}
        fn name(&self) -> &'static str {
            "panic_handler"
        }
    }

    #[test]
    fn stats_wrapper_traps_panics_and_records_failure() {
        let mut wrapper = StatsWrapper::new(PanicHandler);
        let block = Block {
            slot: 7,
            ..Default::default()
        };
        let summary = wrapper.process_block(&block);
        assert_eq!(wrapper.blocks_failed(), 1);
        assert_eq!(summary["slot"], 7);
    }

    #[test]
    fn ordered_instructions_puts_top_level_before_inner() {
        let mut tx = Transaction::default();
        tx.instructions.push(Instruction {
            program_id: "top".into(),
            accounts: vec![],
            data: vec![],
            parsed: None,
        });
        tx.inner_instructions.push(crate::rpc::types::InnerInstructionGroup {
            index: 0,
            instructions: vec![Instruction {
                program_id: "inner".into(),
                accounts: vec![],
                data: vec![],
                parsed: None,
            }],
        });
        let ordered = ordered_instructions(&tx);
        assert_eq!(ordered[0].program_id, "top");
        assert_eq!(ordered[1].program_id, "inner");
    }
}
