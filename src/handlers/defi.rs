//! DeFi swap extractor (C9, §4.9): triggered by known DEX/AMM program ids;
//! classifies swap/provide_liquidity/remove_liquidity/stake/unstake/
//! borrow/repay. Volume extraction is an interface only (§4.9) — without a
//! price oracle this returns zero rather than guessing at notional value.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;

use crate::error::ErrorKind;
use crate::handlers::{is_skippable, ordered_instructions, BlockHandler, HandlerStats};
use crate::programs::registry::{classify_program, ProgramKind};
use crate::rpc::types::{Block, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefiEventKind {
    Swap,
    ProvideLiquidity,
    RemoveLiquidity,
    Stake,
    Unstake,
    Borrow,
    Repay,
}

impl DefiEventKind {
    fn as_str(&self) -> &'static str {
        match self {
            DefiEventKind::Swap => "swap",
            DefiEventKind::ProvideLiquidity => "provide_liquidity",
            DefiEventKind::RemoveLiquidity => "remove_liquidity",
            DefiEventKind::Stake => "stake",
            DefiEventKind::Unstake => "unstake",
            DefiEventKind::Borrow => "borrow",
            DefiEventKind::Repay => "repay",
        }
    }

    /// Classifies by the parsed instruction-type string when present
    /// (§4.9); `None` when no recognizable keyword is found, in which case
    /// the instruction is counted as a DEX/lending touch but not attributed
    /// to a specific event kind.
    fn from_instruction_type(program: ProgramKind, instruction_type: Option<&str>) -> Option<Self> {
        let t = instruction_type?.to_lowercase();
        if program == ProgramKind::Lending {
            return if t.contains("repay") {
                Some(DefiEventKind::Repay)
            } else if t.contains("borrow") {
                Some(DefiEventKind::Borrow)
            } else if t.contains("deposit") || t.contains("supply") {
                Some(DefiEventKind::ProvideLiquidity)
            } else if t.contains("withdraw") {
                Some(DefiEventKind::RemoveLiquidity)
            } else {
                None
            };
        }
        if t.contains("swap") || t.contains("route") {
            Some(DefiEventKind::Swap)
        } else if t.contains("removeliquidity") || t.contains("withdraw") {
            Some(DefiEventKind::RemoveLiquidity)
        } else if t.contains("addliquidity") || t.contains("deposit") {
            Some(DefiEventKind::ProvideLiquidity)
        } else if t.contains("unstake") {
            Some(DefiEventKind::Unstake)
        } else if t.contains("stake") {
            Some(DefiEventKind::Stake)
        } else {
            None
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct DefiResults {
    pub stats: HandlerStats,
    pub event_counts: HashMap<String, u64>,
    /// Unique program ids that at least one DEX/lending interaction touched.
    pub programs_seen: HashSet<String>,
    /// Always zero absent a price oracle (§4.9 Non-goal for this extractor).
    pub volume_quote_units: u64,
}

#[derive(Default)]
pub struct DefiExtractor {
    stats: HandlerStats,
    event_counts: HashMap<String, u64>,
    programs_seen: HashSet<String>,
}

impl DefiExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    fn process_transaction(&mut self, tx: &Transaction) {
        if is_skippable(tx) {
            self.stats.record_skipped();
            return;
        }

        let mut touched = false;
        for instruction in ordered_instructions(tx) {
            let kind = classify_program(&instruction.program_id, &instruction.data);
            if !matches!(kind, ProgramKind::Dex | ProgramKind::Lending) {
                continue;
            }
            touched = true;
            self.programs_seen.insert(instruction.program_id.clone());
            let instruction_type = instruction.parsed.as_ref().map(|p| p.instruction_type.as_str());
            if let Some(event) = DefiEventKind::from_instruction_type(kind, instruction_type) {
                *self.event_counts.entry(event.as_str().to_string()).or_insert(0) += 1;
            } else if kind == ProgramKind::Dex {
                // Unrecognized instruction type on a known DEX program is
                // still evidence of a swap-shaped interaction (§4.9).
                *self.event_counts.entry(DefiEventKind::Swap.as_str().to_string()).or_insert(0) += 1;
            }
        }

        if touched {
            self.stats.record_success();
        }
    }
}

impl BlockHandler for DefiExtractor {
    fn process_block(&mut self, block: &Block) -> Value {
        for tx in &block.transactions {
            self.process_transaction(tx);
        }
        serde_json::json!({ "slot": block.slot, "programs_seen": self.programs_seen.len() })
    }

    fn process_result(&mut self, result: &Result<Value, ErrorKind>) -> Value {
        match result {
            Ok(_) => {
                self.stats.record_success();
                serde_json::json!({ "success": true })
            }
            Err(err) => {
                self.stats.record_failure(&format!("{err:?}"));
                serde_json::json!({ "success": false, "error": err.to_string() })
            }
        }
    }

    fn get_results(&self) -> Value {
        serde_json::to_value(DefiResults {
            stats: self.stats.clone(),
            event_counts: self.event_counts.clone(),
            programs_seen: self.programs_seen.clone(),
            volume_quote_units: 0,
        })
        .unwrap_or(Value::Null)
    }

    fn reset(&mut self) {
        self.stats.reset();
        self.event_counts.clear();
        self.programs_seen.clear();
    }

    fn name(&self) -> &'static str {
        "defi_extractor"
    }
}
