//! Program stats extractor (C9, §4.9): per-program call counts, unique
//! callers, instruction-type histogram, compute-unit totals/averages,
//! first/last-seen block times, and a program-interaction graph (program A
//! invokes program B when B appears among A's accounts).

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;

use crate::error::ErrorKind;
use crate::handlers::{is_skippable, ordered_instructions, BlockHandler, HandlerStats};
use crate::rpc::types::{Block, Transaction};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProgramStat {
    pub call_count: u64,
    pub unique_callers: HashSet<String>,
    pub instruction_type_histogram: HashMap<String, u64>,
    pub compute_units_total: u64,
    pub first_seen_block_time: Option<i64>,
    pub last_seen_block_time: Option<i64>,
}

impl ProgramStat {
    pub fn compute_units_average(&self) -> f64 {
        if self.call_count == 0 {
            0.0
        } else {
            self.compute_units_total as f64 / self.call_count as f64
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct ProgramStatsResults {
    pub stats: HandlerStats,
    pub by_program: HashMap<String, ProgramStat>,
    /// `interaction_graph[a]` is every program id that appears in one of
    /// `a`'s instructions' account list, within the same transaction (§4.9).
    pub interaction_graph: HashMap<String, HashSet<String>>,
}

#[derive(Default)]
pub struct ProgramStatsExtractor {
    stats: HandlerStats,
    by_program: HashMap<String, ProgramStat>,
    interaction_graph: HashMap<String, HashSet<String>>,
}

impl ProgramStatsExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    fn process_transaction(&mut self, tx: &Transaction, block_time: Option<i64>) {
        if is_skippable(tx) {
            self.stats.record_skipped();
            return;
        }

        let caller = tx.account_keys.first().cloned().unwrap_or_default();
        let programs_in_tx: HashSet<String> = ordered_instructions(tx)
            .iter()
            .map(|ix| ix.program_id.clone())
            .collect();

        for instruction in ordered_instructions(tx) {
            if instruction.program_id.is_empty() {
                continue;
            }
            let entry = self.by_program.entry(instruction.program_id.clone()).or_default();
            entry.call_count += 1;
            if !caller.is_empty() {
                entry.unique_callers.insert(caller.clone());
            }
            if let Some(parsed) = &instruction.parsed {
                *entry
                    .instruction_type_histogram
                    .entry(parsed.instruction_type.clone())
                    .or_insert(0) += 1;
            }
            if let Some(cu) = tx.compute_units_consumed {
                entry.compute_units_total += cu;
            }
            entry.first_seen_block_time = entry.first_seen_block_time.or(block_time);
            if block_time.is_some() {
                entry.last_seen_block_time = block_time;
            }

            let invoked: HashSet<String> = instruction
                .accounts
                .iter()
                .filter(|account| {
                    *account != &instruction.program_id && programs_in_tx.contains(*account)
                })
                .cloned()
                .collect();
            if !invoked.is_empty() {
                self.interaction_graph
                    .entry(instruction.program_id.clone())
                    .or_default()
                    .extend(invoked);
            }
        }

        self.stats.record_success();
    }
}

impl BlockHandler for ProgramStatsExtractor {
    fn process_block(&mut self, block: &Block) -> Value {
        for tx in &block.transactions {
            self.process_transaction(tx, block.block_time);
        }
        serde_json::json!({ "slot": block.slot, "programs_tracked": self.by_program.len() })
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
        serde_json::to_value(ProgramStatsResults {
            stats: self.stats.clone(),
            by_program: self.by_program.clone(),
            interaction_graph: self.interaction_graph.clone(),
        })
        .unwrap_or(Value::Null)
    }

    fn reset(&mut self) {
        self.stats.reset();
        self.by_program.clear();
        self.interaction_graph.clear();
    }

    fn name(&self) -> &'static str {
        "program_stats_extractor"
    }
}
