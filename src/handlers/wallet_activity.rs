//! Wallet activity extractor (C9, §4.9): per-address operation histograms
//! across all program categories, built from the same normalized
//! instruction stream every other extractor consumes.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::ErrorKind;
use crate::handlers::mint::is_admissible_address;
use crate::handlers::{is_skippable, ordered_instructions, BlockHandler, HandlerStats};
use crate::programs::registry::classify_program;
use crate::rpc::types::{Block, Transaction};

#[derive(Debug, Clone, Default, Serialize)]
pub struct WalletActivity {
    pub category_counts: HashMap<String, u64>,
    pub total_operations: u64,
}

#[derive(Debug, Default, Serialize)]
pub struct WalletActivityResults {
    pub stats: HandlerStats,
    pub activity_by_wallet: HashMap<String, WalletActivity>,
}

#[derive(Default)]
pub struct WalletActivityExtractor {
    stats: HandlerStats,
    activity_by_wallet: HashMap<String, WalletActivity>,
}

impl WalletActivityExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    fn process_transaction(&mut self, tx: &Transaction) {
        if is_skippable(tx) {
            self.stats.record_skipped();
            return;
        }

        // The fee payer — the transaction's first account key — is the
        // wallet every instruction in it is attributed to (§4.9); this
        // extractor tracks activity per originating wallet, not per
        // program-account participant.
        let Some(wallet) = tx.account_keys.first() else {
            self.stats.record_skipped();
            return;
        };
        if !is_admissible_address(wallet) {
            self.stats.record_skipped();
            return;
        }

        let mut touched = false;
        for instruction in ordered_instructions(tx) {
            let kind = classify_program(&instruction.program_id, &instruction.data);
            touched = true;
            let entry = self.activity_by_wallet.entry(wallet.clone()).or_default();
            *entry.category_counts.entry(kind.as_str().to_string()).or_insert(0) += 1;
            entry.total_operations += 1;
        }

        if touched {
            self.stats.record_success();
        } else {
            self.stats.record_skipped();
        }
    }
}

impl BlockHandler for WalletActivityExtractor {
    fn process_block(&mut self, block: &Block) -> Value {
        for tx in &block.transactions {
            self.process_transaction(tx);
        }
        serde_json::json!({ "slot": block.slot, "wallets_seen": self.activity_by_wallet.len() })
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
        serde_json::to_value(WalletActivityResults {
            stats: self.stats.clone(),
            activity_by_wallet: self.activity_by_wallet.clone(),
        })
        .unwrap_or(Value::Null)
    }

    fn reset(&mut self) {
        self.stats.reset();
        self.activity_by_wallet.clear();
    }

    fn name(&self) -> &'static str {
        "wallet_activity_extractor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programs::registry::TOKEN_PROGRAM_ID;
    use crate::rpc::types::Instruction;

    #[test]
    fn operations_are_attributed_to_the_fee_payer() {
        let wallet = bs58::encode([15u8; 32]).into_string();
        let mut tx = Transaction::default();
        tx.account_keys.push(wallet.clone());
        tx.instructions.push(Instruction {
            program_id: TOKEN_PROGRAM_ID.to_string(),
            accounts: vec![],
            data: vec![],
            parsed: None,
        });
        let block = Block {
            slot: 1,
            transactions: vec![tx],
            ..Default::default()
        };
        let mut extractor = WalletActivityExtractor::new();
        extractor.process_block(&block);
        let results: WalletActivityResults = serde_json::from_value(extractor.get_results()).unwrap();
        assert_eq!(results.activity_by_wallet[&wallet].total_operations, 1);
        assert_eq!(results.activity_by_wallet[&wallet].category_counts["token"], 1);
    }

    #[test]
    fn vote_transactions_are_skipped() {
        let mut tx = Transaction::default();
        tx.instructions.push(Instruction {
            program_id: crate::programs::registry::VOTE_PROGRAM_ID.to_string(),
            accounts: vec![],
            data: vec![],
            parsed: None,
        });
        let block = Block {
            slot: 1,
            transactions: vec![tx],
            ..Default::default()
        };
        let mut extractor = WalletActivityExtractor::new();
        extractor.process_block(&block);
        let results: WalletActivityResults = serde_json::from_value(extractor.get_results()).unwrap();
        assert!(results.activity_by_wallet.is_empty());
        assert_eq!(results.stats.skipped, 1);
    }
}
