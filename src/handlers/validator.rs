//! Validator/stake extractor (C9, §4.9): triggered by vote/stake/
//! stake-config program ids; tracks active vs delinquent status signals,
//! stake deltas, vote-instruction counts as a proxy for vote success, and
//! a per-validator operation histogram.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;

use crate::error::ErrorKind;
use crate::handlers::{is_skippable, ordered_instructions, BlockHandler, HandlerStats};
use crate::programs::registry::{classify_program, ProgramKind};
use crate::rpc::types::{Block, Transaction};

const DELEGATE_STAKE_DISCRIMINATOR: u8 = 2;
const DEACTIVATE_STAKE_DISCRIMINATOR: u8 = 5;
const WITHDRAW_STAKE_DISCRIMINATOR: u8 = 4;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidatorActivity {
    pub vote_instructions: u64,
    pub stake_delegations: u64,
    pub stake_deactivations: u64,
    pub stake_withdrawals: u64,
}

#[derive(Debug, Default, Serialize)]
pub struct ValidatorResults {
    pub stats: HandlerStats,
    pub vote_transaction_count: u64,
    pub stake_account_touches: HashSet<String>,
    pub operations_by_validator: HashMap<String, ValidatorActivity>,
    pub stake_delta_lamports: i128,
}

#[derive(Default)]
pub struct ValidatorExtractor {
    stats: HandlerStats,
    vote_transaction_count: u64,
    stake_account_touches: HashSet<String>,
    operations_by_validator: HashMap<String, ValidatorActivity>,
    stake_delta_lamports: i128,
}

impl ValidatorExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unlike the other extractors, this one does *not* skip vote
    /// transactions (§4.9) — vote activity is exactly what it measures.
    fn process_transaction(&mut self, tx: &Transaction) {
        if tx.is_vote() {
            self.vote_transaction_count += 1;
            if let Some(validator) = tx.account_keys.first() {
                self.operations_by_validator
                    .entry(validator.clone())
                    .or_default()
                    .vote_instructions += 1;
            }
            self.stats.record_success();
            return;
        }

        let mut touched = false;
        for instruction in ordered_instructions(tx) {
            let kind = classify_program(&instruction.program_id, &instruction.data);
            if kind != ProgramKind::Stake {
                continue;
            }
            touched = true;
            let Some(stake_account) = instruction.accounts.first() else {
                continue;
            };
            self.stake_account_touches.insert(stake_account.clone());
            let validator = instruction
                .accounts
                .get(1)
                .cloned()
                .unwrap_or_else(|| stake_account.clone());
            let entry = self.operations_by_validator.entry(validator).or_default();
            match instruction.data.first() {
                Some(&DELEGATE_STAKE_DISCRIMINATOR) => entry.stake_delegations += 1,
                Some(&DEACTIVATE_STAKE_DISCRIMINATOR) => entry.stake_deactivations += 1,
                Some(&WITHDRAW_STAKE_DISCRIMINATOR) => entry.stake_withdrawals += 1,
                _ => {}
            }
        }

        for (pre, post) in tx.pre_balances.iter().zip(tx.post_balances.iter()) {
            self.stake_delta_lamports += *post as i128 - *pre as i128;
        }

        if touched {
            self.stats.record_success();
        } else if is_skippable(tx) {
            self.stats.record_skipped();
        }
    }
}

impl BlockHandler for ValidatorExtractor {
    fn process_block(&mut self, block: &Block) -> Value {
        for tx in &block.transactions {
            self.process_transaction(tx);
        }
        serde_json::json!({ "slot": block.slot, "votes": self.vote_transaction_count })
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
        serde_json::to_value(ValidatorResults {
            stats: self.stats.clone(),
            vote_transaction_count: self.vote_transaction_count,
            stake_account_touches: self.stake_account_touches.clone(),
            operations_by_validator: self.operations_by_validator.clone(),
            stake_delta_lamports: self.stake_delta_lamports,
        })
        .unwrap_or(Value::Null)
    }

    fn reset(&mut self) {
        self.stats.reset();
        self.vote_transaction_count = 0;
        self.stake_account_touches.clear();
        self.operations_by_validator.clear();
        self.stake_delta_lamports = 0;
    }

    fn name(&self) -> &'static str {
        "validator_extractor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programs::registry::{STAKE_PROGRAM_ID, VOTE_PROGRAM_ID};
    use crate::rpc::types::Instruction;

    #[test]
    fn vote_transaction_is_counted_not_skipped() {
        let mut tx = Transaction::default();
        tx.account_keys.push("validatorA".to_string());
        tx.instructions.push(Instruction {
            program_id: VOTE_PROGRAM_ID.to_string(),
            accounts: vec![],
            data: vec![],
            parsed: None,
        });
        let block = Block {
            slot: 1,
            transactions: vec![tx],
            ..Default::default()
        };
        let mut extractor = ValidatorExtractor::new();
        extractor.process_block(&block);
        let results: ValidatorResults = serde_json::from_value(extractor.get_results()).unwrap();
        assert_eq!(results.vote_transaction_count, 1);
        assert_eq!(results.operations_by_validator["validatorA"].vote_instructions, 1);
    }

    #[test]
    fn delegate_stake_is_tallied_against_the_validator_account() {
        let mut tx = Transaction::default();
        tx.instructions.push(Instruction {
            program_id: STAKE_PROGRAM_ID.to_string(),
            accounts: vec!["stakeAccount".into(), "validatorVote".into()],
            data: vec![DELEGATE_STAKE_DISCRIMINATOR],
            parsed: None,
        });
        let block = Block {
            slot: 1,
            transactions: vec![tx],
            ..Default::default()
        };
        let mut extractor = ValidatorExtractor::new();
        extractor.process_block(&block);
        let results: ValidatorResults = serde_json::from_value(extractor.get_results()).unwrap();
        assert_eq!(results.operations_by_validator["validatorVote"].stake_delegations, 1);
        assert!(results.stake_account_touches.contains("stakeAccount"));
    }
}
