//! Token transfer/mint/burn extractor (C9, §4.9): tracks per-mint volume,
//! unique senders/receivers, supply changes, and authority sets from
//! instruction discriminators and `pre_token_balances`/`post_token_balances`
//! deltas.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;

use crate::error::ErrorKind;
use crate::handlers::mint::is_admissible_address;
use crate::handlers::{is_skippable, ordered_instructions, BlockHandler, HandlerStats};
use crate::programs::registry::{classify_program, ProgramKind};
use crate::rpc::types::{Block, Transaction};

const TRANSFER_DISCRIMINATORS: &[u8] = &[3, 12]; // Transfer, TransferChecked
const MINT_TO_DISCRIMINATORS: &[u8] = &[7, 14]; // MintTo, MintToChecked
const BURN_DISCRIMINATORS: &[u8] = &[8, 15]; // Burn, BurnChecked

#[derive(Debug, Clone, Default, Serialize)]
pub struct MintActivity {
    pub volume: u128,
    pub unique_senders: HashSet<String>,
    pub unique_receivers: HashSet<String>,
    pub supply_delta: i128,
    pub authorities: HashSet<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct TokenBalanceResults {
    pub stats: HandlerStats,
    pub activity_by_mint: HashMap<String, MintActivity>,
    pub transfers: u64,
    pub mints: u64,
    pub burns: u64,
}

#[derive(Default)]
pub struct TokenBalanceExtractor {
    activity_by_mint: HashMap<String, MintActivity>,
    stats: HandlerStats,
    transfers: u64,
    mints: u64,
    burns: u64,
}

impl TokenBalanceExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    fn process_transaction(&mut self, tx: &Transaction) {
        if is_skippable(tx) {
            self.stats.record_skipped();
            return;
        }

        for instruction in ordered_instructions(tx) {
            let kind = classify_program(&instruction.program_id, &instruction.data);
            if !matches!(kind, ProgramKind::Token | ProgramKind::Token2022) {
                continue;
            }
            let Some(&discriminator) = instruction.data.first() else {
                continue;
            };
            if TRANSFER_DISCRIMINATORS.contains(&discriminator) {
                self.transfers += 1;
                // Plain `Transfer` carries [source, destination, authority];
                // `TransferChecked` additionally carries the mint at index 1
                // (§4.9) — only the checked form can be attributed to a mint
                // without cross-referencing token-balance entries.
                if discriminator == 12 {
                    if let (Some(source), Some(mint), Some(dest)) = (
                        instruction.accounts.first(),
                        instruction.accounts.get(1),
                        instruction.accounts.get(2),
                    ) {
                        if is_admissible_address(mint) {
                            let entry = self.activity_by_mint.entry(mint.clone()).or_default();
                            entry.unique_senders.insert(source.clone());
                            entry.unique_receivers.insert(dest.clone());
                        }
                    }
                }
            } else if MINT_TO_DISCRIMINATORS.contains(&discriminator) {
                self.mints += 1;
                if let Some(mint) = instruction.accounts.first() {
                    let entry = self.activity_by_mint.entry(mint.clone()).or_default();
                    entry.supply_delta += 1;
                    if let Some(authority) = instruction.accounts.last() {
                        entry.authorities.insert(authority.clone());
                    }
                }
            } else if BURN_DISCRIMINATORS.contains(&discriminator) {
                self.burns += 1;
                if let Some(mint) = instruction.accounts.get(1) {
                    let entry = self.activity_by_mint.entry(mint.clone()).or_default();
                    entry.supply_delta -= 1;
                }
            }
        }

        for post in &tx.post_token_balances {
            let pre_amount = tx
                .pre_token_balances
                .iter()
                .find(|pre| pre.account_index == post.account_index && pre.mint == post.mint)
                .and_then(|pre| pre.amount.parse::<i128>().ok())
                .unwrap_or(0);
            let post_amount = post.amount.parse::<i128>().unwrap_or(0);
            let delta = post_amount - pre_amount;
            if delta != 0 {
                let entry = self.activity_by_mint.entry(post.mint.clone()).or_default();
                entry.volume = entry.volume.saturating_add(delta.unsigned_abs());
            }
        }
    }
}

impl BlockHandler for TokenBalanceExtractor {
    fn process_block(&mut self, block: &Block) -> Value {
        for tx in &block.transactions {
            self.process_transaction(tx);
        }
        self.stats.record_success();
        serde_json::json!({ "slot": block.slot, "mints_tracked": self.activity_by_mint.len() })
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
        serde_json::to_value(TokenBalanceResults {
            stats: self.stats.clone(),
            activity_by_mint: self.activity_by_mint.clone(),
            transfers: self.transfers,
            mints: self.mints,
            burns: self.burns,
        })
        .unwrap_or(Value::Null)
    }

    fn reset(&mut self) {
        self.activity_by_mint.clear();
        self.stats.reset();
        self.transfers = 0;
        self.mints = 0;
        self.burns = 0;
    }

    fn name(&self) -> &'static str {
        "token_balance_extractor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programs::registry::TOKEN_PROGRAM_ID;
    use crate::rpc::types::{Instruction, TokenBalance};

    #[test]
    fn transfer_instruction_is_counted() {
        let mut tx = Transaction::default();
        tx.instructions.push(Instruction {
            program_id: TOKEN_PROGRAM_ID.to_string(),
            accounts: vec!["from".into(), "to".into()],
            data: vec![3],
            parsed: None,
        });
        let block = Block {
            slot: 1,
            transactions: vec![tx],
            ..Default::default()
        };
        let mut extractor = TokenBalanceExtractor::new();
        extractor.process_block(&block);
        let results: TokenBalanceResults = serde_json::from_value(extractor.get_results()).unwrap();
        assert_eq!(results.transfers, 1);
    }

    #[test]
    fn transfer_checked_attributes_activity_to_its_mint() {
        let mint = bs58::encode([11u8; 32]).into_string();
        let mut tx = Transaction::default();
        tx.instructions.push(Instruction {
            program_id: TOKEN_PROGRAM_ID.to_string(),
            accounts: vec!["source".into(), mint.clone(), "dest".into()],
            data: vec![12],
            parsed: None,
        });
        let block = Block {
            slot: 1,
            transactions: vec![tx],
            ..Default::default()
        };
        let mut extractor = TokenBalanceExtractor::new();
        extractor.process_block(&block);
        let results: TokenBalanceResults = serde_json::from_value(extractor.get_results()).unwrap();
        let activity = &results.activity_by_mint[&mint];
        assert!(activity.unique_senders.contains("source"));
        assert!(activity.unique_receivers.contains("dest"));
    }

    #[test]
    fn balance_delta_accumulates_volume() {
        let mut tx = Transaction::default();
        tx.pre_token_balances.push(TokenBalance {
            account_index: 0,
            mint: "MintA".into(),
            owner: None,
            amount: "100".into(),
            decimals: 6,
        });
        tx.post_token_balances.push(TokenBalance {
            account_index: 0,
            mint: "MintA".into(),
            owner: None,
            amount: "150".into(),
            decimals: 6,
        });
        let block = Block {
            slot: 2,
            transactions: vec![tx],
            ..Default::default()
        };
        let mut extractor = TokenBalanceExtractor::new();
        extractor.process_block(&block);
        let results: TokenBalanceResults = serde_json::from_value(extractor.get_results()).unwrap();
        assert_eq!(results.activity_by_mint["MintA"].volume, 50);
    }
}
