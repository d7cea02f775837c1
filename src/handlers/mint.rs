//! Mint Extractor (C8, §4.8): detects newly created token mints in a
//! block via four disjoint, unioned evidence paths, validates candidate
//! addresses, and flags the "pump token" heuristic.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

use crate::error::ErrorKind;
use crate::handlers::{ordered_instructions, BlockHandler, HandlerStats};
use crate::programs::registry::{self, ProgramKind, MINT_DENY_LIST};
use crate::rpc::types::{Block, Instruction, Transaction};

const INITIALIZE_MINT_DISCRIMINATOR: u8 = 0x00;
const INITIALIZE_MINT2_DISCRIMINATOR: u8 = 0x08;

// Metaplex token-metadata instruction discriminators this extractor
// recognizes as mint-creation evidence when the raw (non-parsed) shape is
// all that's available. Recognized by name when `parsed.instruction_type`
// is present, which is the common case for jsonParsed encoding.
const METADATA_CREATE_NAMES: &[&str] = &[
    "createmetadataaccount",
    "createmetadataaccountv2",
    "createmetadataaccountv3",
    "createmastereditionv3",
    "createmasteredition",
];
const METADATA_CREATE_DISCRIMINATORS: &[u8] = &[0, 16, 17, 33];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintSource {
    ExplicitInit,
    MetadataCreate,
    AtaCreate,
    BalanceDelta,
}

impl MintSource {
    fn as_str(&self) -> &'static str {
        match self {
            MintSource::ExplicitInit => "explicit_init",
            MintSource::MetadataCreate => "metadata_create",
            MintSource::AtaCreate => "ata_create",
            MintSource::BalanceDelta => "balance_delta",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MintOperation {
    pub address: String,
    pub program: String,
    pub source: &'static str,
    pub accounts: Vec<String>,
    pub slot: u64,
    pub block_time: Option<i64>,
}

/// An address is admissible iff it decodes as 32 raw bytes, is not on the
/// built-in deny-list, is not a known system/program id, and doesn't look
/// like a program address itself (long runs of `1`, the base58 zero byte) (§4.8).
pub fn is_admissible_address(address: &str) -> bool {
    let decoded = match bs58::decode(address).into_vec() {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    if decoded.len() != 32 {
        return false;
    }
    if MINT_DENY_LIST.contains(&address) {
        return false;
    }
    if registry::is_known_system_program(address) {
        return false;
    }
    if looks_like_program_address(address) {
        return false;
    }
    true
}

/// Heuristic catch for program-shaped addresses not already in the closed
/// registry: long runs of the base58 "zero" digit `1` at either end are a
/// strong signal of a padded/derived program address (§4.8).
fn looks_like_program_address(address: &str) -> bool {
    const RUN_THRESHOLD: usize = 10;
    let leading_ones = address.chars().take_while(|&c| c == '1').count();
    let trailing_ones = address.chars().rev().take_while(|&c| c == '1').count();
    leading_ones >= RUN_THRESHOLD || trailing_ones >= RUN_THRESHOLD
}

/// Exact, case-sensitive suffix match — mid-string "pump" occurrences do
/// not count (§4.8, §9 resolved Open Question).
pub fn is_pump_suffixed(address: &str) -> bool {
    address.ends_with("pump")
}

#[derive(Debug, Default, Serialize)]
pub struct MintExtractorResults {
    pub stats: HandlerStats,
    pub mint_addresses: Vec<String>,
    pub pump_token_addresses: Vec<String>,
    pub mint_operations: Vec<MintOperation>,
    pub instruction_errors: u64,
    pub transaction_errors: u64,
    pub skipped: u64,
}

pub struct MintExtractor {
    mint_addresses: HashSet<String>,
    pump_token_addresses: HashSet<String>,
    mint_operations: Vec<MintOperation>,
    stats: HandlerStats,
    instruction_errors: u64,
    transaction_errors: u64,
    skipped: u64,
}

impl MintExtractor {
    pub fn new() -> Self {
        Self {
            mint_addresses: HashSet::new(),
            pump_token_addresses: HashSet::new(),
            mint_operations: Vec::new(),
            stats: HandlerStats::default(),
            instruction_errors: 0,
            transaction_errors: 0,
            skipped: 0,
        }
    }

    fn record_mint(&mut self, address: &str, program: &str, source: MintSource, accounts: &[String], slot: u64, block_time: Option<i64>) {
        if !is_admissible_address(address) {
            return;
        }
        self.mint_addresses.insert(address.to_string());
        if is_pump_suffixed(address) {
            self.pump_token_addresses.insert(address.to_string());
        }
        self.mint_operations.push(MintOperation {
            address: address.to_string(),
            program: program.to_string(),
            source: source.as_str(),
            accounts: accounts.to_vec(),
            slot,
            block_time,
        });
    }

    fn process_transaction(&mut self, tx: &Transaction, slot: u64, block_time: Option<i64>) {
        if crate::handlers::is_skippable(tx) {
            self.skipped += 1;
            return;
        }

        for instruction in ordered_instructions(tx) {
            self.process_instruction(instruction, slot, block_time);
        }

        for balance in &tx.post_token_balances {
            let already_present = tx
                .pre_token_balances
                .iter()
                .any(|pre| pre.mint == balance.mint);
            if !already_present {
                self.record_mint(
                    &balance.mint,
                    "token_balance",
                    MintSource::BalanceDelta,
                    &[],
                    slot,
                    block_time,
                );
            }
        }

        for line in &tx.log_messages {
            if line.starts_with("Initialize the associated token account")
                || line.contains("Initialize mint")
                || line.contains("Create mint")
                || line.contains("Token mint")
                || line.contains("Creating mint")
            {
                self.stats.record_success();
            }
        }
    }

    fn process_instruction(&mut self, instruction: &Instruction, slot: u64, block_time: Option<i64>) {
        let kind = registry::classify_program(&instruction.program_id, &instruction.data);
        match kind {
            ProgramKind::Token | ProgramKind::Token2022 => {
                if self.is_initialize_mint(instruction, kind) {
                    match instruction.accounts.first() {
                        Some(mint) => self.record_mint(
                            mint,
                            &instruction.program_id,
                            MintSource::ExplicitInit,
                            &instruction.accounts,
                            slot,
                            block_time,
                        ),
                        None => self.instruction_errors += 1,
                    }
                }
            }
            ProgramKind::Metadata => {
                if self.is_metadata_create(instruction) {
                    match instruction.accounts.get(1) {
                        Some(mint) => self.record_mint(
                            mint,
                            &instruction.program_id,
                            MintSource::MetadataCreate,
                            &instruction.accounts,
                            slot,
                            block_time,
                        ),
                        None => self.instruction_errors += 1,
                    }
                }
            }
            ProgramKind::Ata => match instruction.accounts.get(2) {
                Some(mint) => self.record_mint(
                    mint,
                    &instruction.program_id,
                    MintSource::AtaCreate,
                    &instruction.accounts,
                    slot,
                    block_time,
                ),
                None => self.instruction_errors += 1,
            },
            _ => {}
        }
    }

    /// Discriminator as the first raw byte of the decoded instruction data
    /// (§9 resolved Open Question) — NOT an ASCII-digit comparison. Falls
    /// back to the parsed `instruction_type` string when present.
    fn is_initialize_mint(&self, instruction: &Instruction, kind: ProgramKind) -> bool {
        if let Some(parsed) = &instruction.parsed {
            let t = parsed.instruction_type.to_lowercase();
            return t == "initializemint" || t == "initializemint2";
        }
        match instruction.data.first() {
            Some(&INITIALIZE_MINT_DISCRIMINATOR) => true,
            Some(&INITIALIZE_MINT2_DISCRIMINATOR) => kind == ProgramKind::Token2022,
            _ => false,
        }
    }

    fn is_metadata_create(&self, instruction: &Instruction) -> bool {
        if let Some(parsed) = &instruction.parsed {
            let t = parsed.instruction_type.to_lowercase().replace('_', "");
            if METADATA_CREATE_NAMES.contains(&t.as_str()) {
                return true;
            }
        }
        matches!(instruction.data.first(), Some(b) if METADATA_CREATE_DISCRIMINATORS.contains(b))
    }
}

impl Default for MintExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockHandler for MintExtractor {
    fn process_block(&mut self, block: &Block) -> Value {
        let before = self.mint_addresses.len();
        for tx in &block.transactions {
            self.process_transaction(tx, block.slot, block.block_time);
        }
        self.stats.record_success();
        serde_json::json!({
            "slot": block.slot,
            "new_mints_this_block": self.mint_addresses.len() - before,
        })
    }

    fn process_result(&mut self, result: &Result<Value, ErrorKind>) -> Value {
        match result {
            Ok(_) => {
                self.stats.record_success();
                serde_json::json!({ "success": true })
            }
            Err(err) => {
                self.stats.record_failure(&format!("{err:?}"));
                self.transaction_errors += 1;
                serde_json::json!({ "success": false, "error": err.to_string() })
            }
        }
    }

    fn get_results(&self) -> Value {
        let results = MintExtractorResults {
            stats: self.stats.clone(),
            mint_addresses: self.mint_addresses.iter().cloned().collect(),
            pump_token_addresses: self.pump_token_addresses.iter().cloned().collect(),
            mint_operations: self.mint_operations.clone(),
            instruction_errors: self.instruction_errors,
            transaction_errors: self.transaction_errors,
            skipped: self.skipped,
        };
        serde_json::to_value(results).unwrap_or(Value::Null)
    }

    fn reset(&mut self) {
        self.mint_addresses.clear();
        self.pump_token_addresses.clear();
        self.mint_operations.clear();
        self.stats.reset();
        self.instruction_errors = 0;
        self.transaction_errors = 0;
        self.skipped = 0;
    }

    fn name(&self) -> &'static str {
        "mint_extractor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::types::{InnerInstructionGroup, TokenBalance};

    fn token_v1_init(mint: &str) -> Instruction {
        Instruction {
            program_id: registry::TOKEN_PROGRAM_ID.to_string(),
            accounts: vec![mint.to_string(), "rent".to_string()],
            data: vec![0x00],
            parsed: None,
        }
    }

    #[test]
    fn valid_mint_address_is_admissible() {
        let address = bs58::encode([7u8; 32]).into_string();
        assert!(is_admissible_address(&address));
    }

    #[test]
    fn system_program_address_is_not_admissible() {
        assert!(!is_admissible_address(registry::SYSTEM_PROGRAM_ID));
    }

    #[test]
    fn wrong_length_address_is_not_admissible() {
        let short = bs58::encode([1u8; 10]).into_string();
        assert!(!is_admissible_address(&short));
    }

    #[test]
    fn pump_suffix_must_be_exact_and_trailing() {
        let mint = bs58::encode([9u8; 32]).into_string();
        assert!(!is_pump_suffixed(&mint));

        let mut with_pump = mint.clone();
        with_pump.push_str("pump");
        assert!(is_pump_suffixed(&with_pump));

        let mid_string = format!("pump{mint}");
        assert!(!is_pump_suffixed(&mid_string));
    }

    #[test]
    fn scenario_initialize_mint_token_v1() {
        let mint = bs58::encode([3u8; 32]).into_string();
        let mut tx = Transaction::default();
        tx.signatures.push("sig".into());
        tx.instructions.push(token_v1_init(&mint));

        let block = Block {
            slot: 100,
            transactions: vec![tx],
            ..Default::default()
        };

        let mut extractor = MintExtractor::new();
        extractor.process_block(&block);
        let results: MintExtractorResults =
            serde_json::from_value(extractor.get_results()).unwrap();
        assert_eq!(results.mint_addresses, vec![mint]);
        assert!(results.pump_token_addresses.is_empty());
    }

    #[test]
    fn scenario_initialize_mint2_token_2022() {
        let mint = bs58::encode([4u8; 32]).into_string();
        let mut tx = Transaction::default();
        tx.instructions.push(Instruction {
            program_id: registry::TOKEN_2022_PROGRAM_ID.to_string(),
            accounts: vec![mint.to_string()],
            data: vec![0x08],
            parsed: None,
        });
        let block = Block {
            slot: 101,
            transactions: vec![tx],
            ..Default::default()
        };
        let mut extractor = MintExtractor::new();
        extractor.process_block(&block);
        let results: MintExtractorResults =
            serde_json::from_value(extractor.get_results()).unwrap();
        assert_eq!(results.mint_addresses, vec![mint]);
    }

    // Real pump-suffixed mints are vanity-mined 32-byte keys; the suffix
    // rule itself is covered byte-exactly in `pump_suffix_must_be_exact_and_trailing`.
    // This scenario exercises the balance-delta evidence path end to end.
    #[test]
    fn scenario_new_mint_via_balance_delta() {
        let mint = bs58::encode([5u8; 32]).into_string();

        let mut tx = Transaction::default();
        tx.post_token_balances.push(TokenBalance {
            account_index: 0,
            mint: mint.clone(),
            owner: Some("owner".into()),
            amount: "1000".into(),
            decimals: 6,
        });
        let block = Block {
            slot: 102,
            transactions: vec![tx],
            ..Default::default()
        };
        let mut extractor = MintExtractor::new();
        extractor.process_block(&block);
        let results: MintExtractorResults =
            serde_json::from_value(extractor.get_results()).unwrap();
        assert!(results.mint_addresses.contains(&mint));
    }

    #[test]
    fn scenario_vote_transaction_is_skipped() {
        let mut tx = Transaction::default();
        tx.instructions.push(Instruction {
            program_id: registry::VOTE_PROGRAM_ID.to_string(),
            accounts: vec![],
            data: vec![],
            parsed: None,
        });
        let block = Block {
            slot: 103,
            transactions: vec![tx],
            ..Default::default()
        };
        let mut extractor = MintExtractor::new();
        extractor.process_block(&block);
        let results: MintExtractorResults =
            serde_json::from_value(extractor.get_results()).unwrap();
        assert!(results.mint_addresses.is_empty());
        assert_eq!(results.skipped, 1);
    }

    #[test]
    fn inner_instructions_are_scanned_like_top_level() {
        let mint = bs58::encode([6u8; 32]).into_string();
        let mut tx = Transaction::default();
        tx.instructions.push(Instruction {
            program_id: "SomeOuterProgram1111111111111111111111111".into(),
            accounts: vec![],
            data: vec![],
            parsed: None,
        });
        tx.inner_instructions.push(InnerInstructionGroup {
            index: 0,
            instructions: vec![token_v1_init(&mint)],
        });
        let block = Block {
            slot: 104,
            transactions: vec![tx],
            ..Default::default()
        };
        let mut extractor = MintExtractor::new();
        extractor.process_block(&block);
        let results: MintExtractorResults =
            serde_json::from_value(extractor.get_results()).unwrap();
        assert_eq!(results.mint_addresses, vec![mint]);
    }

    #[test]
    fn reset_clears_all_accumulated_state() {
        let mint = bs58::encode([8u8; 32]).into_string();
        let mut tx = Transaction::default();
        tx.instructions.push(token_v1_init(&mint));
        let block = Block {
            slot: 105,
            transactions: vec![tx],
            ..Default::default()
        };
        let mut extractor = MintExtractor::new();
        extractor.process_block(&block);
        extractor.reset();
        let results: MintExtractorResults =
            serde_json::from_value(extractor.get_results()).unwrap();
        assert!(results.mint_addresses.is_empty());
        assert_eq!(results.stats.total_processed, 0);
    }

    #[test]
    fn processing_twice_is_idempotent_at_the_set_level_not_the_tally_level() {
        let mint = bs58::encode([2u8; 32]).into_string();
        let mut tx = Transaction::default();
        tx.instructions.push(token_v1_init(&mint));
        let block = Block {
            slot: 106,
            transactions: vec![tx],
            ..Default::default()
        };
        let mut extractor = MintExtractor::new();
        extractor.process_block(&block);
        extractor.process_block(&block);
        let results: MintExtractorResults =
            serde_json::from_value(extractor.get_results()).unwrap();
        assert_eq!(results.mint_addresses.len(), 1);
        assert_eq!(results.stats.total_processed, 2);
    }
}
