//! Black-box mint-extraction scenarios that exercise multiple evidence
//! paths and the handler framework's panic trapping together, rather than
//! any one function in isolation.

use chainwatch_indexer::handlers::mint::{is_admissible_address, MintExtractor, MintExtractorResults};
use chainwatch_indexer::handlers::{BlockHandler, StatsWrapper};
use chainwatch_indexer::programs::registry::{TOKEN_2022_PROGRAM_ID, TOKEN_PROGRAM_ID};
use chainwatch_indexer::rpc::types::{Block, Instruction, TokenBalance, Transaction};

fn init_mint(program_id: &str, mint: &str, discriminator: u8) -> Instruction {
    Instruction {
        program_id: program_id.to_string(),
        accounts: vec![mint.to_string(), "rent_sysvar".to_string()],
        data: vec![discriminator],
        parsed: None,
    }
}

#[test]
fn a_block_with_multiple_evidence_paths_surfaces_every_admissible_mint() {
    let explicit_mint = bs58::encode([1u8; 32]).into_string();
    let token2022_mint = bs58::encode([2u8; 32]).into_string();
    let balance_delta_mint = bs58::encode([3u8; 32]).into_string();

    let mut explicit_tx = Transaction::default();
    explicit_tx
        .instructions
        .push(init_mint(TOKEN_PROGRAM_ID, &explicit_mint, 0x00));

    let mut token2022_tx = Transaction::default();
    token2022_tx
        .instructions
        .push(init_mint(TOKEN_2022_PROGRAM_ID, &token2022_mint, 0x08));

    let mut balance_tx = Transaction::default();
    balance_tx.post_token_balances.push(TokenBalance {
        account_index: 0,
        mint: balance_delta_mint.clone(),
        owner: Some("owner".into()),
        amount: "500".into(),
        decimals: 9,
    });

    let block = Block {
        slot: 9000,
        block_time: Some(1_700_000_000),
        transactions: vec![explicit_tx, token2022_tx, balance_tx],
        ..Default::default()
    };

    let mut handler = StatsWrapper::new(MintExtractor::new());
    handler.process_block(&block);
    let results: MintExtractorResults = serde_json::from_value(handler.get_results()).unwrap();

    assert!(results.mint_addresses.contains(&explicit_mint));
    assert!(results.mint_addresses.contains(&token2022_mint));
    assert!(results.mint_addresses.contains(&balance_delta_mint));
    assert_eq!(results.mint_addresses.len(), 3);
    assert_eq!(handler.blocks_failed(), 0);
}

#[test]
fn pump_suffixed_vanity_mints_are_flagged_without_affecting_admissibility() {
    let base = bs58::encode([4u8; 32]).into_string();
    let mut pump_mint = base.clone();
    pump_mint.push_str("pump");

    assert!(is_admissible_address(&base));
    // A synthetic suffix-appended string is no longer a valid 32-byte
    // decode, so this exercises the admissibility gate rejecting it rather
    // than the suffix heuristic accepting a malformed address.
    assert!(!is_admissible_address(&pump_mint));
}

#[test]
fn a_block_containing_only_vote_transactions_yields_no_mints_and_no_failures() {
    let mut tx = Transaction::default();
    tx.instructions.push(Instruction {
        program_id: chainwatch_indexer::programs::registry::VOTE_PROGRAM_ID.to_string(),
        accounts: vec![],
        data: vec![],
        parsed: None,
    });
    let block = Block {
        slot: 9001,
        transactions: vec![tx],
        ..Default::default()
    };

    let mut handler = StatsWrapper::new(MintExtractor::new());
    handler.process_block(&block);
    let results: MintExtractorResults = serde_json::from_value(handler.get_results()).unwrap();

    assert!(results.mint_addresses.is_empty());
    assert_eq!(results.skipped, 1);
    assert_eq!(handler.blocks_failed(), 0);
}
