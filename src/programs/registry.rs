//! The closed set of well-known program IDs (§3 "Program identity") and the
//! classifier that tags an arbitrary program ID against it.

use std::collections::HashMap;
use std::sync::OnceLock;

/// The category a program ID is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    System,
    Token,
    Token2022,
    Ata,
    Metadata,
    CandyMachine,
    NftMarketplace,
    Dex,
    Lending,
    Oracle,
    Governance,
    Vote,
    Stake,
    ComputeBudget,
    Other,
}

impl ProgramKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgramKind::System => "system",
            ProgramKind::Token => "token",
            ProgramKind::Token2022 => "token2022",
            ProgramKind::Ata => "ata",
            ProgramKind::Metadata => "metadata",
            ProgramKind::CandyMachine => "candy_machine",
            ProgramKind::NftMarketplace => "nft_marketplace",
            ProgramKind::Dex => "dex",
            ProgramKind::Lending => "lending",
            ProgramKind::Oracle => "oracle",
            ProgramKind::Governance => "governance",
            ProgramKind::Vote => "vote",
            ProgramKind::Stake => "stake",
            ProgramKind::ComputeBudget => "compute_budget",
            ProgramKind::Other => "other",
        }
    }
}

pub const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const TOKEN_2022_PROGRAM_ID: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";
pub const ASSOCIATED_TOKEN_PROGRAM_ID: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";
pub const METADATA_PROGRAM_ID: &str = "metaqbxxUERdq28cj1RbAWkYQm3ybzjb6a8bt518x1s";
pub const CANDY_MACHINE_PROGRAM_ID: &str = "cndy3Z4yapfJBmL3ShUp5exZKqR3z33thTzeNMm2gRZ";
pub const VOTE_PROGRAM_ID: &str = "Vote111111111111111111111111111111111111111";
pub const STAKE_PROGRAM_ID: &str = "Stake11111111111111111111111111111111111111";
pub const STAKE_CONFIG_PROGRAM_ID: &str = "StakeConfig11111111111111111111111111111111";
pub const COMPUTE_BUDGET_PROGRAM_ID: &str = "ComputeBudget111111111111111111111111111111";

// A representative slice of known DEX/AMM program IDs. Not exhaustive;
// unknown DeFi programs fall back to heuristic classification (§4.7).
pub const RAYDIUM_AMM_PROGRAM_ID: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
pub const ORCA_WHIRLPOOL_PROGRAM_ID: &str = "whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc";
pub const SERUM_DEX_PROGRAM_ID: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
pub const JUPITER_AGGREGATOR_PROGRAM_ID: &str = "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4";

pub const SOLEND_PROGRAM_ID: &str = "So1endDq2YkqhipRh3WViPa8hdiSpxWy6z3Z6tMCpAo";
pub const PYTH_ORACLE_PROGRAM_ID: &str = "FsJ3A3u2vn5cTVofAjvy6y5kwABJAqYWpe4975bi2epH";

pub const SPL_GOVERNANCE_PROGRAM_ID: &str = "GovER5Lthms3bLBqWub97yVrMmEogzX7xNjdXpPPCVZw";

// Marketplace / auction-house program IDs that drive the NFT extractor's
// sale/listing/delisting classification (§4.9).
pub const METAPLEX_AUCTION_HOUSE_PROGRAM_ID: &str = "hausS13jsjafwWwGqZTUQRmWyvyxn9EQpqMwV1PBBmk";
pub const MAGIC_EDEN_V2_PROGRAM_ID: &str = "M2mx93ekt1fmXSVkTrUL9xVFHkmME8HTUi5Cyc5aF7K";
pub const TENSOR_SWAP_PROGRAM_ID: &str = "TSWAPaqyCSx2KABk68Shruf4rp7CxcNi8hAsbdwmHbN";

/// Built-in deny-list: well-known stablecoin / wrapped-SOL mints and
/// program addresses that are never emitted as "new mint" evidence (§3, §4.8).
pub const MINT_DENY_LIST: &[&str] = &[
    "So11111111111111111111111111111111111111112", // wrapped SOL
    "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", // USDC
    "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", // USDT
    "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263", // BONK
];

fn registry() -> &'static HashMap<&'static str, ProgramKind> {
    static REGISTRY: OnceLock<HashMap<&'static str, ProgramKind>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut m = HashMap::new();
        m.insert(SYSTEM_PROGRAM_ID, ProgramKind::System);
        m.insert(TOKEN_PROGRAM_ID, ProgramKind::Token);
        m.insert(TOKEN_2022_PROGRAM_ID, ProgramKind::Token2022);
        m.insert(ASSOCIATED_TOKEN_PROGRAM_ID, ProgramKind::Ata);
        m.insert(METADATA_PROGRAM_ID, ProgramKind::Metadata);
        m.insert(CANDY_MACHINE_PROGRAM_ID, ProgramKind::CandyMachine);
        m.insert(VOTE_PROGRAM_ID, ProgramKind::Vote);
        m.insert(STAKE_PROGRAM_ID, ProgramKind::Stake);
        m.insert(STAKE_CONFIG_PROGRAM_ID, ProgramKind::Stake);
        m.insert(COMPUTE_BUDGET_PROGRAM_ID, ProgramKind::ComputeBudget);
        m.insert(RAYDIUM_AMM_PROGRAM_ID, ProgramKind::Dex);
        m.insert(ORCA_WHIRLPOOL_PROGRAM_ID, ProgramKind::Dex);
        m.insert(SERUM_DEX_PROGRAM_ID, ProgramKind::Dex);
        m.insert(JUPITER_AGGREGATOR_PROGRAM_ID, ProgramKind::Dex);
        m.insert(SOLEND_PROGRAM_ID, ProgramKind::Lending);
        m.insert(PYTH_ORACLE_PROGRAM_ID, ProgramKind::Oracle);
        m.insert(SPL_GOVERNANCE_PROGRAM_ID, ProgramKind::Governance);
        m.insert(METAPLEX_AUCTION_HOUSE_PROGRAM_ID, ProgramKind::NftMarketplace);
        m.insert(MAGIC_EDEN_V2_PROGRAM_ID, ProgramKind::NftMarketplace);
        m.insert(TENSOR_SWAP_PROGRAM_ID, ProgramKind::NftMarketplace);
        m
    })
}

/// Classify a program ID against the closed registry, falling back to
/// instruction-data heuristics for anything unrecognized (§4.7).
pub fn classify_program(program_id: &str, instruction_data: &[u8]) -> ProgramKind {
    if let Some(kind) = registry().get(program_id) {
        return *kind;
    }
    classify_by_heuristic(instruction_data)
}

/// Substring-style heuristic used only when a program ID is not in the
/// closed set. Looks for ASCII fragments common in instruction logs that
/// get serialized into the data buffer by some program IDLs.
fn classify_by_heuristic(instruction_data: &[u8]) -> ProgramKind {
    let text = String::from_utf8_lossy(instruction_data).to_lowercase();
    if text.contains("swap") {
        ProgramKind::Dex
    } else if text.contains("mint") {
        ProgramKind::Token
    } else if text.contains("stake") {
        ProgramKind::Stake
    } else if text.contains("vote") {
        ProgramKind::Vote
    } else if text.contains("propose") || text.contains("governance") {
        ProgramKind::Governance
    } else {
        ProgramKind::Other
    }
}

/// True for addresses that are themselves well-known program IDs (never
/// emitted as mint evidence, §3 invariant).
pub fn is_known_system_program(address: &str) -> bool {
    registry().contains_key(address)
}
