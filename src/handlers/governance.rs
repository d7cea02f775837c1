//! Governance extractor (C9, §4.9): triggered by governance program ids;
//! classifies proposal_create/vote_cast/comment/execution/config_change
//! and tallies unique voters and vote distribution.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;

use crate::error::ErrorKind;
use crate::handlers::{is_skippable, ordered_instructions, BlockHandler, HandlerStats};
use crate::programs::registry::{classify_program, ProgramKind};
use crate::rpc::types::{Block, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernanceEventKind {
    ProposalCreate,
    VoteCast,
    Comment,
    Execution,
    ConfigChange,
}

impl GovernanceEventKind {
    fn as_str(&self) -> &'static str {
        match self {
            GovernanceEventKind::ProposalCreate => "proposal_create",
            GovernanceEventKind::VoteCast => "vote_cast",
            GovernanceEventKind::Comment => "comment",
            GovernanceEventKind::Execution => "execution",
            GovernanceEventKind::ConfigChange => "config_change",
        }
    }

    fn from_instruction_type(t: &str) -> Option<Self> {
        let t = t.to_lowercase();
        if t.contains("createproposal") || t.contains("proposal_create") {
            Some(GovernanceEventKind::ProposalCreate)
        } else if t.contains("castvote") || t.contains("vote") {
            Some(GovernanceEventKind::VoteCast)
        } else if t.contains("comment") {
            Some(GovernanceEventKind::Comment)
        } else if t.contains("execute") {
            Some(GovernanceEventKind::Execution)
        } else if t.contains("setconfig") || t.contains("updateconfig") {
            Some(GovernanceEventKind::ConfigChange)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct VoteDistribution {
    pub yes: u64,
    pub no: u64,
    pub abstain: u64,
}

#[derive(Debug, Default, Serialize)]
pub struct GovernanceResults {
    pub stats: HandlerStats,
    pub event_counts: HashMap<String, u64>,
    pub unique_voters: HashSet<String>,
    pub vote_distribution: VoteDistribution,
}

#[derive(Default)]
pub struct GovernanceExtractor {
    stats: HandlerStats,
    event_counts: HashMap<String, u64>,
    unique_voters: HashSet<String>,
    vote_distribution: VoteDistribution,
}

impl GovernanceExtractor {
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
            if classify_program(&instruction.program_id, &instruction.data) != ProgramKind::Governance {
                continue;
            }
            touched = true;
            let Some(instruction_type) = instruction.parsed.as_ref().map(|p| p.instruction_type.as_str())
            else {
                continue;
            };
            let Some(event) = GovernanceEventKind::from_instruction_type(instruction_type) else {
                continue;
            };
            *self.event_counts.entry(event.as_str().to_string()).or_insert(0) += 1;

            if event == GovernanceEventKind::VoteCast {
                if let Some(voter) = instruction.accounts.first() {
                    self.unique_voters.insert(voter.clone());
                }
                self.tally_vote_choice(instruction);
            }
        }

        if touched {
            self.stats.record_success();
        }
    }

    /// A vote's choice surfaces as `info.vote` on the parsed instruction
    /// when the RPC reports jsonParsed encoding; falls back to skipping
    /// the tally (still counting the cast) when it's absent (§4.9).
    fn tally_vote_choice(&mut self, instruction: &crate::rpc::types::Instruction) {
        let Some(parsed) = &instruction.parsed else { return };
        let choice = parsed
            .info
            .get("vote")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_lowercase();
        match choice.as_str() {
            "yes" | "approve" => self.vote_distribution.yes += 1,
            "no" | "deny" => self.vote_distribution.no += 1,
            "abstain" => self.vote_distribution.abstain += 1,
            _ => {}
        }
    }
}

impl BlockHandler for GovernanceExtractor {
    fn process_block(&mut self, block: &Block) -> Value {
        for tx in &block.transactions {
            self.process_transaction(tx);
        }
        serde_json::json!({ "slot": block.slot, "unique_voters": self.unique_voters.len() })
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
        serde_json::to_value(GovernanceResults {
            stats: self.stats.clone(),
            event_counts: self.event_counts.clone(),
            unique_voters: self.unique_voters.clone(),
            vote_distribution: self.vote_distribution,
        })
        .unwrap_or(Value::Null)
    }

    fn reset(&mut self) {
        self.stats.reset();
        self.event_counts.clear();
        self.unique_voters.clear();
        self.vote_distribution = VoteDistribution::default();
    }

    fn name(&self) -> &'static str {
        "governance_extractor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::programs::registry::SPL_GOVERNANCE_PROGRAM_ID;
    use crate::rpc::types::{Instruction, ParsedInstruction};

    fn vote_instruction(voter: &str, choice: &str) -> Instruction {
        Instruction {
            program_id: SPL_GOVERNANCE_PROGRAM_ID.to_string(),
            accounts: vec![voter.to_string()],
            data: vec![],
            parsed: Some(ParsedInstruction {
                instruction_type: "castVote".to_string(),
                info: serde_json::json!({ "vote": choice }),
            }),
        }
    }

    #[test]
    fn cast_vote_is_tallied_and_voter_recorded() {
        let mut tx = Transaction::default();
        tx.instructions.push(vote_instruction("voterA", "yes"));
        let block = Block {
            slot: 1,
            transactions: vec![tx],
            ..Default::default()
        };
        let mut extractor = GovernanceExtractor::new();
        extractor.process_block(&block);
        let results: GovernanceResults = serde_json::from_value(extractor.get_results()).unwrap();
        assert_eq!(results.event_counts["vote_cast"], 1);
        assert!(results.unique_voters.contains("voterA"));
        assert_eq!(results.vote_distribution.yes, 1);
    }

    #[test]
    fn proposal_create_is_classified() {
        let mut tx = Transaction::default();
        tx.instructions.push(Instruction {
            program_id: SPL_GOVERNANCE_PROGRAM_ID.to_string(),
            accounts: vec![],
            data: vec![],
            parsed: Some(ParsedInstruction {
                instruction_type: "createProposal".to_string(),
                info: Value::Null,
            }),
        });
        let block = Block {
            slot: 1,
            transactions: vec![tx],
            ..Default::default()
        };
        let mut extractor = GovernanceExtractor::new();
        extractor.process_block(&block);
        let results: GovernanceResults = serde_json::from_value(extractor.get_results()).unwrap();
        assert_eq!(results.event_counts["proposal_create"], 1);
    }
}
