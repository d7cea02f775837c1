//! Instruction Decoder (C7, §4.7): classifies the program an already
//! wire-normalized [`Instruction`] targets, and counts instructions that
//! arrived with no resolvable program id rather than treating them as
//! fatal (§4.7, §7).
//!
//! Expects `Instruction::data` to already be raw bytes (the Query Layer
//! decodes `data` from its base58 wire encoding before handlers ever see
//! it); when a `parsed` form is present this decoder prefers it over
//! re-deriving a discriminator from raw bytes.

use crate::programs::registry::{classify_program, ProgramKind};
use crate::rpc::types::Instruction;

#[derive(Debug, Clone)]
pub struct DecodedInstruction {
    pub program_id: String,
    pub kind: ProgramKind,
    pub instruction_type: Option<String>,
}

/// Stateful only in the sense that it counts instructions it had to
/// reject; classification itself is pure (§4.7).
#[derive(Debug, Default)]
pub struct InstructionDecoder {
    rejected_count: u64,
}

impl InstructionDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` (and increments the rejection counter) when the
    /// instruction carries no program id — the Query Layer already tried
    /// all three resolution shapes before handing it off (§4.7).
    pub fn decode(&mut self, instruction: &Instruction) -> Option<DecodedInstruction> {
        if instruction.program_id.is_empty() {
            self.rejected_count += 1;
            tracing::debug!("decoder rejecting instruction with unresolved program id");
            return None;
        }
        let kind = classify_program(&instruction.program_id, &instruction.data);
        let instruction_type = instruction
            .parsed
            .as_ref()
            .map(|p| p.instruction_type.clone());
        Some(DecodedInstruction {
            program_id: instruction.program_id.clone(),
            kind,
            instruction_type,
        })
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected_count
    }

    pub fn reset(&mut self) {
        self.rejected_count = 0;
    }
}
