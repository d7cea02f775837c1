//! Response Classifier (§4.4): a pure mapping from JSON-RPC error codes and
//! program-execution error shapes to the closed [`ErrorKind`] taxonomy.
//!
//! No I/O, no async — this module exists so the mapping itself is directly
//! unit-testable without a running endpoint.

use serde_json::Value;

use crate::error::ErrorKind;
use crate::rpc::types::JsonRpcError;

// Solana JSON-RPC custom error codes (§4.4's table, verbatim).
const SEND_TRANSACTION_SIMULATION_FAILED: i64 = -32002;
const TX_SIGNATURE_VERIFICATION_FAILURE: i64 = -32003;
const BLOCK_NOT_AVAILABLE: i64 = -32004;
// -32005 is documented as "NodeUnhealthy (behind)" — the node-is-behind
// signal, distinct from the HTTP-level NodeUnhealthy classify_http_status
// reports for 5xx/transport failures.
const NODE_BEHIND: i64 = -32005;
const SLOT_SKIPPED: i64 = -32007;
const MISSING_BLOCKS: i64 = -32009;
const BLOCK_STATUS_NOT_AVAILABLE: i64 = -32014;
const UNSUPPORTED_TRANSACTION_VERSION: i64 = -32015;
const MIN_CONTEXT_SLOT_NOT_REACHED: i64 = -32016;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

/// Classifies a JSON-RPC error object into the closed taxonomy.
pub fn classify_rpc_error(err: &JsonRpcError) -> ErrorKind {
    match err.code {
        SEND_TRANSACTION_SIMULATION_FAILED => ErrorKind::SimulationFailed,
        TX_SIGNATURE_VERIFICATION_FAILURE => ErrorKind::SignatureVerification,
        BLOCK_NOT_AVAILABLE => ErrorKind::BlockNotAvailable,
        NODE_BEHIND => ErrorKind::NodeBehind,
        SLOT_SKIPPED => ErrorKind::SlotSkipped(extract_slot(&err.data).unwrap_or(0)),
        MISSING_BLOCKS => ErrorKind::MissingBlocks,
        BLOCK_STATUS_NOT_AVAILABLE => ErrorKind::BlockStatusUnavailable,
        UNSUPPORTED_TRANSACTION_VERSION => ErrorKind::UnsupportedTxVersion,
        MIN_CONTEXT_SLOT_NOT_REACHED => ErrorKind::MinContextSlotNotReached,
        METHOD_NOT_FOUND => ErrorKind::MethodNotSupported,
        INVALID_PARAMS => ErrorKind::InvalidParameters(err.message.clone()),
        _ => ErrorKind::InvalidParameters(err.message.clone()),
    }
}

/// Classifies an HTTP status code that arrived without a JSON-RPC body
/// (transport-level failures, §4.4).
pub fn classify_http_status(status: u16, retry_after_secs: Option<u64>) -> ErrorKind {
    match status {
        429 => ErrorKind::RateLimited { retry_after_secs },
        500..=599 => ErrorKind::NodeUnhealthy,
        _ => ErrorKind::TransportError(format!("unexpected HTTP status {status}")),
    }
}

/// Classifies an `err` field embedded in a transaction's metadata — the
/// instruction-level error shape nested inside an otherwise successful
/// `getTransaction`/block response (§4.4).
pub fn classify_instruction_error(program_id: &str, err: &Value) -> ErrorKind {
    ErrorKind::ProgramInstructionError {
        program_id: program_id.to_string(),
        detail: err.to_string(),
    }
}

fn extract_slot(data: &Option<Value>) -> Option<u64> {
    data.as_ref()?.get("slot")?.as_u64()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(code: i64, message: &str, data: Option<Value>) -> JsonRpcError {
        JsonRpcError {
            code,
            message: message.to_string(),
            data,
        }
    }

    #[test]
    fn node_behind_maps_correctly() {
        assert!(matches!(
            classify_rpc_error(&err(NODE_BEHIND, "node is behind", None)),
            ErrorKind::NodeBehind
        ));
    }

    #[test]
    fn slot_skipped_carries_slot_from_data() {
        let data = Some(serde_json::json!({"slot": 42}));
        match classify_rpc_error(&err(SLOT_SKIPPED, "slot skipped", data)) {
            ErrorKind::SlotSkipped(slot) => assert_eq!(slot, 42),
            other => panic!("expected SlotSkipped, got {other:?}"),
        }
    }

    #[test]
    fn rate_limited_status_carries_retry_after() {
        let kind = classify_http_status(429, Some(10));
        match kind {
            ErrorKind::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, Some(10)),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn server_error_status_is_node_unhealthy() {
        assert!(matches!(
            classify_http_status(503, None),
            ErrorKind::NodeUnhealthy
        ));
    }

    #[test]
    fn unknown_code_falls_back_to_invalid_parameters() {
        assert!(matches!(
            classify_rpc_error(&err(-1, "weird", None)),
            ErrorKind::InvalidParameters(_)
        ));
    }
}
