use thiserror::Error;

/// The closed taxonomy of failures the RPC/extraction core can produce.
///
/// Every variant carries whether it is safe to retry and, where the
/// upstream node told us, how long to wait before trying again.
#[derive(Debug, Clone, Error)]
pub enum ErrorKind {
    #[error("node is behind the cluster tip")]
    NodeBehind,
    #[error("slot {0} was skipped")]
    SlotSkipped(u64),
    #[error("missing blocks in requested range")]
    MissingBlocks,
    #[error("node is unhealthy")]
    NodeUnhealthy,
    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("transaction simulation failed")]
    SimulationFailed,
    #[error("block not available")]
    BlockNotAvailable,
    #[error("block status unavailable")]
    BlockStatusUnavailable,
    #[error("unsupported transaction version")]
    UnsupportedTxVersion,
    #[error("minimum context slot not reached")]
    MinContextSlotNotReached,
    #[error("method not supported by this endpoint")]
    MethodNotSupported,
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("signature verification failed")]
    SignatureVerification,
    #[error("program instruction error in {program_id}: {detail}")]
    ProgramInstructionError { program_id: String, detail: String },
    #[error("transport error: {0}")]
    TransportError(String),
    #[error("failed to parse response: {0}")]
    ParseError(String),
}

impl ErrorKind {
    /// Whether the Query Layer may retry an operation that failed with this error.
    pub fn retryable(&self) -> bool {
        match self {
            ErrorKind::NodeBehind
            | ErrorKind::NodeUnhealthy
            | ErrorKind::RateLimited { .. }
            | ErrorKind::SimulationFailed
            | ErrorKind::BlockNotAvailable
            | ErrorKind::BlockStatusUnavailable
            | ErrorKind::MinContextSlotNotReached
            | ErrorKind::TransportError(_) => true,
            ErrorKind::SlotSkipped(_)
            | ErrorKind::MissingBlocks
            | ErrorKind::UnsupportedTxVersion
            | ErrorKind::MethodNotSupported
            | ErrorKind::InvalidParameters(_)
            | ErrorKind::SignatureVerification
            | ErrorKind::ProgramInstructionError { .. }
            | ErrorKind::ParseError(_) => false,
        }
    }

    /// Hint, in seconds, for how long the caller should wait before retrying.
    pub fn retry_after_hint(&self) -> Option<u64> {
        match self {
            ErrorKind::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_state_errors_are_retryable() {
        assert!(ErrorKind::NodeBehind.retryable());
        assert!(ErrorKind::BlockNotAvailable.retryable());
        assert!(ErrorKind::MinContextSlotNotReached.retryable());
    }

    #[test]
    fn terminal_errors_are_not_retryable() {
        assert!(!ErrorKind::SlotSkipped(42).retryable());
        assert!(!ErrorKind::MissingBlocks.retryable());
        assert!(!ErrorKind::UnsupportedTxVersion.retryable());
        assert!(!ErrorKind::InvalidParameters("bad".into()).retryable());
        assert!(!ErrorKind::SignatureVerification.retryable());
    }

    #[test]
    fn rate_limited_carries_retry_after() {
        let e = ErrorKind::RateLimited {
            retry_after_secs: Some(10),
        };
        assert!(e.retryable());
        assert_eq!(e.retry_after_hint(), Some(10));
    }
}
