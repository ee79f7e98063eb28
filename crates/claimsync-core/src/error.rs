//! Error taxonomy for the ledger pipeline.
//!
//! Every variant carries a stable code string so that collaborating layers
//! (HTTP framing lives outside this workspace) can map errors without
//! matching on display text. Validation and invariant faults are terminal;
//! only RPC-shaped faults are retryable.

use thiserror::Error;

/// Errors surfaced by the scanner, verification, and settlement paths.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC request timed out after {ms}ms")]
    RpcTimeout { ms: u64 },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("transaction {tx_hash} not found")]
    TxNotFound { tx_hash: String },

    #[error("transaction sent to {actual}, expected contract {expected}")]
    ToMismatch { expected: String, actual: String },

    #[error("transaction sender {actual} does not match caller {expected}")]
    FromMismatch { expected: String, actual: String },

    #[error("transaction {tx_hash} reverted")]
    TxFailed { tx_hash: String },

    #[error("no matching claim event in transaction {tx_hash}")]
    EventNotFound { tx_hash: String },

    #[error("user {address} not found")]
    UserNotFound { address: String },

    #[error("insufficient credit: requested {requested}, available {available}")]
    CreditNotEnough { requested: f64, available: f64 },

    #[error("insufficient energy: required {required}, available {available}")]
    EnergyNotEnough { required: f64, available: f64 },

    #[error("withdrawal {id} not found")]
    WithdrawalNotFound { id: String },

    #[error("withdrawal {id} is {status}, expected pending")]
    InvalidWithdrawalState { id: String, status: String },

    #[error("payout tx {tx_hash} already attached to withdrawal {other_id}")]
    PayoutHashReused { tx_hash: String, other_id: String },

    #[error("payout transfer mismatch: {reason}")]
    TransferMismatch { reason: String },
}

impl LedgerError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rpc(_) => "RPC_ERROR",
            Self::RpcTimeout { .. } => "RPC_TIMEOUT",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::TxNotFound { .. } => "TX_NOT_FOUND",
            Self::ToMismatch { .. } => "TO_MISMATCH",
            Self::FromMismatch { .. } => "FROM_MISMATCH",
            Self::TxFailed { .. } => "TX_FAILED",
            Self::EventNotFound { .. } => "EVENT_NOT_FOUND",
            Self::UserNotFound { .. } => "USER_NOT_FOUND",
            Self::CreditNotEnough { .. } => "CREDIT_NOT_ENOUGH",
            Self::EnergyNotEnough { .. } => "ENERGY_NOT_ENOUGH",
            Self::WithdrawalNotFound { .. } => "WITHDRAWAL_NOT_FOUND",
            Self::InvalidWithdrawalState { .. } => "INVALID_WITHDRAWAL_STATE",
            Self::PayoutHashReused { .. } => "PAYOUT_HASH_REUSED",
            Self::TransferMismatch { .. } => "TRANSFER_MISMATCH",
        }
    }

    /// Returns `true` if the error is transient and the caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::RpcTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let e = LedgerError::CreditNotEnough {
            requested: 20.0,
            available: 5.0,
        };
        assert_eq!(e.code(), "CREDIT_NOT_ENOUGH");
        assert!(!e.is_retryable());
    }

    #[test]
    fn rpc_errors_are_retryable() {
        assert!(LedgerError::Rpc("connection reset".into()).is_retryable());
        assert!(LedgerError::RpcTimeout { ms: 5000 }.is_retryable());
        assert!(!LedgerError::TxFailed { tx_hash: "0xab".into() }.is_retryable());
    }
}
