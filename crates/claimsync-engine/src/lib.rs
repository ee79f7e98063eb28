//! claimsync-engine — chain synchronization and settlement.
//!
//! # Architecture
//!
//! ```text
//! EventScanner ──┐                       (background loop, at-least-once)
//! ClaimVerifier ─┼── LedgerWriter ── LedgerStore   (idempotent primitives)
//! Reindexer ─────┘
//! SettlementEngine ── LedgerStore + ChainClient    (locks, payout checks)
//! ```
//!
//! The scanner and the interactive verifier converge on the same
//! `LedgerWriter` primitives; unique keys and the energy-award gate in the
//! store make concurrent processing of one tx hash safe.

pub mod events;
pub mod handlers;
pub mod reindex;
pub mod scanner;
pub mod settle;
pub mod verify;

pub use events::{ContractEvent, EventDecoder, LogMeta};
pub use handlers::LedgerWriter;
pub use reindex::{ReindexReport, Reindexer};
pub use scanner::{EventScanner, ScanOutcome};
pub use settle::{AccountView, SettlementEngine, WithdrawalOutcome};
pub use verify::{ClaimOutcome, ClaimVerifier};

use claimsync_chain::RpcError;
use claimsync_core::LedgerError;

/// Lift a transport fault into the engine error space, keeping timeouts
/// distinguishable.
pub(crate) fn map_rpc(e: RpcError) -> LedgerError {
    match e {
        RpcError::Timeout { ms } => LedgerError::RpcTimeout { ms },
        other => LedgerError::Rpc(other.to_string()),
    }
}
