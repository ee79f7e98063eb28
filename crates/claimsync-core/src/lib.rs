//! claimsync-core — foundation for the claim ledger and settlement engine.
//!
//! # Architecture
//!
//! ```text
//! EventScanner / ClaimVerifier / SettlementEngine
//!        │
//!        └── LedgerStore trait  (cursor, claims, rewards, resets, users, withdrawals)
//!                 ├── MemoryStore  (claimsync-storage)
//!                 └── SqliteStore  (claimsync-storage, feature: sqlite)
//! ```
//!
//! This crate holds everything the engine and storage crates share: the
//! durable record types, the `LedgerStore` trait, the configuration tree,
//! and the error taxonomy with its stable per-variant codes.

pub mod config;
pub mod error;
pub mod records;
pub mod store;

pub use config::{AppConfig, ScanConfig, SettlementConfig, TierBand};
pub use error::LedgerError;
pub use records::{
    ClaimRecord, CooldownResetRecord, ReferralRewardRecord, SyncCursor, UserAccount,
    WithdrawalRequest, WithdrawalStatus,
};
pub use store::LedgerStore;
