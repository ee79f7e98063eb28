//! Durable record types — one struct per logical table.
//!
//! Amount conventions: raw on-chain amounts are kept as decimal wei strings
//! (they exceed u64), credit and energy balances as f64 in display units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── SyncCursor ──────────────────────────────────────────────────────────────

/// Per-stream checkpoint: the last fully-processed block.
///
/// `last_block` is monotonically non-decreasing; restart resumes at
/// `last_block + 1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCursor {
    pub stream_id: String,
    pub last_block: u64,
    pub updated_at: DateTime<Utc>,
}

// ─── ClaimRecord ─────────────────────────────────────────────────────────────

/// One row per successful claim transaction, keyed by tx hash.
///
/// Immutable after insert except the one-way `energy_awarded` false→true
/// transition, which is the sole double-award synchronization point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub tx_hash: String,
    pub address: String,
    pub referrer: Option<String>,
    pub amount_wei: String,
    pub block_number: u64,
    pub block_time: Option<DateTime<Utc>>,
    pub status: ClaimStatus,
    pub energy_awarded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Confirmed,
}

// ─── ReferralRewardRecord ────────────────────────────────────────────────────

/// One row per on-chain referral reward payout, keyed by tx hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralRewardRecord {
    pub tx_hash: String,
    pub referrer: String,
    pub amount_wei: String,
    pub block_number: u64,
    pub block_time: Option<DateTime<Utc>>,
}

// ─── CooldownResetRecord ─────────────────────────────────────────────────────

/// One row per CooldownReset event. Insert success/failure by tx hash is
/// itself the idempotency gate for the one-time referrer bonus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownResetRecord {
    pub tx_hash: String,
    pub referrer: String,
    pub block_number: u64,
    pub block_time: Option<DateTime<Utc>>,
}

// ─── UserAccount ─────────────────────────────────────────────────────────────

/// Per-address ledger row, created on first observed activity.
///
/// `referrer` is fixed on the first successful write and never overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub address: String,
    pub referrer: Option<String>,
    pub invite_count: i64,
    pub energy_total: f64,
    pub energy_locked: f64,
    pub credit_total: f64,
    pub credit_locked: f64,
    pub last_settlement: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    /// Fresh account for an address first seen now.
    pub fn new(address: impl Into<String>, referrer: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            address: address.into(),
            referrer,
            invite_count: 0,
            energy_total: 0.0,
            energy_locked: 0.0,
            credit_total: 0.0,
            credit_locked: 0.0,
            last_settlement: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn available_energy(&self) -> f64 {
        (self.energy_total - self.energy_locked).max(0.0)
    }

    pub fn available_credit(&self) -> f64 {
        (self.credit_total - self.credit_locked).max(0.0)
    }

    /// Returns `true` if the account satisfies total ≥ locked on both axes.
    pub fn invariants_hold(&self) -> bool {
        self.energy_total >= self.energy_locked && self.credit_total >= self.credit_locked
    }
}

// ─── WithdrawalRequest ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Completed,
    Rejected,
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// A user-initiated withdrawal and its collateral lock.
///
/// Created Pending; moves to Completed (verified payout) or Rejected. Both
/// release locks, only Completed debits totals. `payout_tx_hash` is unique
/// once set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: String,
    pub address: String,
    pub amount: f64,
    pub status: WithdrawalStatus,
    pub energy_locked_amount: f64,
    pub payout_tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_available_balances() {
        let mut acct = UserAccount::new("0xabc", None, Utc::now());
        acct.energy_total = 50.0;
        acct.energy_locked = 20.0;
        acct.credit_total = 100.0;
        acct.credit_locked = 100.0;
        assert_eq!(acct.available_energy(), 30.0);
        assert_eq!(acct.available_credit(), 0.0);
        assert!(acct.invariants_hold());
    }

    #[test]
    fn invariant_violation_detected() {
        let mut acct = UserAccount::new("0xabc", None, Utc::now());
        acct.credit_locked = 1.0;
        assert!(!acct.invariants_hold());
        assert_eq!(acct.available_credit(), 0.0); // floored, never negative
    }

    #[test]
    fn withdrawal_status_display() {
        assert_eq!(WithdrawalStatus::Pending.to_string(), "pending");
        assert_eq!(WithdrawalStatus::Completed.to_string(), "completed");
    }
}
