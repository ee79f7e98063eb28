//! The `LedgerStore` trait — the relational-store boundary.
//!
//! Consistency lives here: idempotency is enforced through unique-key
//! inserts (`upsert_claim`, `insert_reset`) and conditional updates
//! (`try_mark_energy_awarded`, the sole double-award gate). Callers hold
//! implementations as `Arc<dyn LedgerStore>`.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::records::{
    ClaimRecord, CooldownResetRecord, ReferralRewardRecord, SyncCursor, UserAccount,
    WithdrawalRequest,
};

/// Typed async operations over the six logical tables.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // ── cursor ──────────────────────────────────────────────────────────

    async fn load_cursor(&self, stream_id: &str) -> Result<Option<SyncCursor>, LedgerError>;

    /// Persist the cursor. `last_block` must never move backwards;
    /// implementations keep the maximum of old and new.
    async fn save_cursor(&self, stream_id: &str, last_block: u64) -> Result<(), LedgerError>;

    // ── claims ──────────────────────────────────────────────────────────

    async fn get_claim(&self, tx_hash: &str) -> Result<Option<ClaimRecord>, LedgerError>;

    /// Insert-if-absent by tx hash. Returns `true` if the row was inserted,
    /// `false` if a claim for this hash already existed (existing row is
    /// left untouched).
    async fn upsert_claim(&self, record: &ClaimRecord) -> Result<bool, LedgerError>;

    /// Atomic conditional update: set `energy_awarded = true` where
    /// `tx_hash = ?` and `energy_awarded = false`. Returns `true` iff a row
    /// was transitioned — the caller increments energy only on `true`.
    async fn try_mark_energy_awarded(&self, tx_hash: &str) -> Result<bool, LedgerError>;

    async fn count_claims(&self, address: &str) -> Result<u64, LedgerError>;

    // ── users ───────────────────────────────────────────────────────────

    async fn get_user(&self, address: &str) -> Result<Option<UserAccount>, LedgerError>;

    /// Create the account on first activity. If it already exists, the
    /// referrer is set only when previously empty — never overwritten.
    async fn ensure_user(
        &self,
        address: &str,
        referrer: Option<&str>,
    ) -> Result<UserAccount, LedgerError>;

    /// Full-row write (settlement lock/release paths).
    async fn update_user(&self, account: &UserAccount) -> Result<(), LedgerError>;

    /// Atomic `energy_total += delta`.
    async fn add_energy(&self, address: &str, delta: f64) -> Result<(), LedgerError>;

    /// Atomic `invite_count += invites, energy_total += energy_bonus`.
    async fn add_invite(
        &self,
        address: &str,
        invites: i64,
        energy_bonus: f64,
    ) -> Result<(), LedgerError>;

    // ── referral rewards ────────────────────────────────────────────────

    /// Insert-if-absent by tx hash; returns `true` if inserted.
    async fn upsert_reward(&self, record: &ReferralRewardRecord) -> Result<bool, LedgerError>;

    // ── cooldown resets ─────────────────────────────────────────────────

    /// Insert by tx hash. `false` (duplicate key) means "already processed"
    /// and gates the one-time bonus.
    async fn insert_reset(&self, record: &CooldownResetRecord) -> Result<bool, LedgerError>;

    // ── withdrawals ─────────────────────────────────────────────────────

    async fn insert_withdrawal(&self, request: &WithdrawalRequest) -> Result<(), LedgerError>;

    async fn get_withdrawal(&self, id: &str) -> Result<Option<WithdrawalRequest>, LedgerError>;

    async fn update_withdrawal(&self, request: &WithdrawalRequest) -> Result<(), LedgerError>;

    /// Newest Pending request for `address` created within `window` of now.
    async fn find_recent_pending(
        &self,
        address: &str,
        window: Duration,
    ) -> Result<Option<WithdrawalRequest>, LedgerError>;

    /// Sum of Pending + Completed withdrawal amounts for `address`. Both
    /// states count, so already-locked funds cannot be reused.
    async fn sum_withdrawn(&self, address: &str) -> Result<f64, LedgerError>;

    /// The request (if any) a payout tx hash is already attached to.
    async fn find_by_payout_tx(
        &self,
        tx_hash: &str,
    ) -> Result<Option<WithdrawalRequest>, LedgerError>;
}
