//! In-memory ledger store.
//!
//! A single mutex over all six tables makes every conditional update
//! genuinely atomic, so the engine tests exercise the same gate semantics
//! the SQLite backend provides. All data is lost when the process exits.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use claimsync_core::error::LedgerError;
use claimsync_core::records::{
    ClaimRecord, CooldownResetRecord, ReferralRewardRecord, SyncCursor, UserAccount,
    WithdrawalRequest, WithdrawalStatus,
};
use claimsync_core::store::LedgerStore;

#[derive(Default)]
struct Tables {
    cursors: HashMap<String, SyncCursor>,
    claims: HashMap<String, ClaimRecord>,
    rewards: HashMap<String, ReferralRewardRecord>,
    resets: HashMap<String, CooldownResetRecord>,
    users: HashMap<String, UserAccount>,
    withdrawals: HashMap<String, WithdrawalRequest>,
}

/// In-memory `LedgerStore` implementation.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(address: &str) -> String {
        address.to_ascii_lowercase()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn load_cursor(&self, stream_id: &str) -> Result<Option<SyncCursor>, LedgerError> {
        Ok(self.tables.lock().unwrap().cursors.get(stream_id).cloned())
    }

    async fn save_cursor(&self, stream_id: &str, last_block: u64) -> Result<(), LedgerError> {
        let mut t = self.tables.lock().unwrap();
        let entry = t.cursors.entry(stream_id.to_string()).or_insert(SyncCursor {
            stream_id: stream_id.to_string(),
            last_block: 0,
            updated_at: Utc::now(),
        });
        // monotonic: never move backwards
        if last_block > entry.last_block {
            entry.last_block = last_block;
        }
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn get_claim(&self, tx_hash: &str) -> Result<Option<ClaimRecord>, LedgerError> {
        Ok(self.tables.lock().unwrap().claims.get(tx_hash).cloned())
    }

    async fn upsert_claim(&self, record: &ClaimRecord) -> Result<bool, LedgerError> {
        let mut t = self.tables.lock().unwrap();
        if t.claims.contains_key(&record.tx_hash) {
            return Ok(false);
        }
        t.claims.insert(record.tx_hash.clone(), record.clone());
        Ok(true)
    }

    async fn try_mark_energy_awarded(&self, tx_hash: &str) -> Result<bool, LedgerError> {
        let mut t = self.tables.lock().unwrap();
        match t.claims.get_mut(tx_hash) {
            Some(claim) if !claim.energy_awarded => {
                claim.energy_awarded = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_claims(&self, address: &str) -> Result<u64, LedgerError> {
        let key = Self::key(address);
        Ok(self
            .tables
            .lock()
            .unwrap()
            .claims
            .values()
            .filter(|c| c.address.eq_ignore_ascii_case(&key))
            .count() as u64)
    }

    async fn get_user(&self, address: &str) -> Result<Option<UserAccount>, LedgerError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .users
            .get(&Self::key(address))
            .cloned())
    }

    async fn ensure_user(
        &self,
        address: &str,
        referrer: Option<&str>,
    ) -> Result<UserAccount, LedgerError> {
        let key = Self::key(address);
        let mut t = self.tables.lock().unwrap();
        let user = t.users.entry(key.clone()).or_insert_with(|| {
            UserAccount::new(key.clone(), referrer.map(Self::key), Utc::now())
        });
        if user.referrer.is_none() {
            if let Some(r) = referrer {
                user.referrer = Some(Self::key(r));
                user.updated_at = Utc::now();
            }
        }
        Ok(user.clone())
    }

    async fn update_user(&self, account: &UserAccount) -> Result<(), LedgerError> {
        let mut t = self.tables.lock().unwrap();
        t.users
            .insert(Self::key(&account.address), account.clone());
        Ok(())
    }

    async fn add_energy(&self, address: &str, delta: f64) -> Result<(), LedgerError> {
        let mut t = self.tables.lock().unwrap();
        let user = t
            .users
            .get_mut(&Self::key(address))
            .ok_or_else(|| LedgerError::UserNotFound {
                address: address.to_string(),
            })?;
        user.energy_total += delta;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn add_invite(
        &self,
        address: &str,
        invites: i64,
        energy_bonus: f64,
    ) -> Result<(), LedgerError> {
        let mut t = self.tables.lock().unwrap();
        let user = t
            .users
            .get_mut(&Self::key(address))
            .ok_or_else(|| LedgerError::UserNotFound {
                address: address.to_string(),
            })?;
        user.invite_count += invites;
        user.energy_total += energy_bonus;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn upsert_reward(&self, record: &ReferralRewardRecord) -> Result<bool, LedgerError> {
        let mut t = self.tables.lock().unwrap();
        if t.rewards.contains_key(&record.tx_hash) {
            return Ok(false);
        }
        t.rewards.insert(record.tx_hash.clone(), record.clone());
        Ok(true)
    }

    async fn insert_reset(&self, record: &CooldownResetRecord) -> Result<bool, LedgerError> {
        let mut t = self.tables.lock().unwrap();
        if t.resets.contains_key(&record.tx_hash) {
            return Ok(false);
        }
        t.resets.insert(record.tx_hash.clone(), record.clone());
        Ok(true)
    }

    async fn insert_withdrawal(&self, request: &WithdrawalRequest) -> Result<(), LedgerError> {
        let mut t = self.tables.lock().unwrap();
        if t.withdrawals.contains_key(&request.id) {
            return Err(LedgerError::Storage(format!(
                "withdrawal {} already exists",
                request.id
            )));
        }
        t.withdrawals.insert(request.id.clone(), request.clone());
        Ok(())
    }

    async fn get_withdrawal(&self, id: &str) -> Result<Option<WithdrawalRequest>, LedgerError> {
        Ok(self.tables.lock().unwrap().withdrawals.get(id).cloned())
    }

    async fn update_withdrawal(&self, request: &WithdrawalRequest) -> Result<(), LedgerError> {
        let mut t = self.tables.lock().unwrap();
        t.withdrawals.insert(request.id.clone(), request.clone());
        Ok(())
    }

    async fn find_recent_pending(
        &self,
        address: &str,
        window: Duration,
    ) -> Result<Option<WithdrawalRequest>, LedgerError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(window).unwrap_or_default();
        let key = Self::key(address);
        Ok(self
            .tables
            .lock()
            .unwrap()
            .withdrawals
            .values()
            .filter(|w| {
                w.address.eq_ignore_ascii_case(&key)
                    && w.status == WithdrawalStatus::Pending
                    && w.created_at >= cutoff
            })
            .max_by_key(|w| w.created_at)
            .cloned())
    }

    async fn sum_withdrawn(&self, address: &str) -> Result<f64, LedgerError> {
        let key = Self::key(address);
        Ok(self
            .tables
            .lock()
            .unwrap()
            .withdrawals
            .values()
            .filter(|w| {
                w.address.eq_ignore_ascii_case(&key)
                    && matches!(
                        w.status,
                        WithdrawalStatus::Pending | WithdrawalStatus::Completed
                    )
            })
            .map(|w| w.amount)
            .sum())
    }

    async fn find_by_payout_tx(
        &self,
        tx_hash: &str,
    ) -> Result<Option<WithdrawalRequest>, LedgerError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .withdrawals
            .values()
            .find(|w| w.payout_tx_hash.as_deref() == Some(tx_hash))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimsync_core::records::ClaimStatus;

    fn claim(tx: &str, address: &str) -> ClaimRecord {
        ClaimRecord {
            tx_hash: tx.into(),
            address: address.into(),
            referrer: None,
            amount_wei: "1000".into(),
            block_number: 10,
            block_time: None,
            status: ClaimStatus::Confirmed,
            energy_awarded: false,
        }
    }

    #[tokio::test]
    async fn claim_insert_is_idempotent() {
        let store = MemoryStore::new();
        assert!(store.upsert_claim(&claim("0x1", "0xu")).await.unwrap());
        assert!(!store.upsert_claim(&claim("0x1", "0xu")).await.unwrap());
        assert_eq!(store.count_claims("0xu").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn energy_gate_transitions_once() {
        let store = MemoryStore::new();
        store.upsert_claim(&claim("0x1", "0xu")).await.unwrap();
        assert!(store.try_mark_energy_awarded("0x1").await.unwrap());
        assert!(!store.try_mark_energy_awarded("0x1").await.unwrap());
        assert!(!store.try_mark_energy_awarded("0xmissing").await.unwrap());
    }

    #[tokio::test]
    async fn cursor_never_moves_backwards() {
        let store = MemoryStore::new();
        store.save_cursor("claims", 988).await.unwrap();
        store.save_cursor("claims", 900).await.unwrap();
        let cursor = store.load_cursor("claims").await.unwrap().unwrap();
        assert_eq!(cursor.last_block, 988);
    }

    #[tokio::test]
    async fn referrer_set_once_never_overwritten() {
        let store = MemoryStore::new();
        store.ensure_user("0xU", None).await.unwrap();
        let u = store.ensure_user("0xU", Some("0xR1")).await.unwrap();
        assert_eq!(u.referrer.as_deref(), Some("0xr1"));
        let u = store.ensure_user("0xU", Some("0xR2")).await.unwrap();
        assert_eq!(u.referrer.as_deref(), Some("0xr1"));
    }

    #[tokio::test]
    async fn reset_insert_gates_duplicates() {
        let store = MemoryStore::new();
        let reset = CooldownResetRecord {
            tx_hash: "0x9".into(),
            referrer: "0xr".into(),
            block_number: 5,
            block_time: None,
        };
        assert!(store.insert_reset(&reset).await.unwrap());
        assert!(!store.insert_reset(&reset).await.unwrap());
    }

    #[tokio::test]
    async fn sum_withdrawn_counts_pending_and_completed() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for (id, status, amount) in [
            ("a", WithdrawalStatus::Pending, 10.0),
            ("b", WithdrawalStatus::Completed, 20.0),
            ("c", WithdrawalStatus::Rejected, 40.0),
        ] {
            store
                .insert_withdrawal(&WithdrawalRequest {
                    id: id.into(),
                    address: "0xu".into(),
                    amount,
                    status,
                    energy_locked_amount: 0.0,
                    payout_tx_hash: None,
                    created_at: now,
                    updated_at: now,
                })
                .await
                .unwrap();
        }
        assert_eq!(store.sum_withdrawn("0xU").await.unwrap(), 30.0);
    }
}
