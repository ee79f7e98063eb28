//! Idempotent per-event-type persistence.
//!
//! Both the batch scanner and the interactive verifier go through
//! `LedgerWriter`, since a user may first appear via either path. Every
//! method tolerates replay: claim rows are keyed by tx hash, the energy
//! award goes through the store's conditional-update gate, and referrer
//! bonuses are granted only by the write that actually inserted the claim.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use claimsync_chain::{abi, ChainClient};
use claimsync_core::records::{
    ClaimRecord, ClaimStatus, CooldownResetRecord, ReferralRewardRecord,
};
use claimsync_core::{AppConfig, LedgerError, LedgerStore};

use crate::events::{ContractEvent, LogMeta};
use crate::map_rpc;

/// Applies decoded contract events to the ledger.
pub struct LedgerWriter {
    store: Arc<dyn LedgerStore>,
    chain: Arc<dyn ChainClient>,
    config: Arc<AppConfig>,
}

impl LedgerWriter {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        chain: Arc<dyn ChainClient>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self { store, chain, config }
    }

    /// Dispatch one decoded event.
    pub async fn apply(
        &self,
        event: &ContractEvent,
        meta: &LogMeta,
        block_time: Option<DateTime<Utc>>,
    ) -> Result<(), LedgerError> {
        match event {
            ContractEvent::Claimed { user, amount_wei } => {
                self.handle_claimed(user, *amount_wei, meta, block_time).await
            }
            ContractEvent::ReferralReward { referrer, amount_wei } => {
                self.handle_referral_reward(referrer, *amount_wei, meta, block_time)
                    .await
            }
            ContractEvent::CooldownReset { referrer } => {
                self.handle_cooldown_reset(referrer, meta, block_time).await
            }
        }
    }

    async fn handle_claimed(
        &self,
        user: &str,
        amount_wei: u128,
        meta: &LogMeta,
        block_time: Option<DateTime<Utc>>,
    ) -> Result<(), LedgerError> {
        let referrer = self.fetch_referrer(&meta.tx_hash).await?;
        let record = ClaimRecord {
            tx_hash: meta.tx_hash.clone(),
            address: user.to_ascii_lowercase(),
            referrer,
            amount_wei: amount_wei.to_string(),
            block_number: meta.block_number,
            block_time,
            status: ClaimStatus::Confirmed,
            energy_awarded: false,
        };
        self.persist_claimed(&record).await?;
        Ok(())
    }

    /// The shared claim primitive: upsert the claim row, ensure the user
    /// row, run the energy-award gate, and grant referrer bonuses exactly
    /// once (the write that inserted the row owns them). Returns whether
    /// this call inserted the claim.
    pub async fn persist_claimed(&self, record: &ClaimRecord) -> Result<bool, LedgerError> {
        let inserted = self.store.upsert_claim(record).await?;
        self.store
            .ensure_user(&record.address, record.referrer.as_deref())
            .await?;

        // exactly one energy unit per tx hash, whichever path gets here first
        if self.store.try_mark_energy_awarded(&record.tx_hash).await? {
            self.store.add_energy(&record.address, 1.0).await?;
            debug!(tx_hash = %record.tx_hash, user = %record.address, "energy awarded");
        }

        if inserted {
            if let Some(referrer) = &record.referrer {
                self.store.ensure_user(referrer, None).await?;
                let first_claim = self.store.count_claims(&record.address).await? == 1;
                if first_claim {
                    self.store
                        .add_invite(referrer, 1, self.config.settlement.referral_energy_bonus)
                        .await?;
                    info!(referrer = %referrer, user = %record.address, "first-claim invite granted");
                }
                self.store
                    .add_energy(referrer, self.config.settlement.pipeline_energy_bonus)
                    .await?;
            }
        }
        Ok(inserted)
    }

    async fn handle_referral_reward(
        &self,
        referrer: &str,
        amount_wei: u128,
        meta: &LogMeta,
        block_time: Option<DateTime<Utc>>,
    ) -> Result<(), LedgerError> {
        let record = ReferralRewardRecord {
            tx_hash: meta.tx_hash.clone(),
            referrer: referrer.to_ascii_lowercase(),
            amount_wei: amount_wei.to_string(),
            block_number: meta.block_number,
            block_time,
        };
        self.store.ensure_user(referrer, None).await?;
        // purely additive; totals are aggregated on read
        let inserted = self.store.upsert_reward(&record).await?;
        if !inserted {
            debug!(tx_hash = %meta.tx_hash, "referral reward already recorded");
        }
        Ok(())
    }

    async fn handle_cooldown_reset(
        &self,
        referrer: &str,
        meta: &LogMeta,
        block_time: Option<DateTime<Utc>>,
    ) -> Result<(), LedgerError> {
        let record = CooldownResetRecord {
            tx_hash: meta.tx_hash.clone(),
            referrer: referrer.to_ascii_lowercase(),
            block_number: meta.block_number,
            block_time,
        };
        // the insert itself is the idempotency gate for the one-time bonus
        if self.store.insert_reset(&record).await? {
            self.store.ensure_user(referrer, None).await?;
            self.store
                .add_invite(referrer, 1, self.config.settlement.cooldown_energy_bonus)
                .await?;
        } else {
            debug!(tx_hash = %meta.tx_hash, "cooldown reset already processed");
        }
        Ok(())
    }

    /// Referrer comes from the originating transaction's call data, not the
    /// event. A pruned/missing tx decodes to no referrer; transport faults
    /// propagate so the cycle retries.
    async fn fetch_referrer(&self, tx_hash: &str) -> Result<Option<String>, LedgerError> {
        let tx = self.chain.get_transaction(tx_hash).await.map_err(map_rpc)?;
        Ok(tx.and_then(|t| abi::claim_call_referrer(&t.input)))
    }
}
