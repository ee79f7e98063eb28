//! Interactive claim verification — the "I just claimed" path.
//!
//! Validates one user-submitted transaction synchronously, then persists
//! through the same idempotent primitives the scanner uses. Transport
//! faults are retried with backoff; validation mismatches are terminal.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use claimsync_chain::{abi, ChainClient, RpcError, TxInfo, TxReceipt};
use claimsync_core::records::{ClaimRecord, ClaimStatus};
use claimsync_core::{AppConfig, LedgerError, LedgerStore};

use crate::handlers::LedgerWriter;
use crate::map_rpc;

/// Structured verification result returned to collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimOutcome {
    pub ok: bool,
    pub tx_hash: String,
    pub amount: f64,
    pub unit: String,
    pub block_number: u64,
    pub block_time: Option<DateTime<Utc>>,
    pub duplicated: bool,
}

/// Verifies one claim transaction for its submitting caller.
pub struct ClaimVerifier {
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn LedgerStore>,
    writer: Arc<LedgerWriter>,
    config: Arc<AppConfig>,
}

impl ClaimVerifier {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn LedgerStore>,
        writer: Arc<LedgerWriter>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self { chain, store, writer, config }
    }

    pub async fn verify(&self, tx_hash: &str, caller: &str) -> Result<ClaimOutcome, LedgerError> {
        // 1. short-circuit on a known claim; the user row and the energy
        // gate still run so either path may finish the award
        if let Some(existing) = self.store.get_claim(tx_hash).await? {
            self.store
                .ensure_user(&existing.address, existing.referrer.as_deref())
                .await?;
            if self.store.try_mark_energy_awarded(tx_hash).await? {
                self.store.add_energy(&existing.address, 1.0).await?;
            }
            debug!(tx_hash, "claim already recorded; returning duplicate");
            return Ok(self.outcome(&existing, true));
        }

        // 2. the transaction itself
        let tx = self
            .with_retries(|| async { self.chain.get_transaction(tx_hash).await })
            .await?
            .ok_or_else(|| LedgerError::TxNotFound { tx_hash: tx_hash.to_string() })?;
        self.check_parties(&tx, caller)?;

        // 3. the receipt and its Claimed log
        let receipt = self
            .with_retries(|| async { self.chain.get_receipt(tx_hash).await })
            .await?
            .ok_or_else(|| LedgerError::TxNotFound { tx_hash: tx_hash.to_string() })?;
        if !receipt.succeeded() {
            return Err(LedgerError::TxFailed { tx_hash: tx_hash.to_string() });
        }
        let amount_wei = self.find_claimed_amount(&receipt, caller)?;
        let block_number = receipt.block_number_u64();

        // 4. best-effort block time
        let block_time = self.block_time(block_number).await;

        // 5. persist through the shared primitives
        let record = ClaimRecord {
            tx_hash: tx_hash.to_string(),
            address: caller.to_ascii_lowercase(),
            referrer: abi::claim_call_referrer(&tx.input),
            amount_wei: amount_wei.to_string(),
            block_number,
            block_time,
            status: ClaimStatus::Confirmed,
            energy_awarded: false,
        };
        self.writer.persist_claimed(&record).await?;
        Ok(self.outcome(&record, false))
    }

    fn check_parties(&self, tx: &TxInfo, caller: &str) -> Result<(), LedgerError> {
        let to = tx.to.as_deref().unwrap_or_default();
        if !to.eq_ignore_ascii_case(&self.config.contract_address) {
            return Err(LedgerError::ToMismatch {
                expected: self.config.contract_address.clone(),
                actual: to.to_string(),
            });
        }
        if !tx.from.eq_ignore_ascii_case(caller) {
            return Err(LedgerError::FromMismatch {
                expected: caller.to_string(),
                actual: tx.from.clone(),
            });
        }
        Ok(())
    }

    /// The receipt must hold a Claimed event under the contract address
    /// whose decoded user is the caller.
    fn find_claimed_amount(&self, receipt: &TxReceipt, caller: &str) -> Result<u128, LedgerError> {
        let claimed_topic = abi::event_topic("Claimed(address,uint256)");
        for log in &receipt.logs {
            if !log.address.eq_ignore_ascii_case(&self.config.contract_address) {
                continue;
            }
            let (Some(topic0), Some(topic1)) = (log.topics.first(), log.topics.get(1)) else {
                continue;
            };
            if !topic0.eq_ignore_ascii_case(&claimed_topic) {
                continue;
            }
            if abi::word_address(topic1).eq_ignore_ascii_case(&caller.to_ascii_lowercase()) {
                let amount = abi::data_words(&log.data)
                    .first()
                    .map(|w| abi::word_u128(w))
                    .unwrap_or(0);
                return Ok(amount);
            }
        }
        Err(LedgerError::EventNotFound {
            tx_hash: receipt.tx_hash.clone(),
        })
    }

    /// Bounded retries for transient transport faults only.
    async fn with_retries<T, F, Fut>(&self, op: F) -> Result<T, LedgerError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, RpcError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt + 1 < self.config.scan.max_attempts => {
                    attempt += 1;
                    let base = self.config.scan.backoff_base_ms;
                    let cap = self.config.scan.backoff_cap_ms;
                    let ms = base.saturating_mul(1u64 << (attempt - 1).min(16)).min(cap);
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                }
                Err(e) => return Err(map_rpc(e)),
            }
        }
    }

    async fn block_time(&self, number: u64) -> Option<DateTime<Utc>> {
        let fetched = tokio::time::timeout(Duration::from_secs(3), self.chain.get_block(number))
            .await
            .ok()?
            .ok()?;
        fetched.and_then(|b| DateTime::from_timestamp(b.timestamp_unix(), 0))
    }

    fn outcome(&self, record: &ClaimRecord, duplicated: bool) -> ClaimOutcome {
        let wei: u128 = record.amount_wei.parse().unwrap_or(0);
        ClaimOutcome {
            ok: true,
            tx_hash: record.tx_hash.clone(),
            amount: abi::wei_to_tokens(wei, self.config.settlement.token_decimals),
            unit: self.config.token_symbol.clone(),
            block_number: record.block_number,
            block_time: record.block_time,
            duplicated,
        }
    }
}
