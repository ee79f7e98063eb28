//! Settlement engine — lazy earnings accrual, withdrawal locks, payout
//! verification, and balance mutation.
//!
//! One accrual function (`settle_account`) backs every reading and writing
//! path, so displayed and withdrawable balances can never diverge.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use claimsync_chain::{abi, ChainClient};
use claimsync_core::records::{UserAccount, WithdrawalRequest, WithdrawalStatus};
use claimsync_core::{AppConfig, LedgerError, LedgerStore};

use crate::map_rpc;

/// Amounts equal up to float noise from decimal conversion.
const AMOUNT_EPSILON: f64 = 1e-9;

/// Read-path snapshot of an account, freshly settled.
#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub address: String,
    pub credit_total: f64,
    pub available_credit: f64,
    pub energy_total: f64,
    pub available_energy: f64,
    pub invite_count: i64,
}

/// Structured result of the withdrawal operations.
#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalOutcome {
    pub ok: bool,
    pub id: String,
    pub status: WithdrawalStatus,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_tx_hash: Option<String>,
}

impl WithdrawalOutcome {
    fn from_request(request: &WithdrawalRequest) -> Self {
        Self {
            ok: true,
            id: request.id.clone(),
            status: request.status,
            amount: request.amount,
            payout_tx_hash: request.payout_tx_hash.clone(),
        }
    }
}

/// Computes accrued earnings and drives the withdrawal lifecycle.
pub struct SettlementEngine {
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn LedgerStore>,
    config: Arc<AppConfig>,
}

impl SettlementEngine {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn LedgerStore>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self { chain, store, config }
    }

    /// Current on-chain token balance of `address`, in display units.
    async fn token_balance(&self, address: &str) -> Result<f64, LedgerError> {
        let data = abi::balance_of_call(address);
        let output = self
            .chain
            .call(&self.config.token_address, &data)
            .await
            .map_err(map_rpc)?;
        Ok(abi::wei_to_tokens(
            abi::word_u128(&output),
            self.config.settlement.token_decimals,
        ))
    }

    /// The canonical accrual: credit earned since `last_settlement` =
    /// balance × unit price × tier daily rate × elapsed days, added to the
    /// stored total. Negative elapsed clamps to zero.
    async fn settle_account(
        &self,
        account: &UserAccount,
        now: DateTime<Utc>,
    ) -> Result<f64, LedgerError> {
        let balance = self.token_balance(&account.address).await?;
        let rate = self.config.settlement.daily_rate(balance);
        let elapsed_days =
            (now - account.last_settlement).num_seconds().max(0) as f64 / 86_400.0;
        let earned = balance * self.config.settlement.unit_price * rate * elapsed_days;
        Ok(account.credit_total + earned)
    }

    /// Read path. Same formula as the withdrawal path; no mutation.
    pub async fn preview(&self, address: &str) -> Result<AccountView, LedgerError> {
        let account = self
            .store
            .get_user(address)
            .await?
            .ok_or_else(|| LedgerError::UserNotFound { address: address.to_string() })?;
        let settled = self.settle_account(&account, Utc::now()).await?;
        let withdrawn = self.store.sum_withdrawn(address).await?;
        Ok(AccountView {
            address: account.address.clone(),
            credit_total: settled,
            available_credit: (settled - withdrawn).max(0.0),
            energy_total: account.energy_total,
            available_energy: account.available_energy(),
            invite_count: account.invite_count,
        })
    }

    /// Withdrawal request protocol: settle, check credit then energy,
    /// dedup recent Pending, lock, insert.
    pub async fn request_withdrawal(
        &self,
        address: &str,
        amount: f64,
    ) -> Result<WithdrawalOutcome, LedgerError> {
        let mut account = self
            .store
            .get_user(address)
            .await?
            .ok_or_else(|| LedgerError::UserNotFound { address: address.to_string() })?;

        let now = Utc::now();
        let settled_total = self.settle_account(&account, now).await?;
        // Pending and Completed both count: already-locked funds are not
        // reusable
        let withdrawn = self.store.sum_withdrawn(address).await?;
        let available = (settled_total - withdrawn).max(0.0);
        if !(amount > 0.0) || amount > available {
            return Err(LedgerError::CreditNotEnough { requested: amount, available });
        }

        let required_energy = amount * self.config.settlement.energy_multiplier;
        if account.available_energy() < required_energy {
            return Err(LedgerError::EnergyNotEnough {
                required: required_energy,
                available: account.available_energy(),
            });
        }

        let window = Duration::from_secs(self.config.settlement.dedup_window_secs);
        if let Some(existing) = self.store.find_recent_pending(address, window).await? {
            info!(address, id = %existing.id, "recent pending request returned in place of a new one");
            return Ok(WithdrawalOutcome::from_request(&existing));
        }

        // lock resources under the freshly settled total
        let prior = account.clone();
        account.credit_total = settled_total;
        account.credit_locked += amount;
        account.energy_locked += required_energy;
        account.last_settlement = now;
        account.updated_at = now;
        self.store.update_user(&account).await?;

        let request = WithdrawalRequest {
            id: uuid::Uuid::new_v4().to_string(),
            address: account.address.clone(),
            amount,
            status: WithdrawalStatus::Pending,
            energy_locked_amount: required_energy,
            payout_tx_hash: None,
            created_at: now,
            updated_at: now,
        };
        if let Err(e) = self.store.insert_withdrawal(&request).await {
            // compensating write; not a true transaction, the window is
            // documented
            warn!(address, error = %e, "withdrawal insert failed; restoring prior balances");
            if let Err(restore) = self.store.update_user(&prior).await {
                error!(address, error = %restore, "compensating restore failed");
            }
            return Err(e);
        }

        info!(address, id = %request.id, amount, required_energy, "withdrawal requested");
        Ok(WithdrawalOutcome::from_request(&request))
    }

    /// Completion protocol: verify the payout on-chain, then debit totals
    /// and release locks. Completed requests are idempotently re-returned.
    pub async fn complete_withdrawal(
        &self,
        id: &str,
        payout_tx_hash: &str,
    ) -> Result<WithdrawalOutcome, LedgerError> {
        let mut request = self
            .store
            .get_withdrawal(id)
            .await?
            .ok_or_else(|| LedgerError::WithdrawalNotFound { id: id.to_string() })?;

        match request.status {
            WithdrawalStatus::Completed => {
                return Ok(WithdrawalOutcome::from_request(&request));
            }
            WithdrawalStatus::Pending => {}
            other => {
                return Err(LedgerError::InvalidWithdrawalState {
                    id: id.to_string(),
                    status: other.to_string(),
                });
            }
        }

        // anti-replay: one payout hash completes at most one request
        if let Some(other) = self.store.find_by_payout_tx(payout_tx_hash).await? {
            if other.id != request.id {
                return Err(LedgerError::PayoutHashReused {
                    tx_hash: payout_tx_hash.to_string(),
                    other_id: other.id,
                });
            }
        }

        self.verify_payout(payout_tx_hash, &request).await?;

        let mut account = self
            .store
            .get_user(&request.address)
            .await?
            .ok_or_else(|| LedgerError::UserNotFound {
                address: request.address.clone(),
            })?;
        account.energy_total = (account.energy_total - request.energy_locked_amount).max(0.0);
        account.energy_locked = (account.energy_locked - request.energy_locked_amount).max(0.0);
        account.credit_total = (account.credit_total - request.amount).max(0.0);
        account.credit_locked = (account.credit_locked - request.amount).max(0.0);
        account.updated_at = Utc::now();
        self.store.update_user(&account).await?;

        request.status = WithdrawalStatus::Completed;
        request.payout_tx_hash = Some(payout_tx_hash.to_string());
        request.updated_at = Utc::now();
        self.store.update_withdrawal(&request).await?;

        info!(id, payout_tx_hash, amount = request.amount, "withdrawal completed");
        Ok(WithdrawalOutcome::from_request(&request))
    }

    /// Rejection protocol: release locks, totals untouched.
    pub async fn reject_withdrawal(&self, id: &str) -> Result<WithdrawalOutcome, LedgerError> {
        let mut request = self
            .store
            .get_withdrawal(id)
            .await?
            .ok_or_else(|| LedgerError::WithdrawalNotFound { id: id.to_string() })?;

        match request.status {
            WithdrawalStatus::Rejected => {
                return Ok(WithdrawalOutcome::from_request(&request));
            }
            WithdrawalStatus::Pending => {}
            other => {
                return Err(LedgerError::InvalidWithdrawalState {
                    id: id.to_string(),
                    status: other.to_string(),
                });
            }
        }

        let mut account = self
            .store
            .get_user(&request.address)
            .await?
            .ok_or_else(|| LedgerError::UserNotFound {
                address: request.address.clone(),
            })?;
        account.energy_locked = (account.energy_locked - request.energy_locked_amount).max(0.0);
        account.credit_locked = (account.credit_locked - request.amount).max(0.0);
        account.updated_at = Utc::now();
        self.store.update_user(&account).await?;

        request.status = WithdrawalStatus::Rejected;
        request.updated_at = Utc::now();
        self.store.update_withdrawal(&request).await?;

        info!(id, amount = request.amount, "withdrawal rejected; locks released");
        Ok(WithdrawalOutcome::from_request(&request))
    }

    /// The payout tx must have succeeded and carry a token Transfer from
    /// the configured payout address to the requester for exactly the
    /// requested amount.
    async fn verify_payout(
        &self,
        payout_tx_hash: &str,
        request: &WithdrawalRequest,
    ) -> Result<(), LedgerError> {
        let receipt = self
            .chain
            .get_receipt(payout_tx_hash)
            .await
            .map_err(map_rpc)?
            .ok_or_else(|| LedgerError::TxNotFound {
                tx_hash: payout_tx_hash.to_string(),
            })?;
        if !receipt.succeeded() {
            return Err(LedgerError::TxFailed {
                tx_hash: payout_tx_hash.to_string(),
            });
        }

        let transfer_topic = abi::event_topic("Transfer(address,address,uint256)");
        for log in &receipt.logs {
            if !log.address.eq_ignore_ascii_case(&self.config.token_address) {
                continue;
            }
            let (Some(t0), Some(t1), Some(t2)) =
                (log.topics.first(), log.topics.get(1), log.topics.get(2))
            else {
                continue;
            };
            if !t0.eq_ignore_ascii_case(&transfer_topic) {
                continue;
            }
            let from = abi::word_address(t1);
            let to = abi::word_address(t2);
            if !from.eq_ignore_ascii_case(&self.config.payout_address)
                || !to.eq_ignore_ascii_case(&request.address)
            {
                continue;
            }
            let wei = abi::data_words(&log.data)
                .first()
                .map(|w| abi::word_u128(w))
                .unwrap_or(0);
            let tokens = abi::wei_to_tokens(wei, self.config.settlement.token_decimals);
            if (tokens - request.amount).abs() < AMOUNT_EPSILON {
                return Ok(());
            }
            return Err(LedgerError::TransferMismatch {
                reason: format!(
                    "transfer of {tokens} does not match requested {}",
                    request.amount
                ),
            });
        }
        Err(LedgerError::TransferMismatch {
            reason: format!(
                "no transfer from {} to {} in payout tx",
                self.config.payout_address, request.address
            ),
        })
    }
}
