//! Shared test fixtures: a scriptable mock chain client and config/log
//! builders.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use claimsync_chain::abi;
use claimsync_chain::{BlockInfo, ChainClient, RawLog, RpcError, TxInfo, TxReceipt};
use claimsync_core::AppConfig;

pub const CONTRACT: &str = "0xc0ffee254729296a45a3885639ac7e10f9d54979";
pub const TOKEN: &str = "0x70ce000000000000000000000000000000000001";
pub const PAYOUT: &str = "0xad31000000000000000000000000000000000002";
pub const USER: &str = "0x11223344556677889900aabbccddeeff00112233";
pub const REFERRER: &str = "0x9988776655443322110000ffeeddccbbaa998877";

/// Scriptable `ChainClient`: log fetches pop a queued response and record
/// the requested range; tx/receipt lookups read from maps.
#[derive(Default)]
pub struct MockChain {
    pub head: u64,
    pub log_responses: Mutex<VecDeque<Result<Vec<RawLog>, RpcError>>>,
    pub log_calls: Mutex<Vec<(u64, u64)>>,
    pub txs: Mutex<HashMap<String, TxInfo>>,
    pub receipts: Mutex<HashMap<String, TxReceipt>>,
    pub balance_wei: Mutex<u128>,
}

impl MockChain {
    pub fn with_head(head: u64) -> Self {
        Self {
            head,
            ..Default::default()
        }
    }

    pub fn push_logs(&self, response: Result<Vec<RawLog>, RpcError>) {
        self.log_responses.lock().unwrap().push_back(response);
    }

    pub fn add_tx(&self, tx: TxInfo) {
        self.txs.lock().unwrap().insert(tx.hash.clone(), tx);
    }

    pub fn add_receipt(&self, receipt: TxReceipt) {
        self.receipts
            .lock()
            .unwrap()
            .insert(receipt.tx_hash.clone(), receipt);
    }

    pub fn set_balance(&self, wei: u128) {
        *self.balance_wei.lock().unwrap() = wei;
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn block_number(&self) -> Result<u64, RpcError> {
        Ok(self.head)
    }

    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        _address: &str,
        _topics: &[String],
    ) -> Result<Vec<RawLog>, RpcError> {
        self.log_calls.lock().unwrap().push((from, to));
        self.log_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(vec![]))
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<TxInfo>, RpcError> {
        Ok(self.txs.lock().unwrap().get(hash).cloned())
    }

    async fn get_receipt(&self, hash: &str) -> Result<Option<TxReceipt>, RpcError> {
        Ok(self.receipts.lock().unwrap().get(hash).cloned())
    }

    async fn get_block(&self, _number: u64) -> Result<Option<BlockInfo>, RpcError> {
        Ok(None)
    }

    async fn call(&self, _to: &str, _data: &str) -> Result<String, RpcError> {
        Ok(format!("0x{:064x}", *self.balance_wei.lock().unwrap()))
    }

    fn endpoint(&self) -> &str {
        "mock"
    }
}

/// Config with fast backoff so retry paths run in milliseconds.
pub fn test_config() -> Arc<AppConfig> {
    Arc::new(
        serde_json::from_value(serde_json::json!({
            "rpc_urls": ["mock"],
            "contract_address": CONTRACT,
            "token_address": TOKEN,
            "payout_address": PAYOUT,
            "token_symbol": "CLM",
            "confirmations": 12,
            "start_block": 900,
            "scan": {
                "span_ceiling": 1000,
                "max_attempts": 3,
                "backoff_base_ms": 1,
                "backoff_cap_ms": 5,
            },
            "settlement": {
                "unit_price": 1.0,
                "energy_multiplier": 10.0,
                "referral_energy_bonus": 5.0,
                "pipeline_energy_bonus": 0.5,
                "cooldown_energy_bonus": 10.0,
            },
        }))
        .unwrap(),
    )
}

fn padded_topic(address: &str) -> String {
    format!("0x{:0>64}", address.trim_start_matches("0x"))
}

pub fn claimed_log(user: &str, amount_wei: u128, block: u64, tx_hash: &str) -> RawLog {
    serde_json::from_value(serde_json::json!({
        "address": CONTRACT,
        "topics": [
            abi::event_topic("Claimed(address,uint256)"),
            padded_topic(user),
        ],
        "data": format!("0x{amount_wei:064x}"),
        "blockNumber": format!("0x{block:x}"),
        "transactionHash": tx_hash,
        "logIndex": "0x0",
    }))
    .unwrap()
}

pub fn cooldown_log(referrer: &str, block: u64, tx_hash: &str) -> RawLog {
    serde_json::from_value(serde_json::json!({
        "address": CONTRACT,
        "topics": [
            abi::event_topic("CooldownReset(address)"),
            padded_topic(referrer),
        ],
        "data": "0x",
        "blockNumber": format!("0x{block:x}"),
        "transactionHash": tx_hash,
        "logIndex": "0x0",
    }))
    .unwrap()
}

pub fn transfer_log(from: &str, to: &str, amount_wei: u128) -> RawLog {
    serde_json::from_value(serde_json::json!({
        "address": TOKEN,
        "topics": [
            abi::event_topic("Transfer(address,address,uint256)"),
            padded_topic(from),
            padded_topic(to),
        ],
        "data": format!("0x{amount_wei:064x}"),
        "blockNumber": "0x400",
        "transactionHash": "0xpayout",
        "logIndex": "0x0",
    }))
    .unwrap()
}

/// A claim(referrer) transaction from `from` to the contract.
pub fn claim_tx(tx_hash: &str, from: &str, referrer: &str) -> TxInfo {
    serde_json::from_value(serde_json::json!({
        "hash": tx_hash,
        "from": from,
        "to": CONTRACT,
        "input": format!(
            "{}{:0>64}",
            abi::selector("claim(address)"),
            referrer.trim_start_matches("0x"),
        ),
        "blockNumber": "0x3b6",
    }))
    .unwrap()
}

pub fn receipt_with(tx_hash: &str, block: u64, logs: Vec<RawLog>) -> TxReceipt {
    serde_json::from_value(serde_json::json!({
        "transactionHash": tx_hash,
        "status": "0x1",
        "blockNumber": format!("0x{block:x}"),
        "logs": serde_json::to_value(logs).unwrap(),
    }))
    .unwrap()
}
