//! The `ChainClient` trait and the EVM response shapes it returns.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RpcError;

/// Parse a hex quantity (with or without `0x`) to u64.
pub fn parse_hex_u64(s: &str) -> u64 {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).unwrap_or(0)
}

/// Parse a hex quantity to u128 (wei amounts exceed u64).
pub fn parse_hex_u128(s: &str) -> u128 {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u128::from_str_radix(s, 16).unwrap_or(0)
}

/// A raw EVM log as returned by `eth_getLogs` / receipt logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "blockNumber", default)]
    pub block_number: Option<String>,
    #[serde(rename = "transactionHash", default)]
    pub tx_hash: Option<String>,
    #[serde(rename = "logIndex", default)]
    pub log_index: Option<String>,
    #[serde(default)]
    pub removed: Option<bool>,
}

impl RawLog {
    pub fn block_number_u64(&self) -> u64 {
        self.block_number.as_deref().map(parse_hex_u64).unwrap_or(0)
    }

    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }
}

/// A transaction as returned by `eth_getTransactionByHash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxInfo {
    pub hash: String,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    pub input: String,
    #[serde(rename = "blockNumber", default)]
    pub block_number: Option<String>,
}

impl TxInfo {
    pub fn block_number_u64(&self) -> u64 {
        self.block_number.as_deref().map(parse_hex_u64).unwrap_or(0)
    }
}

/// A receipt as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxReceipt {
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "blockNumber", default)]
    pub block_number: Option<String>,
    #[serde(default)]
    pub logs: Vec<RawLog>,
}

impl TxReceipt {
    /// Returns `true` if the transaction executed successfully.
    pub fn succeeded(&self) -> bool {
        self.status.as_deref().map(parse_hex_u64) == Some(1)
    }

    pub fn block_number_u64(&self) -> u64 {
        self.block_number.as_deref().map(parse_hex_u64).unwrap_or(0)
    }
}

/// The slice of a block header the engine needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockInfo {
    pub number: String,
    pub timestamp: String,
}

impl BlockInfo {
    pub fn timestamp_unix(&self) -> i64 {
        parse_hex_u64(&self.timestamp) as i64
    }
}

/// Async JSON-RPC chain access. Object-safe; held as `Arc<dyn ChainClient>`.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current chain head block number.
    async fn block_number(&self) -> Result<u64, RpcError>;

    /// Logs under `address` in `[from, to]` matching any of `topics` as
    /// topic0 (empty = all events).
    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        address: &str,
        topics: &[String],
    ) -> Result<Vec<RawLog>, RpcError>;

    async fn get_transaction(&self, hash: &str) -> Result<Option<TxInfo>, RpcError>;

    async fn get_receipt(&self, hash: &str) -> Result<Option<TxReceipt>, RpcError>;

    async fn get_block(&self, number: u64) -> Result<Option<BlockInfo>, RpcError>;

    /// `eth_call` against `to` with ABI-encoded `data`; returns hex output.
    async fn call(&self, to: &str, data: &str) -> Result<String, RpcError>;

    /// Identifier for logs (endpoint URL).
    fn endpoint(&self) -> &str;
}
