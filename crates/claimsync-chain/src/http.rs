//! HTTP JSON-RPC endpoint backed by `reqwest`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::{BlockInfo, ChainClient, RawLog, TxInfo, TxReceipt};
use crate::error::RpcError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// A single JSON-RPC endpoint with a per-request timeout.
///
/// Timeouts degrade to `RpcError::Timeout` instead of hanging; retry and
/// rotation policy belong to the callers (scanner, pool).
pub struct HttpEndpoint {
    url: String,
    http: reqwest::Client,
    timeout: Duration,
    next_id: AtomicU64,
}

impl HttpEndpoint {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Http(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            http,
            timeout,
            next_id: AtomicU64::new(1),
        })
    }

    async fn send(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);

        let resp = self.http.post(&self.url).json(&req).send().await.map_err(|e| {
            if e.is_timeout() {
                RpcError::Timeout {
                    ms: self.timeout.as_millis() as u64,
                }
            } else {
                RpcError::Http(e.to_string())
            }
        })?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(RpcError::RangeLimited(format!("HTTP 429 from {}", self.url)));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RpcError::Http(format!("HTTP {}: {body}", status.as_u16())));
        }

        let parsed: JsonRpcResponse = resp
            .json()
            .await
            .map_err(|e| RpcError::Decode(e.to_string()))?;
        parsed
            .into_result()
            .map_err(|e| RpcError::from_rpc(e.code, e.message))
    }

    fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, RpcError> {
        serde_json::from_value(value).map_err(|e| RpcError::Decode(e.to_string()))
    }

    /// `null` results (missing tx, receipt, block) map to `None`.
    fn decode_opt<T: serde::de::DeserializeOwned>(value: Value) -> Result<Option<T>, RpcError> {
        if value.is_null() {
            return Ok(None);
        }
        Self::decode(value).map(Some)
    }
}

#[async_trait]
impl ChainClient for HttpEndpoint {
    async fn block_number(&self) -> Result<u64, RpcError> {
        let v = self.send("eth_blockNumber", vec![]).await?;
        let hex = v.as_str().ok_or_else(|| RpcError::Decode("non-string block number".into()))?;
        Ok(crate::client::parse_hex_u64(hex))
    }

    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        address: &str,
        topics: &[String],
    ) -> Result<Vec<RawLog>, RpcError> {
        let mut filter = json!({
            "fromBlock": format!("0x{from:x}"),
            "toBlock": format!("0x{to:x}"),
            "address": address,
        });
        if !topics.is_empty() {
            // topic0 position, OR across signatures
            filter["topics"] = json!([topics]);
        }
        let v = self.send("eth_getLogs", vec![filter]).await?;
        Self::decode(v)
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<TxInfo>, RpcError> {
        let v = self
            .send("eth_getTransactionByHash", vec![json!(hash)])
            .await?;
        Self::decode_opt(v)
    }

    async fn get_receipt(&self, hash: &str) -> Result<Option<TxReceipt>, RpcError> {
        let v = self
            .send("eth_getTransactionReceipt", vec![json!(hash)])
            .await?;
        Self::decode_opt(v)
    }

    async fn get_block(&self, number: u64) -> Result<Option<BlockInfo>, RpcError> {
        let v = self
            .send(
                "eth_getBlockByNumber",
                vec![json!(format!("0x{number:x}")), json!(false)],
            )
            .await?;
        Self::decode_opt(v)
    }

    async fn call(&self, to: &str, data: &str) -> Result<String, RpcError> {
        let v = self
            .send(
                "eth_call",
                vec![json!({ "to": to, "data": data }), json!("latest")],
            )
            .await?;
        v.as_str()
            .map(str::to_string)
            .ok_or_else(|| RpcError::Decode("non-string eth_call result".into()))
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}
