//! Manual reindexer — repairs one missed transaction on demand.
//!
//! Reuses the scanner's decode/persist path but never reads or advances
//! the sync cursor; the unique-key upserts absorb any overlap with work
//! the scanner already did.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use claimsync_chain::ChainClient;
use claimsync_core::{AppConfig, LedgerError};

use crate::events::EventDecoder;
use crate::handlers::LedgerWriter;
use crate::map_rpc;

/// Per-event-type outcome of a reindex run.
#[derive(Debug, Clone, Serialize)]
pub struct ReindexEntry {
    pub event: &'static str,
    pub tx_hash: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Structured reindex result.
#[derive(Debug, Serialize)]
pub struct ReindexReport {
    pub success: bool,
    pub message: String,
    pub results: Vec<ReindexEntry>,
}

impl ReindexReport {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            results: vec![],
        }
    }
}

/// Repairs a single transaction outside the cursor.
pub struct Reindexer {
    chain: Arc<dyn ChainClient>,
    writer: Arc<LedgerWriter>,
    decoder: EventDecoder,
}

impl Reindexer {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        writer: Arc<LedgerWriter>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            chain,
            writer,
            decoder: EventDecoder::new(&config.contract_address),
        }
    }

    /// Decode and persist every recognized event in `tx_hash`. A tx with
    /// none of the recognized signatures is a reported failure, not an
    /// error.
    pub async fn reindex(&self, tx_hash: &str) -> Result<ReindexReport, LedgerError> {
        let receipt = match self.chain.get_receipt(tx_hash).await.map_err(map_rpc)? {
            Some(r) => r,
            None => return Ok(ReindexReport::failed("transaction receipt not found")),
        };
        if !receipt.succeeded() {
            return Ok(ReindexReport::failed("transaction reverted"));
        }

        let decoded: Vec<_> = receipt
            .logs
            .iter()
            .filter_map(|log| self.decoder.decode(log))
            .collect();
        if decoded.is_empty() {
            return Ok(ReindexReport::failed(
                "no recognized contract events in transaction",
            ));
        }

        let block_time = self.block_time(receipt.block_number_u64()).await;
        let mut results = Vec::with_capacity(decoded.len());
        for (event, meta) in &decoded {
            let entry = match self.writer.apply(event, meta, block_time).await {
                Ok(()) => ReindexEntry {
                    event: event.kind(),
                    tx_hash: meta.tx_hash.clone(),
                    ok: true,
                    detail: None,
                },
                Err(e) => {
                    warn!(tx_hash, event = event.kind(), error = %e, "reindex entry failed");
                    ReindexEntry {
                        event: event.kind(),
                        tx_hash: meta.tx_hash.clone(),
                        ok: false,
                        detail: Some(e.to_string()),
                    }
                }
            };
            results.push(entry);
        }

        let success = results.iter().all(|r| r.ok);
        info!(tx_hash, events = results.len(), success, "reindex complete");
        Ok(ReindexReport {
            success,
            message: if success {
                format!("reindexed {} event(s)", results.len())
            } else {
                "one or more events failed to persist".into()
            },
            results,
        })
    }

    async fn block_time(&self, number: u64) -> Option<DateTime<Utc>> {
        let fetched = tokio::time::timeout(Duration::from_secs(3), self.chain.get_block(number))
            .await
            .ok()?
            .ok()?;
        fetched.and_then(|b| DateTime::from_timestamp(b.timestamp_unix(), 0))
    }
}
