//! The event scanner — head polling, adaptive-range log fetching, and
//! cursor advancement.
//!
//! Delivery contract: at-least-once, no-skip. Every log in a cycle is
//! decoded and persisted before the cursor advances to the fetched
//! `to` block, so a crash mid-cycle replays the same range; the handlers
//! are idempotent, so replay is harmless.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use claimsync_chain::{ChainClient, ProviderPool, RawLog};
use claimsync_core::{AppConfig, LedgerError, LedgerStore};

use crate::events::EventDecoder;
use crate::handlers::LedgerWriter;
use crate::map_rpc;

/// Best-effort block-time lookups get a short leash.
const BLOCK_TIME_TIMEOUT: Duration = Duration::from_secs(3);

/// What one scan cycle did.
#[derive(Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Safe head has not moved past the cursor.
    Empty,
    /// Fetch attempts exhausted with nothing obtained; deferred to the
    /// next poll tick.
    CooledDown,
    /// Scanned `[from, to]` and advanced the cursor to `to`.
    Advanced { from: u64, to: u64, events: usize },
}

/// Long-lived background scanner over one contract's event stream.
pub struct EventScanner {
    pool: Arc<ProviderPool>,
    store: Arc<dyn LedgerStore>,
    writer: Arc<LedgerWriter>,
    decoder: EventDecoder,
    config: Arc<AppConfig>,
    scan_topics: Vec<String>,
}

impl EventScanner {
    pub fn new(
        pool: Arc<ProviderPool>,
        store: Arc<dyn LedgerStore>,
        writer: Arc<LedgerWriter>,
        config: Arc<AppConfig>,
    ) -> Self {
        let decoder = EventDecoder::new(&config.contract_address);
        let scan_topics = decoder.topics().scan_topics();
        Self {
            pool,
            store,
            writer,
            decoder,
            config,
            scan_topics,
        }
    }

    /// Run forever at the configured poll interval. Per-cycle failures are
    /// logged and rotate the provider pool; they never stop the loop.
    pub async fn run(&self) {
        let poll = Duration::from_millis(self.config.poll_interval_ms);
        info!(
            contract = %self.config.contract_address,
            stream = %self.config.stream_id,
            poll_ms = self.config.poll_interval_ms,
            "scanner started"
        );
        loop {
            match self.tick().await {
                Ok(ScanOutcome::Advanced { from, to, events }) => {
                    info!(from, to, events, "scan cycle advanced");
                }
                Ok(ScanOutcome::CooledDown) => {
                    warn!("scan cycle cooled down; deferring to next tick");
                }
                Ok(ScanOutcome::Empty) => {
                    debug!("no new confirmed blocks");
                }
                Err(e) => {
                    warn!(error = %e, code = e.code(), "scan cycle failed; rotating provider");
                    self.pool.rotate();
                }
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// One scan cycle: `[cursor+1, head − confirmations]`.
    pub async fn tick(&self) -> Result<ScanOutcome, LedgerError> {
        let head = self.pool.block_number().await.map_err(map_rpc)?;
        let safe_head = head.saturating_sub(self.config.confirmations);

        let stream = &self.config.stream_id;
        let last = match self.store.load_cursor(stream).await? {
            Some(cursor) => cursor.last_block,
            None => {
                self.store.save_cursor(stream, self.config.start_block).await?;
                self.config.start_block
            }
        };

        let from = last + 1;
        if from > safe_head {
            return Ok(ScanOutcome::Empty);
        }

        let Some((logs, to)) = self.fetch_adaptive(from, safe_head).await? else {
            return Ok(ScanOutcome::CooledDown);
        };

        let mut block_times: HashMap<u64, Option<DateTime<Utc>>> = HashMap::new();
        let mut events = 0usize;
        for log in &logs {
            let Some((event, meta)) = self.decoder.decode(log) else {
                continue;
            };
            let block_time = match block_times.get(&meta.block_number) {
                Some(t) => *t,
                None => {
                    let t = self.block_time(meta.block_number).await;
                    block_times.insert(meta.block_number, t);
                    t
                }
            };
            self.writer.apply(&event, &meta, block_time).await?;
            events += 1;
        }

        // all logs persisted; only now may the cursor move
        self.store.save_cursor(stream, to).await?;
        Ok(ScanOutcome::Advanced { from, to, events })
    }

    /// Fetch logs starting with a span of `min(ceiling, range)` blocks.
    /// Range-limit faults halve the span (floor 1) and back off; after
    /// `max_attempts` with nothing obtained, `None` signals cool-down.
    /// Other transient faults back off once and re-raise to the loop.
    async fn fetch_adaptive(
        &self,
        from: u64,
        safe_head: u64,
    ) -> Result<Option<(Vec<RawLog>, u64)>, LedgerError> {
        let range = safe_head - from + 1;
        let mut span = self.config.scan.span_ceiling.min(range).max(1);
        let mut attempt: u32 = 0;

        loop {
            let to = safe_head.min(from + span - 1);
            match self
                .pool
                .get_logs(from, to, &self.config.contract_address, &self.scan_topics)
                .await
            {
                Ok(logs) => {
                    debug!(from, to, span, logs = logs.len(), "log fetch ok");
                    return Ok(Some((logs, to)));
                }
                Err(e) if e.is_range_limited() => {
                    attempt += 1;
                    if attempt >= self.config.scan.max_attempts {
                        warn!(from, span, attempts = attempt, error = %e, "fetch attempts exhausted");
                        return Ok(None);
                    }
                    span = (span / 2).max(1);
                    let delay = self.backoff(attempt);
                    warn!(from, span, attempt, delay_ms = delay.as_millis() as u64, error = %e,
                        "range limited; halving span");
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_retryable() => {
                    tokio::time::sleep(self.backoff(attempt + 1)).await;
                    return Err(map_rpc(e));
                }
                Err(e) => return Err(map_rpc(e)),
            }
        }
    }

    /// Exponential backoff, capped.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.config.scan.backoff_base_ms;
        let cap = self.config.scan.backoff_cap_ms;
        let ms = base.saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
        Duration::from_millis(ms.min(cap))
    }

    /// Best-effort block timestamp; a miss is tolerated as `None`.
    async fn block_time(&self, number: u64) -> Option<DateTime<Utc>> {
        let fetched = tokio::time::timeout(BLOCK_TIME_TIMEOUT, self.pool.get_block(number))
            .await
            .ok()?
            .ok()?;
        fetched.and_then(|b| DateTime::from_timestamp(b.timestamp_unix(), 0))
    }
}
