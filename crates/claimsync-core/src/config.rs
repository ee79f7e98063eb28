//! Configuration tree, deserialized from a JSON config file.

use serde::{Deserialize, Serialize};

/// Top-level configuration shared by the scanner, verifier, and settlement
/// engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// JSON-RPC endpoints, in rotation order.
    pub rpc_urls: Vec<String>,
    /// The claim contract emitting Claimed / ReferralReward / CooldownReset.
    pub contract_address: String,
    /// ERC-20 token contract used for balances and payout transfers.
    pub token_address: String,
    /// Admin address expected as the sender of payout transfers.
    pub payout_address: String,
    /// Display symbol for claim amounts.
    #[serde(default = "default_token_symbol")]
    pub token_symbol: String,
    /// Reorg safety margin: head minus this many blocks is the safe head.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// First block to scan when no cursor exists yet.
    #[serde(default)]
    pub start_block: u64,
    /// Cursor stream identifier.
    #[serde(default = "default_stream_id")]
    pub stream_id: String,
    /// Scanner poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub scan: ScanConfig,
    pub settlement: SettlementConfig,
}

fn default_token_symbol() -> String { "TOKEN".into() }
fn default_confirmations() -> u64 { 12 }
fn default_stream_id() -> String { "claims".into() }
fn default_poll_interval_ms() -> u64 { 5_000 }

/// Log-fetch and retry knobs for the scanner and interactive paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Upper bound on blocks per `eth_getLogs` call; shrinks adaptively.
    #[serde(default = "default_span_ceiling")]
    pub span_ceiling: u64,
    /// Attempts per fetch before the cycle cools down.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Initial backoff between attempts, milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Backoff cap, milliseconds.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// Per-attempt RPC timeout, milliseconds.
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
}

fn default_span_ceiling() -> u64 { 1_000 }
fn default_max_attempts() -> u32 { 5 }
fn default_backoff_base_ms() -> u64 { 2_000 }
fn default_backoff_cap_ms() -> u64 { 60_000 }
fn default_rpc_timeout_ms() -> u64 { 15_000 }

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            span_ceiling: default_span_ceiling(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
        }
    }
}

/// A balance band mapped to a daily accrual rate. Bands are ordered by
/// `min_balance` ascending; the highest qualifying band wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierBand {
    pub min_balance: f64,
    pub daily_rate: f64,
}

/// Settlement-engine constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Stablecoin price per token for earnings accrual.
    pub unit_price: f64,
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u32,
    /// Energy required per unit of withdrawn credit.
    #[serde(default = "default_energy_multiplier")]
    pub energy_multiplier: f64,
    /// Pending-request dedup window, seconds.
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    /// Referrer energy bonus on a claimant's first-ever claim.
    #[serde(default = "default_referral_energy_bonus")]
    pub referral_energy_bonus: f64,
    /// Flat referrer energy bonus on every claim.
    #[serde(default = "default_pipeline_energy_bonus")]
    pub pipeline_energy_bonus: f64,
    /// Referrer energy bonus on a cooldown reset.
    #[serde(default = "default_cooldown_energy_bonus")]
    pub cooldown_energy_bonus: f64,
    /// Ordered (ascending `min_balance`) tier table.
    #[serde(default)]
    pub tiers: Vec<TierBand>,
}

fn default_token_decimals() -> u32 { 18 }
fn default_energy_multiplier() -> f64 { 10.0 }
fn default_dedup_window_secs() -> u64 { 300 }
fn default_referral_energy_bonus() -> f64 { 5.0 }
fn default_pipeline_energy_bonus() -> f64 { 0.5 }
fn default_cooldown_energy_bonus() -> f64 { 10.0 }

impl SettlementConfig {
    /// Resolve the daily accrual rate for a token balance.
    ///
    /// The bands are non-overlapping and ordered ascending, so the last
    /// qualifying band is the highest one. No qualifying band means no
    /// accrual.
    pub fn daily_rate(&self, balance: f64) -> f64 {
        self.tiers
            .iter()
            .filter(|t| balance >= t.min_balance)
            .next_back()
            .map(|t| t.daily_rate)
            .unwrap_or(0.0)
    }
}
