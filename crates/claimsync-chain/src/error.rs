//! Transport-level error types.

use thiserror::Error;

/// Errors from a JSON-RPC chain call.
#[derive(Debug, Error)]
pub enum RpcError {
    /// HTTP request failed (connection refused, DNS, TLS, ...).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC error object returned by the node.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The node rejected the request for being too large or too frequent.
    /// The scanner reacts by halving its block span.
    #[error("range limited: {0}")]
    RangeLimited(String),

    /// Per-attempt timeout elapsed; degraded to a synthetic error rather
    /// than hanging.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Response could not be deserialized.
    #[error("decode error: {0}")]
    Decode(String),

    /// The provider pool has no endpoints.
    #[error("no providers configured")]
    NoProviders,
}

impl RpcError {
    /// Classify a JSON-RPC error object. Rate-limit and result-set-size
    /// rejections come back with varying codes and wording across
    /// providers, so this matches the common shapes.
    pub fn from_rpc(code: i64, message: String) -> Self {
        let lower = message.to_ascii_lowercase();
        let limited = code == -32005
            || code == 429
            || lower.contains("rate limit")
            || lower.contains("too many")
            || lower.contains("limit exceeded")
            || lower.contains("block range");
        if limited {
            Self::RangeLimited(message)
        } else {
            Self::Rpc { code, message }
        }
    }

    /// Returns `true` if the error is transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Timeout { .. } | Self::RangeLimited(_)
        )
    }

    /// Returns `true` if the node asked for a smaller request.
    pub fn is_range_limited(&self) -> bool {
        matches!(self, Self::RangeLimited(_))
    }
}
