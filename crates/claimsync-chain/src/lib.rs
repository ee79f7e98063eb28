//! claimsync-chain — JSON-RPC chain access for the claim ledger.
//!
//! ```text
//! ChainClient trait
//!     ├── HttpEndpoint   (reqwest JSON-RPC 2.0, per-request timeout)
//!     └── ProviderPool   (N endpoints, best-effort rotation on failure)
//! ```
//!
//! The `abi` module carries the event-topic constants and the minimal
//! word-level decoding the scanner and verifier need.

pub mod abi;
pub mod client;
pub mod error;
pub mod http;
pub mod pool;
pub mod request;

pub use client::{BlockInfo, ChainClient, RawLog, TxInfo, TxReceipt};
pub use error::RpcError;
pub use http::HttpEndpoint;
pub use pool::ProviderPool;
