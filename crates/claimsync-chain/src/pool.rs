//! Multi-endpoint provider pool with failure rotation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::client::{BlockInfo, ChainClient, RawLog, TxInfo, TxReceipt};
use crate::error::RpcError;

/// Holds N chain endpoints and an index to the active one.
///
/// Every call delegates to the active endpoint; `rotate()` advances the
/// index after sustained failure. The index is a best-effort shared
/// pointer — unsynchronized rotation is safe because endpoints are
/// stateless per call.
pub struct ProviderPool {
    endpoints: Vec<Arc<dyn ChainClient>>,
    active: AtomicUsize,
}

impl ProviderPool {
    pub fn new(endpoints: Vec<Arc<dyn ChainClient>>) -> Self {
        Self {
            endpoints,
            active: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    fn current(&self) -> Result<&Arc<dyn ChainClient>, RpcError> {
        if self.endpoints.is_empty() {
            return Err(RpcError::NoProviders);
        }
        let idx = self.active.load(Ordering::Relaxed) % self.endpoints.len();
        Ok(&self.endpoints[idx])
    }

    /// Advance to the next endpoint.
    pub fn rotate(&self) {
        if self.endpoints.len() < 2 {
            return;
        }
        let prev = self.active.fetch_add(1, Ordering::Relaxed);
        let from = prev % self.endpoints.len();
        let to = (prev + 1) % self.endpoints.len();
        warn!(
            from = %self.endpoints[from].endpoint(),
            to = %self.endpoints[to].endpoint(),
            "rotating RPC provider"
        );
    }

    /// URL of the currently active endpoint.
    pub fn active_endpoint(&self) -> Option<&str> {
        self.current().ok().map(|c| c.endpoint())
    }
}

#[async_trait]
impl ChainClient for ProviderPool {
    async fn block_number(&self) -> Result<u64, RpcError> {
        self.current()?.block_number().await
    }

    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        address: &str,
        topics: &[String],
    ) -> Result<Vec<RawLog>, RpcError> {
        self.current()?.get_logs(from, to, address, topics).await
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<TxInfo>, RpcError> {
        self.current()?.get_transaction(hash).await
    }

    async fn get_receipt(&self, hash: &str) -> Result<Option<TxReceipt>, RpcError> {
        self.current()?.get_receipt(hash).await
    }

    async fn get_block(&self, number: u64) -> Result<Option<BlockInfo>, RpcError> {
        self.current()?.get_block(number).await
    }

    async fn call(&self, to: &str, data: &str) -> Result<String, RpcError> {
        self.current()?.call(to, data).await
    }

    fn endpoint(&self) -> &str {
        "pool"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(String, u64);

    #[async_trait]
    impl ChainClient for Named {
        async fn block_number(&self) -> Result<u64, RpcError> {
            Ok(self.1)
        }
        async fn get_logs(
            &self,
            _f: u64,
            _t: u64,
            _a: &str,
            _topics: &[String],
        ) -> Result<Vec<RawLog>, RpcError> {
            Ok(vec![])
        }
        async fn get_transaction(&self, _h: &str) -> Result<Option<TxInfo>, RpcError> {
            Ok(None)
        }
        async fn get_receipt(&self, _h: &str) -> Result<Option<TxReceipt>, RpcError> {
            Ok(None)
        }
        async fn get_block(&self, _n: u64) -> Result<Option<BlockInfo>, RpcError> {
            Ok(None)
        }
        async fn call(&self, _to: &str, _data: &str) -> Result<String, RpcError> {
            Ok("0x".into())
        }
        fn endpoint(&self) -> &str {
            &self.0
        }
    }

    #[tokio::test]
    async fn rotation_advances_and_wraps() {
        let pool = ProviderPool::new(vec![
            Arc::new(Named("a".into(), 1)),
            Arc::new(Named("b".into(), 2)),
        ]);
        assert_eq!(pool.block_number().await.unwrap(), 1);
        pool.rotate();
        assert_eq!(pool.block_number().await.unwrap(), 2);
        pool.rotate();
        assert_eq!(pool.block_number().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_pool_errors() {
        let pool = ProviderPool::new(vec![]);
        assert!(matches!(
            pool.block_number().await,
            Err(RpcError::NoProviders)
        ));
    }

    #[tokio::test]
    async fn single_endpoint_rotation_is_noop() {
        let pool = ProviderPool::new(vec![Arc::new(Named("only".into(), 7))]);
        pool.rotate();
        assert_eq!(pool.active_endpoint(), Some("only"));
    }
}
