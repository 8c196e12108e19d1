//! Chain RPC capability and the ethers-backed provider with multi-RPC failover

use crate::error::{SpammerError, SpammerResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider, ProviderError, RpcError};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// The chain operations the dispatch engine consumes.
///
/// Any client able to answer these calls can drive a run; tests use the
/// generated `MockChainRpc`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// `eth_chainId`
    async fn chain_id(&self) -> SpammerResult<u64>;

    /// `eth_estimateGas` against the latest state
    async fn estimate_gas(&self, tx: &TypedTransaction) -> SpammerResult<U256>;

    /// `baseFeePerGas` of the latest block, `None` for pre-London chains
    async fn latest_base_fee(&self) -> SpammerResult<Option<U256>>;

    /// `eth_maxPriorityFeePerGas`
    async fn max_priority_fee(&self) -> SpammerResult<U256>;

    /// `eth_getTransactionCount(address, "pending")`
    async fn pending_transaction_count(&self, address: Address) -> SpammerResult<u64>;

    /// `eth_sendRawTransaction`, resolving once the endpoint acknowledges the payload
    async fn send_raw_transaction(&self, raw: Bytes) -> SpammerResult<H256>;
}

/// Lookups used by the revert checker
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TxInspector: Send + Sync {
    async fn transaction(&self, tx_hash: H256) -> SpammerResult<Option<Transaction>>;

    async fn receipt(&self, tx_hash: H256) -> SpammerResult<Option<TransactionReceipt>>;

    /// `eth_call` against the state at `block`
    async fn call_at(&self, tx: &TypedTransaction, block: u64) -> SpammerResult<Bytes>;
}

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl ChainProvider {
    /// Create a provider over one or more HTTP endpoints
    pub fn new(rpc_urls: &[String]) -> SpammerResult<Self> {
        let mut http_providers = Vec::new();

        for url in rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    debug!(url = %url, "Added HTTP provider");
                    http_providers.push(provider);
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Failed to create provider");
                }
            }
        }

        if http_providers.is_empty() {
            return Err(SpammerError::Config("No valid RPC endpoints".to_string()));
        }

        Ok(Self {
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        if self.http_providers.len() > 1 {
            warn!(provider = next, "RPC failover");
        }
    }

    /// Run a read call, moving to the next endpoint on transport failures.
    ///
    /// A JSON-RPC error response means the node answered, so it is returned
    /// as-is without trying the remaining endpoints.
    async fn with_failover<T, F, Fut>(&self, method: &'static str, call: F) -> SpammerResult<T>
    where
        F: Fn(Provider<Http>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = None;

        for _ in 0..self.http_providers.len() {
            match call(self.http().clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if RpcError::as_error_response(&e).is_some() => {
                    return Err(SpammerError::rpc(method, rpc_error_message(&e)));
                }
                Err(e) => {
                    warn!(method, error = %e, "RPC call failed");
                    last_error = Some(e);
                    self.failover();
                }
            }
        }

        Err(SpammerError::rpc(
            method,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "all providers failed".to_string()),
        ))
    }
}

#[async_trait]
impl ChainRpc for ChainProvider {
    async fn chain_id(&self) -> SpammerResult<u64> {
        let id = self
            .with_failover("eth_chainId", |p| async move { p.get_chainid().await })
            .await?;
        Ok(id.low_u64())
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> SpammerResult<U256> {
        self.with_failover("eth_estimateGas", |p| {
            let tx = tx.clone();
            async move { p.estimate_gas(&tx, None).await }
        })
        .await
    }

    async fn latest_base_fee(&self) -> SpammerResult<Option<U256>> {
        let block = self
            .with_failover("eth_getBlockByNumber", |p| async move {
                p.get_block(BlockNumber::Latest).await
            })
            .await?
            .ok_or_else(|| SpammerError::rpc("eth_getBlockByNumber", "no latest block"))?;

        Ok(block.base_fee_per_gas)
    }

    async fn max_priority_fee(&self) -> SpammerResult<U256> {
        self.with_failover("eth_maxPriorityFeePerGas", |p| async move {
            p.request::<_, U256>("eth_maxPriorityFeePerGas", ()).await
        })
        .await
    }

    async fn pending_transaction_count(&self, address: Address) -> SpammerResult<u64> {
        let count = self
            .with_failover("eth_getTransactionCount", |p| async move {
                p.get_transaction_count(address, Some(BlockNumber::Pending.into()))
                    .await
            })
            .await?;
        Ok(count.low_u64())
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> SpammerResult<H256> {
        // No failover: a resend to another endpoint would race the first submission.
        let pending = self
            .http()
            .send_raw_transaction(raw)
            .await
            .map_err(|e| SpammerError::rpc("eth_sendRawTransaction", rpc_error_message(&e)))?;
        Ok(pending.tx_hash())
    }
}

#[async_trait]
impl TxInspector for ChainProvider {
    async fn transaction(&self, tx_hash: H256) -> SpammerResult<Option<Transaction>> {
        self.with_failover("eth_getTransactionByHash", |p| async move {
            p.get_transaction(tx_hash).await
        })
        .await
    }

    async fn receipt(&self, tx_hash: H256) -> SpammerResult<Option<TransactionReceipt>> {
        self.with_failover("eth_getTransactionReceipt", |p| async move {
            p.get_transaction_receipt(tx_hash).await
        })
        .await
    }

    async fn call_at(&self, tx: &TypedTransaction, block: u64) -> SpammerResult<Bytes> {
        let block = BlockId::Number(BlockNumber::Number(block.into()));
        self.with_failover("eth_call", |p| {
            let tx = tx.clone();
            async move { p.call(&tx, Some(block)).await }
        })
        .await
    }
}

/// Prefer the node's own error message over the transport wrapper's text
fn rpc_error_message(err: &ProviderError) -> String {
    match RpcError::as_error_response(err) {
        Some(resp) => resp.message.clone(),
        None => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_endpoint_list() {
        let err = ChainProvider::new(&[]).err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_skips_invalid_urls() {
        let provider = ChainProvider::new(&[
            "not a url".to_string(),
            "http://127.0.0.1:8545".to_string(),
        ])
        .unwrap();
        assert_eq!(provider.http_providers.len(), 1);
    }

    #[test]
    fn test_rpc_error_message_prefers_node_message() {
        use ethers::providers::{HttpClientError, JsonRpcError};

        let err = ProviderError::JsonRpcClientError(Box::new(HttpClientError::JsonRpcError(
            JsonRpcError {
                code: -32000,
                message: "nonce too low".to_string(),
                data: None,
            },
        )));
        assert_eq!(rpc_error_message(&err), "nonce too low");

        let err = ProviderError::CustomError("connection refused".to_string());
        assert_eq!(rpc_error_message(&err), err.to_string());
    }

    #[test]
    fn test_failover_rotates() {
        let provider = ChainProvider::new(&[
            "http://127.0.0.1:8545".to_string(),
            "http://127.0.0.1:8546".to_string(),
        ])
        .unwrap();
        assert_eq!(provider.current_provider.load(Ordering::Relaxed), 0);
        provider.failover();
        assert_eq!(provider.current_provider.load(Ordering::Relaxed), 1);
        provider.failover();
        assert_eq!(provider.current_provider.load(Ordering::Relaxed), 0);
    }
}
