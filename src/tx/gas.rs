//! Gas limit and EIP-1559 fee estimation, once per batch

use crate::chain::ChainRpc;
use crate::error::{SpammerError, SpammerResult};

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Eip1559TransactionRequest, U256};
use tracing::{debug, warn};

/// Gas limit used when `eth_estimateGas` fails
pub const FALLBACK_GAS_LIMIT: u64 = 40_000;

/// Fee parameters shared by every transaction of one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    pub gas_limit: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// Fee estimator for transfer batches
pub struct FeeEstimator {
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
    fallback_gas_limit: U256,
}

impl FeeEstimator {
    pub fn new() -> Self {
        Self {
            gas_limit_buffer_percent: 20,
            fallback_gas_limit: U256::from(FALLBACK_GAS_LIMIT),
        }
    }

    /// Build a fee quote for a `value` transfer from `from` to `to`.
    ///
    /// Gas estimation failures degrade to the fallback limit. A missing base
    /// fee or a failing fee query is an error: no sensible quote exists then.
    pub async fn quote(
        &self,
        chain: &dyn ChainRpc,
        from: Address,
        to: Address,
        value: U256,
    ) -> SpammerResult<FeeQuote> {
        let probe = TypedTransaction::Eip1559(
            Eip1559TransactionRequest::new().from(from).to(to).value(value),
        );

        let (estimate, base_fee, priority_fee) = tokio::join!(
            chain.estimate_gas(&probe),
            chain.latest_base_fee(),
            chain.max_priority_fee(),
        );

        let gas_limit = match estimate {
            Ok(estimate) => self.buffered_gas_limit(estimate),
            Err(e) => {
                warn!(
                    error = %e,
                    fallback = %self.fallback_gas_limit,
                    "Gas estimation failed, using fallback limit"
                );
                crate::metrics::record_gas_fallback();
                self.fallback_gas_limit
            }
        };

        let base_fee = base_fee?
            .ok_or_else(|| SpammerError::GasEstimation("No base fee in latest block".into()))?;
        let priority_fee = priority_fee?;

        let quote = FeeQuote {
            gas_limit,
            max_fee_per_gas: max_fee_per_gas(base_fee, priority_fee),
            max_priority_fee_per_gas: priority_fee,
        };

        debug!(
            gas_limit = %quote.gas_limit,
            base_fee = %base_fee,
            max_fee_per_gas = %quote.max_fee_per_gas,
            max_priority_fee_per_gas = %quote.max_priority_fee_per_gas,
            "Fee quote"
        );
        Ok(quote)
    }

    /// `estimate * (100 + buffer) / 100`, rounded up
    fn buffered_gas_limit(&self, estimate: U256) -> U256 {
        let scaled = estimate * (100 + self.gas_limit_buffer_percent);
        (scaled + 99) / 100
    }
}

impl Default for FeeEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Max fee = 2 * base_fee + priority_fee (buffer for block variability)
pub fn max_fee_per_gas(base_fee: U256, priority_fee: U256) -> U256 {
    base_fee * 2 + priority_fee
}
