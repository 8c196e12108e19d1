//! Batch construction: one fee quote, one nonce read, `n` locally signed transfers

use super::gas::{FeeEstimator, FeeQuote};
use super::nonce::NonceAllocator;
use super::signer::{SignedTransaction, Signer};
use crate::chain::ChainRpc;
use crate::error::SpammerResult;

use ethers::types::{Address, Eip1559TransactionRequest, U256};
use std::sync::Arc;
use tracing::debug;

/// A cohort of signed transactions sharing one fee quote
#[derive(Debug, Clone)]
pub struct Batch {
    pub quote: FeeQuote,
    /// Ordered by ascending nonce
    pub transactions: Vec<SignedTransaction>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// Transfer parameters fixed for the whole run
#[derive(Debug, Clone, Copy)]
pub struct TransferTemplate {
    pub recipient: Address,
    pub amount_wei: U256,
    pub chain_id: u64,
}

/// Builds ready-to-send batches
pub struct BatchBuilder {
    chain: Arc<dyn ChainRpc>,
    signer: Signer,
    fee_estimator: FeeEstimator,
    nonce_allocator: NonceAllocator,
    template: TransferTemplate,
}

impl BatchBuilder {
    pub fn new(chain: Arc<dyn ChainRpc>, signer: Signer, template: TransferTemplate) -> Self {
        let nonce_allocator = NonceAllocator::new(signer.address());
        Self {
            chain,
            signer,
            fee_estimator: FeeEstimator::new(),
            nonce_allocator,
            template,
        }
    }

    pub fn sender(&self) -> Address {
        self.signer.address()
    }

    /// Build a batch of exactly `size` transactions.
    ///
    /// All network reads happen before signing starts; signing is local. Any
    /// failure returns before a single transaction exists, so callers never
    /// see a partial batch.
    pub async fn build(&self, size: usize) -> SpammerResult<Batch> {
        let quote = self
            .fee_estimator
            .quote(
                self.chain.as_ref(),
                self.signer.address(),
                self.template.recipient,
                self.template.amount_wei,
            )
            .await?;

        let nonces = self.nonce_allocator.allocate(self.chain.as_ref(), size).await?;

        let transactions = nonces
            .map(|nonce| self.signer.sign(self.request(nonce, &quote)))
            .collect::<SpammerResult<Vec<_>>>()?;

        debug!(
            size = transactions.len(),
            first_nonce = transactions.first().map(|t| t.nonce),
            "Built batch"
        );

        Ok(Batch {
            quote,
            transactions,
        })
    }

    fn request(&self, nonce: u64, quote: &FeeQuote) -> Eip1559TransactionRequest {
        Eip1559TransactionRequest::new()
            .from(self.signer.address())
            .to(self.template.recipient)
            .value(self.template.amount_wei)
            .nonce(nonce)
            .gas(quote.gas_limit)
            .max_fee_per_gas(quote.max_fee_per_gas)
            .max_priority_fee_per_gas(quote.max_priority_fee_per_gas)
            .chain_id(self.template.chain_id)
    }
}
