//! Revert reason lookup for mined transactions
//!
//! Independent of the dispatch engine: given a hash, fetch the transaction and
//! its receipt, and if it failed, replay it as a call against the state it
//! executed on to get the node's revert message.

use crate::chain::TxInspector;
use crate::error::{SpammerError, SpammerResult};

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Transaction, TransactionRequest, H256, U64};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertStatus {
    Succeeded,
    Reverted { reason: Option<String> },
}

pub struct RevertChecker<I> {
    inspector: I,
}

impl<I: TxInspector> RevertChecker<I> {
    pub fn new(inspector: I) -> Self {
        Self { inspector }
    }

    pub async fn check(&self, tx_hash: H256) -> SpammerResult<RevertStatus> {
        let not_found = || SpammerError::TransactionNotFound {
            tx_hash: format!("{:?}", tx_hash),
        };

        let tx = self.inspector.transaction(tx_hash).await?.ok_or_else(not_found)?;
        let receipt = self.inspector.receipt(tx_hash).await?.ok_or_else(not_found)?;

        // Receipts without a status field predate Byzantium and cannot signal failure
        if receipt.status != Some(U64::zero()) {
            return Ok(RevertStatus::Succeeded);
        }

        let block = receipt.block_number.ok_or_else(not_found)?.as_u64();
        let replay_block = block.saturating_sub(1);
        debug!(tx_hash = ?tx_hash, block, replay_block, "Replaying failed transaction");

        match self.inspector.call_at(&replay_call(&tx), replay_block).await {
            Ok(_) => {
                warn!(tx_hash = ?tx_hash, "Replay succeeded, revert not reproducible");
                Ok(RevertStatus::Reverted { reason: None })
            }
            Err(SpammerError::Rpc { message, .. }) => Ok(RevertStatus::Reverted {
                reason: Some(message),
            }),
            Err(e) => Err(e),
        }
    }

    /// Succeed if the transaction did not revert, otherwise return the revert as an error
    pub async fn ensure_succeeded(&self, tx_hash: H256) -> SpammerResult<()> {
        match self.check(tx_hash).await? {
            RevertStatus::Succeeded => {
                info!(tx_hash = ?tx_hash, "Transaction did not fail");
                Ok(())
            }
            RevertStatus::Reverted { reason } => Err(SpammerError::Reverted {
                tx_hash: format!("{:?}", tx_hash),
                reason,
            }),
        }
    }
}

fn replay_call(tx: &Transaction) -> TypedTransaction {
    let mut call = TransactionRequest::new()
        .from(tx.from)
        .data(tx.input.clone())
        .value(tx.value)
        .gas(tx.gas);
    if let Some(to) = tx.to {
        call = call.to(to);
    }
    if let Some(gas_price) = tx.gas_price {
        call = call.gas_price(gas_price);
    }
    TypedTransaction::Legacy(call)
}
