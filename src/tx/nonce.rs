//! Nonce allocation for batches
//!
//! The pending transaction count is read once per batch and the batch takes the
//! contiguous run starting there. Nothing is re-read while a batch is built, so
//! a batch never races its own submissions.

use crate::chain::ChainRpc;
use crate::error::{SpammerError, SpammerResult};

use ethers::types::Address;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Allocates contiguous nonce runs for one account
pub struct NonceAllocator {
    /// Sending account
    address: Address,
    /// One past the last nonce handed out, 0 before the first batch
    next_local: AtomicU64,
}

impl NonceAllocator {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            next_local: AtomicU64::new(0),
        }
    }

    /// Reserve `size` nonces starting at the account's pending count.
    ///
    /// If the node's pending view is behind what this allocator already handed
    /// out, the previous batch has not (yet) been accepted in full. The chain's
    /// value is still used and the resulting collisions surface as per-transaction
    /// submission failures.
    pub async fn allocate(&self, chain: &dyn ChainRpc, size: usize) -> SpammerResult<Range<u64>> {
        if size == 0 {
            return Err(SpammerError::Internal("Cannot allocate an empty nonce range".into()));
        }

        let pending = chain.pending_transaction_count(self.address).await?;

        let expected = self.next_local.load(Ordering::Acquire);
        if pending < expected {
            warn!(
                pending,
                expected,
                lag = expected - pending,
                "Pending nonce lags previous batch, collisions likely"
            );
        }

        let range = pending..pending + size as u64;
        self.next_local.store(range.end, Ordering::Release);

        debug!(start = range.start, end = range.end, "Allocated nonces");
        Ok(range)
    }
}
