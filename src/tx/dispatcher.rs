//! Concurrent batch submission
//!
//! Every transaction of a batch gets its own task, so submission concurrency
//! equals the batch size. Outcomes are collected per transaction; one failed
//! submission never prevents its siblings from being sent.

use super::builder::Batch;
use crate::chain::ChainRpc;
use crate::error::SpammerError;

use ethers::types::H256;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Why the endpoint refused a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionErrorKind {
    NonceTooLow,
    AlreadyKnown,
    Underpriced,
    InsufficientFunds,
    Timeout,
    /// The submission task panicked or was cancelled
    Aborted,
    Rpc,
}

impl SubmissionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionErrorKind::NonceTooLow => "nonce_too_low",
            SubmissionErrorKind::AlreadyKnown => "already_known",
            SubmissionErrorKind::Underpriced => "underpriced",
            SubmissionErrorKind::InsufficientFunds => "insufficient_funds",
            SubmissionErrorKind::Timeout => "timeout",
            SubmissionErrorKind::Aborted => "aborted",
            SubmissionErrorKind::Rpc => "rpc",
        }
    }

    /// Classify a node's rejection message
    fn classify(message: &str) -> Self {
        let message = message.to_lowercase();
        if message.contains("nonce too low") {
            SubmissionErrorKind::NonceTooLow
        } else if message.contains("already known") || message.contains("known transaction") {
            SubmissionErrorKind::AlreadyKnown
        } else if message.contains("underpriced") {
            SubmissionErrorKind::Underpriced
        } else if message.contains("insufficient funds") {
            SubmissionErrorKind::InsufficientFunds
        } else {
            SubmissionErrorKind::Rpc
        }
    }
}

/// A failed submission with its root cause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionError {
    pub kind: SubmissionErrorKind,
    pub message: String,
}

impl fmt::Display for SubmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl From<SpammerError> for SubmissionError {
    fn from(err: SpammerError) -> Self {
        let message = match err {
            SpammerError::Rpc { message, .. } => message,
            other => other.to_string(),
        };
        Self {
            kind: SubmissionErrorKind::classify(&message),
            message,
        }
    }
}

/// Outcome of one transaction's submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub nonce: u64,
    pub outcome: Result<H256, SubmissionError>,
}

impl DispatchResult {
    pub fn is_sent(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Per-transaction outcomes of one batch, in nonce order
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub results: Vec<DispatchResult>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn sent(&self) -> usize {
        self.results.iter().filter(|r| r.is_sent()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.sent()
    }
}

/// Submits batches to the chain
pub struct Dispatcher {
    chain: Arc<dyn ChainRpc>,
    submit_timeout: Duration,
}

impl Dispatcher {
    pub fn new(chain: Arc<dyn ChainRpc>, submit_timeout: Duration) -> Self {
        Self {
            chain,
            submit_timeout,
        }
    }

    /// Submit every transaction of `batch` concurrently and wait for all of
    /// them to be acknowledged or rejected. Inclusion is not awaited.
    pub async fn dispatch(&self, batch: Batch) -> BatchReport {
        if batch.is_empty() {
            return BatchReport::default();
        }

        let started = Instant::now();
        debug!(
            size = batch.len(),
            max_fee_per_gas = %batch.quote.max_fee_per_gas,
            gas_limit = %batch.quote.gas_limit,
            "Dispatching batch"
        );
        let nonces: Vec<u64> = batch.transactions.iter().map(|tx| tx.nonce).collect();

        let handles: Vec<_> = batch
            .transactions
            .into_iter()
            .map(|tx| {
                let chain = self.chain.clone();
                let submit_timeout = self.submit_timeout;
                tokio::spawn(async move {
                    let expected_hash = tx.hash;
                    match timeout(submit_timeout, chain.send_raw_transaction(tx.raw)).await {
                        Ok(Ok(hash)) => {
                            if hash != expected_hash {
                                warn!(
                                    nonce = tx.nonce,
                                    expected = ?expected_hash,
                                    returned = ?hash,
                                    "Endpoint returned an unexpected transaction hash"
                                );
                            }
                            Ok(hash)
                        }
                        Ok(Err(e)) => Err(SubmissionError::from(e)),
                        Err(_) => Err(SubmissionError {
                            kind: SubmissionErrorKind::Timeout,
                            message: format!("no response within {:?}", submit_timeout),
                        }),
                    }
                })
            })
            .collect();

        let joined = futures::future::join_all(handles).await;

        let results: Vec<DispatchResult> = nonces
            .into_iter()
            .zip(joined)
            .map(|(nonce, joined)| {
                let outcome = joined.unwrap_or_else(|e| {
                    Err(SubmissionError {
                        kind: SubmissionErrorKind::Aborted,
                        message: e.to_string(),
                    })
                });

                match &outcome {
                    Ok(hash) => {
                        debug!(nonce, tx_hash = ?hash, "Transaction sent");
                        crate::metrics::record_tx_sent();
                    }
                    Err(e) => {
                        warn!(
                            nonce,
                            kind = e.kind.as_str(),
                            error = %e.message,
                            "Transaction rejected"
                        );
                        crate::metrics::record_tx_failed(e.kind);
                    }
                }

                DispatchResult { nonce, outcome }
            })
            .collect();

        let report = BatchReport {
            results,
            elapsed: started.elapsed(),
        };

        crate::metrics::record_batch(report.elapsed.as_secs_f64());
        info!(
            sent = report.sent(),
            failed = report.failed(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Batch dispatched"
        );
        report
    }
}
