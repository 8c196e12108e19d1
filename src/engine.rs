//! Run loop: batches of transactions, optionally fired at target slots

use crate::chain::{BeaconClient, ChainRpc};
use crate::config::RunConfig;
use crate::error::SpammerResult;
use crate::schedule::Scheduler;
use crate::tx::{BatchBuilder, BatchReport, Dispatcher, TransferTemplate};

use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

/// Totals over every batch of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub batches: usize,
    pub sent: usize,
    pub failed: usize,
}

impl RunReport {
    fn record(&mut self, batch: &BatchReport) {
        self.batches += 1;
        self.sent += batch.sent();
        self.failed += batch.failed();
    }

    fn merge(mut self, other: RunReport) -> Self {
        self.batches += other.batches;
        self.sent += other.sent;
        self.failed += other.failed;
        self
    }
}

/// Validate `config`, then send its transactions, waiting for slot targets first
/// if any are configured.
///
/// Configuration errors are returned before any RPC call is made.
pub async fn execute(config: RunConfig, chain: Arc<dyn ChainRpc>) -> SpammerResult<RunReport> {
    config.validate()?;

    let span = info_span!("run", run_id = %Uuid::new_v4());
    async move {
        let scheduler = match (&config.beacon_rpc_url, config.slots.is_empty()) {
            (Some(url), false) => {
                let genesis = BeaconClient::new(url)?.genesis_time().await?;
                Some(Scheduler::new(genesis, config.slots.clone()))
            }
            _ => None,
        };

        let spammer = Spammer::new(config, chain).await?;
        let report = match scheduler {
            Some(mut scheduler) => spammer.run_scheduled(&mut scheduler).await?,
            None => spammer.run_count().await?,
        };

        info!(
            batches = report.batches,
            sent = report.sent,
            failed = report.failed,
            "Run complete"
        );
        SpammerResult::Ok(report)
    }
    .instrument(span)
    .await
}

/// Builds and dispatches batches for one account
pub struct Spammer {
    config: RunConfig,
    builder: BatchBuilder,
    dispatcher: Dispatcher,
}

impl Spammer {
    pub async fn new(config: RunConfig, chain: Arc<dyn ChainRpc>) -> SpammerResult<Self> {
        let chain_id = chain.chain_id().await?;

        let template = TransferTemplate {
            recipient: config.recipient,
            amount_wei: config.amount_wei,
            chain_id,
        };
        let builder = BatchBuilder::new(chain.clone(), config.signer.clone(), template);
        let dispatcher = Dispatcher::new(chain, config.submit_timeout);

        info!(
            chain_id,
            sender = ?builder.sender(),
            recipient = ?config.recipient,
            amount_wei = %config.amount_wei,
            "Spammer initialized"
        );

        Ok(Self {
            config,
            builder,
            dispatcher,
        })
    }

    /// Send `count` transactions in batches of at most `max_batch_size`,
    /// sleeping between batches.
    ///
    /// Rejected transactions are counted, not fatal. A batch that cannot be
    /// built (fee or nonce query failure) ends the run.
    pub async fn run_count(&self) -> SpammerResult<RunReport> {
        let mut report = RunReport::default();
        let mut remaining = self.config.count;

        while remaining > 0 {
            let size = remaining.min(self.config.max_batch_size as u64) as usize;

            let batch = self.builder.build(size).await?;
            let batch_report = self.dispatcher.dispatch(batch).await;
            report.record(&batch_report);

            remaining -= size as u64;
            if remaining > 0 && !self.config.batch_interval.is_zero() {
                tokio::time::sleep(self.config.batch_interval).await;
            }
        }

        Ok(report)
    }

    /// One full `run_count` per slot target
    pub async fn run_scheduled(&self, scheduler: &mut Scheduler) -> SpammerResult<RunReport> {
        let reports = scheduler.run(move |_slot| self.run_count()).await?;
        debug!(state = ?scheduler.state(), runs = reports.len(), "Schedule complete");
        Ok(reports
            .into_iter()
            .fold(RunReport::default(), RunReport::merge))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainRpc;
    use crate::error::SpammerError;
    use crate::test_utils::{run_config, signer, stub_chain};

    use ethers::types::{Bytes, Eip1559TransactionRequest, H256, U256};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Stub chain that records every submitted payload
    fn recording_chain(pending_nonce: u64) -> (MockChainRpc, Arc<Mutex<Vec<Bytes>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut chain = MockChainRpc::new();
        chain.expect_chain_id().returning(|| Ok(167_000));
        chain
            .expect_estimate_gas()
            .returning(|_| Ok(U256::from(21_000)));
        chain
            .expect_latest_base_fee()
            .returning(|| Ok(Some(U256::from(1_000_000_000u64))));
        chain
            .expect_max_priority_fee()
            .returning(|| Ok(U256::from(100_000_000u64)));
        chain
            .expect_pending_transaction_count()
            .returning(move |_| Ok(pending_nonce));
        let log = sent.clone();
        chain.expect_send_raw_transaction().returning(move |raw| {
            log.lock().unwrap().push(raw.clone());
            Ok(H256::from(ethers::utils::keccak256(&raw)))
        });
        (chain, sent)
    }

    #[tokio::test]
    async fn test_batch_of_three_signed_with_expected_fees() {
        let (chain, sent) = recording_chain(0);
        let config = RunConfig {
            count: 3,
            max_batch_size: 3,
            ..run_config()
        };

        let report = execute(config.clone(), Arc::new(chain)).await.unwrap();
        assert_eq!(
            report,
            RunReport {
                batches: 1,
                sent: 3,
                failed: 0
            }
        );

        // Signing is deterministic, so the expected payloads can be rebuilt
        let signer = signer();
        let mut expected: Vec<Vec<u8>> = (0..3u64)
            .map(|nonce| {
                let request = Eip1559TransactionRequest::new()
                    .to(config.recipient)
                    .value(config.amount_wei)
                    .nonce(nonce)
                    .gas(25_200u64)
                    .max_fee_per_gas(2_100_000_000u64)
                    .max_priority_fee_per_gas(100_000_000u64)
                    .chain_id(167_000u64);
                signer.sign(request).unwrap().raw.to_vec()
            })
            .collect();

        let mut sent: Vec<Vec<u8>> = sent.lock().unwrap().iter().map(|b| b.to_vec()).collect();
        sent.sort();
        expected.sort();
        assert_eq!(sent, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_split_into_capped_batches() {
        let mut chain = MockChainRpc::new();
        chain.expect_chain_id().times(1).returning(|| Ok(167_000));
        chain.expect_estimate_gas().times(3).returning(|_| Ok(U256::from(21_000)));
        chain
            .expect_latest_base_fee()
            .times(3)
            .returning(|| Ok(Some(U256::from(7))));
        chain.expect_max_priority_fee().times(3).returning(|| Ok(U256::from(1)));
        let mut reads = vec![0u64, 3, 6].into_iter();
        chain
            .expect_pending_transaction_count()
            .times(3)
            .returning(move |_| Ok(reads.next().unwrap()));
        chain
            .expect_send_raw_transaction()
            .times(7)
            .returning(|raw| Ok(H256::from(ethers::utils::keccak256(&raw))));

        let config = RunConfig {
            count: 7,
            max_batch_size: 3,
            batch_interval: Duration::from_secs(2),
            ..run_config()
        };

        let started = tokio::time::Instant::now();
        let report = execute(config, Arc::new(chain)).await.unwrap();

        assert_eq!(
            report,
            RunReport {
                batches: 3,
                sent: 7,
                failed: 0
            }
        );
        // Two sleeps between three batches
        assert_eq!(started.elapsed().as_secs(), 4);
    }

    #[tokio::test]
    async fn test_rejections_do_not_fail_run() {
        let mut chain = MockChainRpc::new();
        chain.expect_chain_id().returning(|| Ok(1));
        chain.expect_estimate_gas().returning(|_| Ok(U256::from(21_000)));
        chain.expect_latest_base_fee().returning(|| Ok(Some(U256::one())));
        chain.expect_max_priority_fee().returning(|| Ok(U256::one()));
        chain.expect_pending_transaction_count().returning(|_| Ok(0));
        chain
            .expect_send_raw_transaction()
            .times(4)
            .returning(|_| Err(SpammerError::rpc("eth_sendRawTransaction", "already known")));

        let config = RunConfig {
            count: 4,
            max_batch_size: 4,
            ..run_config()
        };
        let report = execute(config, Arc::new(chain)).await.unwrap();
        assert_eq!(report.sent, 0);
        assert_eq!(report.failed, 4);
    }

    #[tokio::test]
    async fn test_slots_without_beacon_fail_before_any_call() {
        // No expectations: any RPC call would panic
        let chain = MockChainRpc::new();
        let config = RunConfig {
            slots: vec![0],
            beacon_rpc_url: None,
            ..run_config()
        };

        let err = execute(config, Arc::new(chain)).await.unwrap_err();
        assert!(err.is_configuration());
        assert!(matches!(err, SpammerError::SchedulingPrecondition { .. }));
    }

    #[tokio::test]
    async fn test_chain_id_failure_aborts() {
        let mut chain = MockChainRpc::new();
        chain
            .expect_chain_id()
            .returning(|| Err(SpammerError::rpc("eth_chainId", "connection refused")));
        chain.expect_send_raw_transaction().never();

        let result = execute(run_config(), Arc::new(chain)).await;
        assert!(matches!(result, Err(SpammerError::Rpc { method: "eth_chainId", .. })));
    }

    fn fixed_clock() -> u64 {
        1_700_000_100_000
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_run_per_slot() {
        let chain = stub_chain(0, 1_000_000_000, 100_000_000);
        let config = RunConfig {
            count: 2,
            max_batch_size: 2,
            slots: vec![5, 9],
            beacon_rpc_url: Some("http://127.0.0.1:5052".into()),
            ..run_config()
        };
        let spammer = Spammer::new(config, Arc::new(chain)).await.unwrap();
        let mut scheduler = Scheduler::new(1_700_000_000, vec![5, 9]).with_clock(fixed_clock);

        let started = tokio::time::Instant::now();
        let report = spammer.run_scheduled(&mut scheduler).await.unwrap();

        assert_eq!(
            report,
            RunReport {
                batches: 2,
                sent: 4,
                failed: 0
            }
        );
        assert_eq!(started.elapsed().as_secs(), 344 + 8);
    }
}
