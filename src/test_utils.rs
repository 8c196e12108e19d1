//! Shared fixtures for unit tests

use crate::chain::MockChainRpc;
use crate::config::RunConfig;
use crate::tx::{Batch, FeeQuote, Signer};

use ethers::types::{Address, Eip1559TransactionRequest, H256, U256};
use std::time::Duration;

/// Well-known dev key (anvil/hardhat account 0)
pub const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub fn signer() -> Signer {
    Signer::from_private_key(DEV_KEY).unwrap()
}

/// A valid single-transaction run with no inter-batch sleep
pub fn run_config() -> RunConfig {
    RunConfig {
        signer: signer(),
        recipient: Address::repeat_byte(0x01),
        amount_wei: U256::from(6_000_000_000_000_000u64),
        rpc_urls: vec!["http://127.0.0.1:8545".to_string()],
        count: 1,
        max_batch_size: 1,
        batch_interval: Duration::ZERO,
        slots: vec![],
        beacon_rpc_url: None,
        submit_timeout: Duration::from_secs(5),
        metrics_port: None,
    }
}

/// A chain that answers every read with fixed values and acknowledges every
/// submission with the payload's hash
pub fn stub_chain(pending_nonce: u64, base_fee: u64, priority_fee: u64) -> MockChainRpc {
    let mut chain = MockChainRpc::new();
    chain.expect_chain_id().returning(|| Ok(167_000));
    chain
        .expect_estimate_gas()
        .returning(|_| Ok(U256::from(21_000)));
    chain
        .expect_latest_base_fee()
        .returning(move || Ok(Some(U256::from(base_fee))));
    chain
        .expect_max_priority_fee()
        .returning(move || Ok(U256::from(priority_fee)));
    chain
        .expect_pending_transaction_count()
        .returning(move |_| Ok(pending_nonce));
    chain
        .expect_send_raw_transaction()
        .returning(|raw| Ok(H256::from(ethers::utils::keccak256(&raw))));
    chain
}

/// A batch signed with the dev key, nonces `first..first + size`
pub fn signed_batch(first: u64, size: u64) -> Batch {
    let signer = signer();
    let quote = FeeQuote {
        gas_limit: U256::from(25_200),
        max_fee_per_gas: U256::from(2_100_000_000u64),
        max_priority_fee_per_gas: U256::from(100_000_000u64),
    };
    let transactions = (first..first + size)
        .map(|nonce| {
            let request = Eip1559TransactionRequest::new()
                .to(Address::repeat_byte(0x01))
                .value(1u64)
                .nonce(nonce)
                .gas(quote.gas_limit)
                .max_fee_per_gas(quote.max_fee_per_gas)
                .max_priority_fee_per_gas(quote.max_priority_fee_per_gas)
                .chain_id(167_000u64);
            signer.sign(request).unwrap()
        })
        .collect();
    Batch {
        quote,
        transactions,
    }
}
