//! Chain module - the execution and consensus endpoints a run talks to
//!
//! This module provides:
//! - The `ChainRpc` capability consumed by the dispatch engine
//! - An ethers-backed provider with multi-RPC failover
//! - A minimal beacon API client for genesis time

pub mod beacon;
pub mod provider;

pub use beacon::BeaconClient;
pub use provider::{ChainProvider, ChainRpc, TxInspector};

#[cfg(test)]
pub use provider::{MockChainRpc, MockTxInspector};
