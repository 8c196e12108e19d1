//! tx-spammer - synthetic transaction load for EIP-1559 chains
//!
//! Sends batches of signed transfers concurrently, optionally timed to
//! consensus slot boundaries, to exercise a sequencer under test.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

mod chain;
mod config;
mod engine;
mod error;
mod metrics;
mod revert;
mod schedule;
#[cfg(test)]
mod test_utils;
mod tx;

use chain::ChainProvider;
use config::{Cli, Command, LogFormat, RunConfig};
use error::SpammerError;
use metrics::MetricsServer;
use revert::RevertChecker;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.log_format);

    info!("Starting tx-spammer v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Spam(args) => {
            let config = RunConfig::resolve(args)?;

            if let Some(port) = config.metrics_port {
                let server = MetricsServer::new(port);
                tokio::spawn(async move {
                    if let Err(e) = server.run().await {
                        error!("Metrics server error: {}", e);
                    }
                });
            }

            let provider = Arc::new(ChainProvider::new(&config.rpc_urls)?);
            let report = match engine::execute(config, provider).await {
                Ok(report) => report,
                Err(e) if e.is_configuration() => {
                    error!(error = %e, "Invalid configuration");
                    return Err(e.into());
                }
                Err(e) => {
                    error!(error = %e, retryable = e.is_retryable(), "Run failed");
                    return Err(e.into());
                }
            };

            if report.failed > 0 {
                info!(
                    failed = report.failed,
                    "Some transactions were rejected; see warnings above"
                );
            }
        }
        Command::RevertCheck(args) => {
            let tx_hash = args
                .tx_hash
                .parse::<ethers::types::H256>()
                .map_err(|e| SpammerError::Config(format!("Invalid tx hash: {}", e)))?;
            let provider = ChainProvider::new(&[args.rpc_url])?;

            RevertChecker::new(provider)
                .ensure_succeeded(tx_hash)
                .await
                .context("Revert check")?;
        }
    }

    Ok(())
}

fn init_logging(format: LogFormat) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tx_spammer=debug,hyper=warn,reqwest=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}
