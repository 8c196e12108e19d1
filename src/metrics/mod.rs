//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Transaction submissions and rejections
//! - Batch dispatch latency
//! - Gas estimation fallbacks
//! - Slot waits

use crate::error::{SpammerError, SpammerResult};
use crate::tx::SubmissionErrorKind;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    pub static ref TX_SENT: Counter = register_counter!(
        "spammer_transactions_sent_total",
        "Transactions acknowledged by the RPC endpoint"
    ).unwrap();

    pub static ref TX_FAILED: CounterVec = register_counter_vec!(
        "spammer_transactions_failed_total",
        "Transactions rejected by the RPC endpoint, by reason",
        &["reason"]
    ).unwrap();

    pub static ref BATCHES: Counter = register_counter!(
        "spammer_batches_total",
        "Batches dispatched"
    ).unwrap();

    pub static ref BATCH_LATENCY: Histogram = register_histogram!(
        "spammer_batch_dispatch_seconds",
        "Time from first submission to last acknowledgement in a batch",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    pub static ref GAS_FALLBACKS: Counter = register_counter!(
        "spammer_gas_estimation_fallbacks_total",
        "Batches that used the fallback gas limit"
    ).unwrap();

    pub static ref SLOT_WAIT: Gauge = register_gauge!(
        "spammer_slot_wait_seconds",
        "Most recent wait for a target slot"
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> SpammerResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| SpammerError::Internal(format!("Cannot bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| SpammerError::Internal(e.to_string()))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    render().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

// Helper functions to record metrics

pub fn record_tx_sent() {
    TX_SENT.inc();
}

pub fn record_tx_failed(kind: SubmissionErrorKind) {
    TX_FAILED.with_label_values(&[kind.as_str()]).inc();
}

pub fn record_batch(latency_secs: f64) {
    BATCHES.inc();
    BATCH_LATENCY.observe(latency_secs);
}

pub fn record_gas_fallback() {
    GAS_FALLBACKS.inc();
}

pub fn record_slot_wait(wait_secs: f64) {
    SLOT_WAIT.set(wait_secs);
}
