//! Configuration management for the transaction spammer
//!
//! Settings come from the command line, the environment (including a `.env`
//! file) and an optional TOML file with environment variable substitution.
//! They are resolved once into an immutable [`RunConfig`].

use crate::error::{SpammerError, SpammerResult};
use crate::schedule::SLOTS_PER_EPOCH;
use crate::tx::Signer;

use clap::{Args, Parser, Subcommand, ValueEnum};
use ethers::types::{Address, U256};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_AMOUNT_ETH: f64 = 0.006;
const DEFAULT_COUNT: u64 = 1;
const DEFAULT_BATCH_SIZE: usize = 1;
const DEFAULT_SLEEP_SECS: f64 = 1.0;
const DEFAULT_SUBMIT_TIMEOUT_SECS: u64 = 30;

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate EIP-1559 transaction load, optionally timed to beacon slots")]
pub struct Cli {
    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send `count` transfers in concurrent batches
    Spam(SpamArgs),
    /// Report why a mined transaction reverted
    RevertCheck(RevertCheckArgs),
}

/// Spam settings. Every field is optional here so the same shape serves the
/// command line and the `[spammer]` table of a settings file.
#[derive(Args, Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpamArgs {
    /// TOML settings file; command line and environment take precedence
    #[arg(long, env = "SPAMMER_CONFIG")]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Hex private key of the sending account
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Transfer recipient
    #[arg(long, env = "RECIPIENT_ADDRESS")]
    pub recipient: Option<String>,

    /// Execution RPC endpoints, tried in order on connection failures
    #[arg(long = "rpc-url", env = "RPC_URL", value_delimiter = ',')]
    #[serde(rename = "rpc_url", alias = "rpc_urls")]
    pub rpc_urls: Vec<String>,

    /// Amount of ETH sent per transaction [default: 0.006]
    #[arg(long)]
    pub amount: Option<f64>,

    /// Number of transactions to send per run [default: 1]
    #[arg(long)]
    pub count: Option<u64>,

    /// Maximum transactions per concurrently dispatched batch [default: 1]
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Seconds to sleep between batches [default: 1.0]
    #[arg(long)]
    pub sleep: Option<f64>,

    /// Epoch-relative slot indices (0-31) to fire a run at
    #[arg(long, value_delimiter = ',')]
    pub slots: Vec<u8>,

    /// Consensus-layer REST endpoint, required with --slots
    #[arg(long, env = "BEACON_RPC_URL")]
    pub beacon_rpc_url: Option<String>,

    /// Seconds to wait for each submission to be acknowledged [default: 30]
    #[arg(long)]
    pub submit_timeout: Option<u64>,

    /// Serve Prometheus metrics on this port
    #[arg(long)]
    pub metrics_port: Option<u16>,
}

#[derive(Args, Debug, Clone)]
pub struct RevertCheckArgs {
    /// Transaction hash to check (e.g. 0x1234...)
    #[arg(long)]
    pub tx_hash: String,

    /// HTTP endpoint of the execution node
    #[arg(long, env = "RPC_URL")]
    pub rpc_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    spammer: SpamArgs,
}

/// Validated, immutable parameters of one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub signer: Signer,
    pub recipient: Address,
    pub amount_wei: U256,
    pub rpc_urls: Vec<String>,
    pub count: u64,
    pub max_batch_size: usize,
    pub batch_interval: Duration,
    pub slots: Vec<u8>,
    pub beacon_rpc_url: Option<String>,
    pub submit_timeout: Duration,
    pub metrics_port: Option<u16>,
}

impl SpamArgs {
    /// Fill unset fields from `fallback`
    fn or(self, fallback: SpamArgs) -> SpamArgs {
        fn pick_vec<T>(primary: Vec<T>, fallback: Vec<T>) -> Vec<T> {
            if primary.is_empty() {
                fallback
            } else {
                primary
            }
        }

        SpamArgs {
            config: self.config.or(fallback.config),
            private_key: non_blank(self.private_key).or(non_blank(fallback.private_key)),
            recipient: non_blank(self.recipient).or(non_blank(fallback.recipient)),
            rpc_urls: pick_vec(self.rpc_urls, fallback.rpc_urls),
            amount: self.amount.or(fallback.amount),
            count: self.count.or(fallback.count),
            batch_size: self.batch_size.or(fallback.batch_size),
            sleep: self.sleep.or(fallback.sleep),
            slots: pick_vec(self.slots, fallback.slots),
            beacon_rpc_url: non_blank(self.beacon_rpc_url).or(non_blank(fallback.beacon_rpc_url)),
            submit_timeout: self.submit_timeout.or(fallback.submit_timeout),
            metrics_port: self.metrics_port.or(fallback.metrics_port),
        }
    }
}

impl RunConfig {
    /// Resolve command line settings, merged over the settings file if one is
    /// given, into a validated run configuration. No network access happens here.
    pub fn resolve(args: SpamArgs) -> SpammerResult<Self> {
        let file = match &args.config {
            Some(path) => load_settings_file(path)?,
            None => SpamArgs::default(),
        };
        Self::from_settings(args.or(file))
    }

    fn from_settings(settings: SpamArgs) -> SpammerResult<Self> {
        let private_key = settings
            .private_key
            .ok_or_else(|| SpammerError::Config("PRIVATE_KEY is not set".into()))?;
        let signer = Signer::from_private_key(&private_key)
            .map_err(|e| SpammerError::Config(e.to_string()))?;

        let recipient = settings
            .recipient
            .ok_or_else(|| SpammerError::Config("RECIPIENT_ADDRESS is not set".into()))?;
        let recipient = recipient
            .trim()
            .parse::<Address>()
            .map_err(|e| SpammerError::Config(format!("Invalid recipient {}: {}", recipient, e)))?;

        let amount = settings.amount.unwrap_or(DEFAULT_AMOUNT_ETH);
        if !amount.is_finite() || amount < 0.0 {
            return Err(SpammerError::Config(format!("Invalid amount {}", amount)));
        }
        let amount_wei = ethers::utils::parse_ether(amount)
            .map_err(|e| SpammerError::Config(format!("Invalid amount {}: {}", amount, e)))?;

        let sleep = settings.sleep.unwrap_or(DEFAULT_SLEEP_SECS);
        let batch_interval = Duration::try_from_secs_f64(sleep)
            .map_err(|e| SpammerError::Config(format!("Invalid sleep {}: {}", sleep, e)))?;

        let config = RunConfig {
            signer,
            recipient,
            amount_wei,
            rpc_urls: settings.rpc_urls,
            count: settings.count.unwrap_or(DEFAULT_COUNT),
            max_batch_size: settings.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            batch_interval,
            slots: settings.slots,
            beacon_rpc_url: non_blank(settings.beacon_rpc_url),
            submit_timeout: Duration::from_secs(
                settings.submit_timeout.unwrap_or(DEFAULT_SUBMIT_TIMEOUT_SECS),
            ),
            metrics_port: settings.metrics_port,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> SpammerResult<()> {
        if self.rpc_urls.iter().all(|u| u.trim().is_empty()) {
            return Err(SpammerError::Config("No RPC URL configured".into()));
        }
        if self.count == 0 {
            return Err(SpammerError::Config("count must be at least 1".into()));
        }
        if self.max_batch_size == 0 {
            return Err(SpammerError::Config("batch size must be at least 1".into()));
        }
        if let Some(slot) = self.slots.iter().find(|&&s| u64::from(s) >= SLOTS_PER_EPOCH) {
            return Err(SpammerError::Config(format!(
                "Slot {} out of range 0-{}",
                slot,
                SLOTS_PER_EPOCH - 1
            )));
        }
        if !self.slots.is_empty() && self.beacon_rpc_url.is_none() {
            return Err(SpammerError::SchedulingPrecondition {
                slots: self.slots.clone(),
            });
        }
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn load_settings_file(path: &Path) -> SpammerResult<SpamArgs> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        SpammerError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;

    // Substitute environment variables
    let raw = substitute_env_vars(&raw);

    let file: SettingsFile = toml::from_str(&raw).map_err(|e| {
        SpammerError::Config(format!("Failed to parse config file {:?}: {}", path, e))
    })?;
    Ok(file.spammer)
}

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR
        .replace_all(input, |caps: &regex::Captures| {
            env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}
