//! Beacon-chain API client, used only to anchor slot arithmetic at genesis

use crate::error::{SpammerError, SpammerResult};

use serde::{Deserialize, Deserializer};
use std::time::Duration;
use tracing::debug;

const GENESIS_PATH: &str = "/eth/v1/beacon/genesis";

/// Client for a consensus-layer node's REST API
pub struct BeaconClient {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GenesisResponse {
    data: GenesisData,
}

#[derive(Debug, Deserialize)]
struct GenesisData {
    #[serde(deserialize_with = "u64_from_string_or_number")]
    genesis_time: u64,
}

impl BeaconClient {
    pub fn new(base_url: &str) -> SpammerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SpammerError::Beacon(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Fetch the chain's genesis timestamp in unix seconds
    pub async fn genesis_time(&self) -> SpammerResult<u64> {
        let url = format!("{}{}", self.base_url, GENESIS_PATH);

        let body = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| SpammerError::Beacon(format!("GET {}: {}", url, e)))?
            .text()
            .await
            .map_err(|e| SpammerError::Beacon(e.to_string()))?;

        let genesis_time = parse_genesis(&body)?;
        debug!(genesis_time, "Fetched beacon genesis");
        Ok(genesis_time)
    }
}

fn parse_genesis(body: &str) -> SpammerResult<u64> {
    let resp: GenesisResponse = serde_json::from_str(body)
        .map_err(|e| SpammerError::Beacon(format!("Malformed genesis response: {}", e)))?;
    Ok(resp.data.genesis_time)
}

/// Beacon nodes serve integers as decimal strings; accept both forms
fn u64_from_string_or_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
