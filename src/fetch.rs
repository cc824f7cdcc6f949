//! Etherscan token-transfer client with rate limiting and retry logic.
//!
//! Implements the upstream collaborator contract: given a contract address,
//! return the raw transfer records, or an empty sequence on any failure.
//! Normalization of the records is left to [`crate::normalize`].

use crate::config::{ExplorerConfig, RateLimitConfig};
use crate::ethereum::ContractAddress;
use governor::{Quota, RateLimiter};
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("Rate limited: {0}")]
    RateLimited(String),
}

/// Decode the `result` field of a token-transfer response.
///
/// A list yields its records; a string is parsed as a JSON list when
/// possible; any other shape yields nothing.
pub fn parse_result_payload(payload: &Value) -> Vec<Value> {
    match payload.get("result") {
        Some(Value::Array(records)) => records.clone(),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(records)) => records,
            _ => {
                debug!("Non-list result payload: {}", raw);
                Vec::new()
            }
        },
        _ => Vec::new(),
    }
}

/// Etherscan signals throttling with a string result rather than an HTTP status
fn rate_limit_message(payload: &Value) -> Option<&str> {
    payload
        .get("result")
        .and_then(Value::as_str)
        .filter(|msg| msg.to_lowercase().contains("rate limit"))
}

/// Rate-limited Etherscan client
pub struct EtherscanClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    rate_limiter: RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
    config: RateLimitConfig,
}

impl EtherscanClient {
    pub fn new(base_url: String, api_key: String, config: RateLimitConfig) -> Result<Self, FetchError> {
        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rps));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key,
            rate_limiter,
            config,
        })
    }

    pub fn from_config(config: &ExplorerConfig) -> Result<Self, FetchError> {
        Self::new(
            config.etherscan_base_url.clone(),
            config.etherscan_api_key.clone(),
            config.rate_limits.clone(),
        )
    }

    /// One raw request for a page of transfers
    async fn request_page(
        &self,
        contract_address: &str,
        page: usize,
        offset: usize,
    ) -> Result<Value, FetchError> {
        self.rate_limiter.until_ready().await;

        let page = page.to_string();
        let offset = offset.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("module", "account"),
                ("action", "tokentx"),
                ("contractaddress", contract_address),
                ("startblock", "0"),
                ("endblock", "999999999"),
                ("page", page.as_str()),
                ("offset", offset.as_str()),
                ("sort", "asc"),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let payload: Value = serde_json::from_slice(&response.bytes().await?)?;
        if let Some(msg) = rate_limit_message(&payload) {
            return Err(FetchError::RateLimited(msg.to_string()));
        }
        Ok(payload)
    }

    /// Fetch one page of raw transfer records.
    ///
    /// Retries with exponential backoff; returns an empty vector once retries
    /// are exhausted.
    pub async fn get_token_transfers(
        &self,
        contract_address: &str,
        page: usize,
        offset: usize,
    ) -> Vec<Value> {
        let mut delay = Duration::from_millis(self.config.base_delay_ms);
        let attempts = self.config.max_retries + 1;

        for attempt in 1..=attempts {
            match self.request_page(contract_address, page, offset).await {
                Ok(payload) => return parse_result_payload(&payload),
                Err(e) if attempt < attempts => {
                    warn!(
                        "[attempt {}] Failed to fetch page {} for {}: {}, retrying in {:?}",
                        attempt, page, contract_address, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    warn!(
                        "Giving up on page {} for {} after {} attempts: {}",
                        page, contract_address, attempts, e
                    );
                }
            }
        }

        Vec::new()
    }

    /// Fetch every page of transfers for a contract, oldest first
    pub async fn fetch_all(&self, contract_address: &str) -> Vec<Value> {
        let contract = match ContractAddress::parse(contract_address) {
            Ok(address) => address.to_query_string(),
            Err(e) => {
                warn!("Not fetching for invalid contract address: {}", e);
                return Vec::new();
            }
        };
        let contract_address = contract.as_str();

        let page_size = self.config.page_size;
        let mut records = Vec::new();

        for page in 1..=self.config.max_pages {
            let batch = self
                .get_token_transfers(contract_address, page, page_size)
                .await;
            let received = batch.len();
            records.extend(batch);

            info!(
                "{} page {} -> {} records ({} total)",
                contract_address,
                page,
                received,
                records.len()
            );

            if received < page_size {
                break;
            }
        }

        records
    }
}
