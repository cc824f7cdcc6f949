//! Configuration management for the explorer.
//!
//! Supports loading from environment variables, config files, and CLI arguments.

use crate::aggregate_graph::MAX_TRANSACTIONS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main explorer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// Etherscan API key (only required for fetching)
    #[serde(default)]
    pub etherscan_api_key: String,

    /// Etherscan API endpoint
    #[serde(default = "default_etherscan_url")]
    pub etherscan_base_url: String,

    /// Token contract whose transfers are collected
    #[serde(default = "default_contract_address")]
    pub contract_address: String,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limits: RateLimitConfig,

    /// Input and output paths
    #[serde(default)]
    pub paths: PathConfig,

    /// Graph and highlight settings
    #[serde(default)]
    pub graph: GraphConfig,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            etherscan_api_key: String::new(),
            etherscan_base_url: default_etherscan_url(),
            contract_address: default_contract_address(),
            rate_limits: RateLimitConfig::default(),
            paths: PathConfig::default(),
            graph: GraphConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per second
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,

    /// Maximum retry attempts per page
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff (ms)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Records requested per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Maximum pages fetched per contract
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rps(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            page_size: default_page_size(),
            max_pages: default_max_pages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_dataset_file")]
    pub dataset_file: PathBuf,

    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,

    #[serde(default = "default_metadata_dir")]
    pub metadata_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            dataset_file: default_dataset_file(),
            export_dir: default_export_dir(),
            metadata_dir: default_metadata_dir(),
        }
    }
}

impl PathConfig {
    /// Re-root every path under `data_dir`
    pub fn rebase(&mut self, data_dir: PathBuf) {
        self.dataset_file = data_dir.join("result.csv");
        self.export_dir = data_dir.join("processed");
        self.metadata_dir = data_dir.join("metadata");
        self.data_dir = data_dir;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Cap on transactions per snapshot (first N in input order)
    #[serde(default = "default_max_transactions")]
    pub max_transactions: usize,

    /// Number of transactions emphasized by the top-K highlight
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Same-day appearance count an address must exceed to be high-frequency
    #[serde(default = "default_high_frequency_threshold")]
    pub high_frequency_threshold: usize,

    /// Edge layout used when exporting snapshots
    #[serde(default)]
    pub edge_mode: EdgeMode,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_transactions: default_max_transactions(),
            top_k: default_top_k(),
            high_frequency_threshold: default_high_frequency_threshold(),
            edge_mode: EdgeMode::default(),
        }
    }
}

/// How exported edges relate to transactions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgeMode {
    /// One edge per transaction
    #[default]
    PerTransaction,
    /// One edge per ordered (source, target) pair with summed weight
    MergedByPair,
}

// Default value functions
fn default_etherscan_url() -> String {
    "https://api.etherscan.io/api".to_string()
}

fn default_contract_address() -> String {
    "0xfbe6f37d3db3fc939f665cfe21238c11a5447831".to_string()
}

fn default_rps() -> u32 {
    5 // Etherscan free tier
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_page_size() -> usize {
    1000
}

fn default_max_pages() -> usize {
    10
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_dataset_file() -> PathBuf {
    PathBuf::from("data/result.csv")
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("data/processed")
}

fn default_metadata_dir() -> PathBuf {
    PathBuf::from("data/metadata")
}

fn default_max_transactions() -> usize {
    MAX_TRANSACTIONS
}

fn default_top_k() -> usize {
    10
}

fn default_high_frequency_threshold() -> usize {
    5
}

impl ExplorerConfig {
    /// Load configuration from environment (and `.env`)
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML config file with environment overrides
    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = ::toml::from_str(&contents)?;

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("ETHERSCAN_API_KEY") {
            self.etherscan_api_key = key;
        }
        if let Ok(url) = std::env::var("ETHERSCAN_BASE_URL") {
            self.etherscan_base_url = url;
        }
    }

    /// Validate numeric settings
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.graph.max_transactions == 0 {
            anyhow::bail!("graph.max_transactions must be > 0");
        }
        if self.graph.top_k == 0 {
            anyhow::bail!("graph.top_k must be > 0");
        }
        if self.rate_limits.requests_per_second == 0 {
            anyhow::bail!("rate_limits.requests_per_second must be > 0");
        }
        if self.rate_limits.page_size == 0 {
            anyhow::bail!("rate_limits.page_size must be > 0");
        }
        Ok(())
    }

    /// Ensure all output directories exist
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.paths.data_dir)?;
        std::fs::create_dir_all(&self.paths.export_dir)?;
        std::fs::create_dir_all(&self.paths.metadata_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExplorerConfig::default();
        assert_eq!(config.graph.max_transactions, 1000);
        assert_eq!(config.graph.top_k, 10);
        assert_eq!(config.graph.high_frequency_threshold, 5);
        assert_eq!(config.graph.edge_mode, EdgeMode::PerTransaction);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ExplorerConfig = toml::from_str(
            r#"
            contract_address = "0xd8da6bf26964af9d7eed9e03e53415d37aa96045"

            [graph]
            top_k = 3
            edge_mode = "merged_by_pair"
            "#,
        )
        .unwrap();

        assert_eq!(config.graph.top_k, 3);
        assert_eq!(config.graph.max_transactions, 1000);
        assert_eq!(config.graph.edge_mode, EdgeMode::MergedByPair);
        assert_eq!(config.rate_limits.requests_per_second, 5);
        assert_eq!(config.paths.dataset_file, PathBuf::from("data/result.csv"));
    }

    #[test]
    fn test_validate_rejects_zero_cap() {
        let mut config = ExplorerConfig::default();
        config.graph.max_transactions = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rebase_paths() {
        let mut paths = PathConfig::default();
        paths.rebase(PathBuf::from("/tmp/run"));
        assert_eq!(paths.dataset_file, PathBuf::from("/tmp/run/result.csv"));
        assert_eq!(paths.export_dir, PathBuf::from("/tmp/run/processed"));
    }
}
