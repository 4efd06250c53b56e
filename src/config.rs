//! Configuration management
//!
//! This module handles loading and managing configuration from:
//! - Command-line arguments
//! - Environment variables
//! - Configuration files (TOML)
//! - Defaults

use crate::chain::Address;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Parent hash of the first block on an EVM chain
pub const ZERO_HASH: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub default: DefaultConfig,

    #[serde(default)]
    pub rpc: RpcConfig,

    #[serde(default)]
    pub sweep: SweepConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Default settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultConfig {
    #[serde(default = "default_source")]
    pub source: String,

    /// Account IOUs are written from
    pub account: Option<String>,
}

/// JSON-RPC node and contract configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Node endpoint
    pub url: Option<String>,

    /// Address of the IOU contract
    pub contract_address: Option<String>,

    /// Parent hash that marks the start of history
    #[serde(default = "default_genesis_sentinel")]
    pub genesis_sentinel: String,

    /// Upper bound on blocks visited per history scan
    pub max_blocks: Option<u64>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Interval between transaction receipt polls in milliseconds
    #[serde(default = "default_receipt_poll_interval")]
    pub receipt_poll_interval_ms: u64,

    /// Give up waiting for a receipt after this many seconds
    #[serde(default = "default_receipt_timeout")]
    pub receipt_timeout_secs: u64,
}

/// Cycle sweep configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Submit each distinct loop once per sweep
    #[serde(default = "default_true")]
    pub dedupe_cycles: bool,

    /// Pairwise debt queries in flight during a rebuild
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable caching
    #[serde(default)]
    pub enabled: bool,

    /// Cache directory
    pub directory: Option<PathBuf>,

    /// Cache TTL in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions

fn default_source() -> String {
    "rpc".to_string()
}

fn default_genesis_sentinel() -> String {
    ZERO_HASH.to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_receipt_poll_interval() -> u64 {
    250
}

fn default_receipt_timeout() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent_queries() -> usize {
    8
}

fn default_cache_ttl() -> u64 {
    24 * 60 * 60
}

fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            account: None,
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: None,
            contract_address: None,
            genesis_sentinel: default_genesis_sentinel(),
            max_blocks: None,
            request_timeout_secs: default_request_timeout(),
            receipt_poll_interval_ms: default_receipt_poll_interval(),
            receipt_timeout_secs: default_receipt_timeout(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            dedupe_cycles: true,
            max_concurrent_queries: default_max_concurrent_queries(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: None,
            ttl_secs: default_cache_ttl(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Failed to read config file {:?}: {}", path, e)))?;

        toml::from_str(&contents).map_err(|e| Error::ConfigParse {
            file: path,
            message: e.to_string(),
        })
    }

    /// Load configuration from default locations
    ///
    /// Searches in order:
    /// 1. ./config.toml
    /// 2. ~/.iou-netting/config.toml
    /// 3. /etc/iou-netting/config.toml
    pub fn load() -> Result<Self> {
        let mut paths = vec![PathBuf::from("config.toml")];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".iou-netting").join("config.toml"));
        }
        paths.push(PathBuf::from("/etc/iou-netting/config.toml"));

        for path in paths {
            if path.exists() {
                tracing::info!("Loading config from {:?}", path);
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    /// Get the node URL from config or environment
    pub fn rpc_url(&self) -> Result<String> {
        if let Some(url) = &self.rpc.url {
            return Ok(url.clone());
        }

        std::env::var("IOU_RPC_URL").map_err(|_| {
            Error::MissingConfig(
                "RPC url not found. Set IOU_RPC_URL environment variable or configure [rpc] url"
                    .to_string(),
            )
        })
    }

    /// Get the contract address from config or environment
    pub fn contract_address(&self) -> Result<Address> {
        self.rpc
            .contract_address
            .clone()
            .or_else(|| std::env::var("IOU_CONTRACT_ADDRESS").ok())
            .map(Address::new)
            .ok_or_else(|| {
                Error::MissingConfig(
                    "Contract address not found. Set IOU_CONTRACT_ADDRESS environment variable or configure [rpc] contract_address"
                        .to_string(),
                )
            })
    }

    /// Get the writing account from config or environment
    pub fn account(&self) -> Result<Address> {
        self.default
            .account
            .clone()
            .or_else(|| std::env::var("IOU_ACCOUNT").ok())
            .map(Address::new)
            .ok_or_else(|| {
                Error::MissingConfig(
                    "Account not found. Set IOU_ACCOUNT environment variable, pass --account or configure [default] account"
                        .to_string(),
                )
            })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    /// Get cache directory with fallback to default
    pub fn cache_directory(&self) -> PathBuf {
        self.cache.directory.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .map(|h| h.join("iou-netting"))
                .unwrap_or_else(|| PathBuf::from("/tmp/iou-netting-cache"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default.source, "rpc");
        assert_eq!(config.rpc.genesis_sentinel, ZERO_HASH);
        assert!(config.rpc.max_blocks.is_none());
        assert!(config.sweep.dedupe_cycles);
        assert_eq!(config.sweep.max_concurrent_queries, 8);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_toml_config() {
        let toml = r#"
[default]
source = "mock"
account = "0xF39FD6E51AAD88F6F4CE6AB8827279CFFFB92266"

[rpc]
url = "http://localhost:8545"
contract_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
max_blocks = 5000

[sweep]
dedupe_cycles = false

[logging]
level = "debug"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.default.source, "mock");
        assert_eq!(
            config.account().unwrap().as_str(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert_eq!(config.rpc_url().unwrap(), "http://localhost:8545");
        assert_eq!(
            config.contract_address().unwrap().as_str(),
            "0x5fbdb2315678afecb367f032d93f642f64180aa3"
        );
        assert_eq!(config.rpc.max_blocks, Some(5000));
        assert_eq!(config.rpc.genesis_sentinel, ZERO_HASH);
        assert!(!config.sweep.dedupe_cycles);
        assert_eq!(config.sweep.max_concurrent_queries, 8);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_from_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sweep]\nmax_concurrent_queries = \"many\"\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        match err {
            Error::ConfigParse { file, .. } => assert_eq!(file, path),
            other => panic!("unexpected error: {other}"),
        }
    }
}
