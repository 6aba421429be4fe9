//! Client configuration
//!
//! Loaded from a TOML file, from `ZKAPP_*` environment variables (a `.env`
//! file is honoured), or both with the environment taking precedence.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::network::{EndpointList, NetworkOptions};
use crate::rpc_manager::rpc_config::validate_url;
use crate::rpc_manager::HttpConfig;
use crate::submission::{FundingOptions, WaitOptions, DEFAULT_FAUCET_URL};
use crate::tx_builder::TransactionLimits;
use crate::types::NetworkId;

/// Invalid configuration values
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid network configuration: {0}")]
    Network(String),

    #[error("Invalid URL for {field}: {message}")]
    Url { field: &'static str, message: String },

    #[error("{0} must be > 0")]
    Zero(&'static str),
}

/// Logging settings passed to `init_tracing`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl LoggingConfig {
    /// Install the global subscriber described by this config
    pub fn install(&self) -> anyhow::Result<()> {
        crate::observability::init_tracing(&self.filter, self.json)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

/// Everything needed to talk to a network and wait for transactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Query endpoint(s), archive endpoint(s) and network id
    #[serde(default = "default_network")]
    pub network: NetworkOptions,

    #[serde(default)]
    pub http: HttpConfig,

    /// Confirmation polling
    #[serde(default)]
    pub polling: WaitOptions,

    /// Faucet funding polling
    #[serde(default)]
    pub funding: FundingOptions,

    /// Whether lazy proofs are generated before sending
    #[serde(default = "default_true")]
    pub proofs_enabled: bool,

    #[serde(default)]
    pub limits: TransactionLimits,

    #[serde(default = "default_faucet_url")]
    pub faucet_url: String,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_network() -> NetworkOptions { NetworkOptions::Url("http://127.0.0.1:8080/graphql".to_string()) }
fn default_true() -> bool { true }
fn default_faucet_url() -> String { DEFAULT_FAUCET_URL.to_string() }
fn default_log_filter() -> String { "info".to_string() }

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            http: HttpConfig::default(),
            polling: WaitOptions::default(),
            funding: FundingOptions::default(),
            proofs_enabled: default_true(),
            limits: TransactionLimits::default(),
            faucet_url: default_faucet_url(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow!("Failed to read config file: {}", e))?;

        let config: ClientConfig =
            toml::from_str(&contents).map_err(|e| anyhow!("Failed to parse TOML config: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file, then apply environment overrides
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.from_env()?;
        Ok(config)
    }

    /// Create configuration from default with environment overrides
    pub fn with_env_overrides() -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        config.from_env()?;
        Ok(config)
    }

    /// Apply `ZKAPP_*` environment variables on top of the current values
    pub fn from_env(&mut self) -> Result<()> {
        let (mut mina, mut archive, mut network_id) = split_network(&self.network);

        if let Ok(url) = std::env::var("ZKAPP_GRAPHQL_URL") {
            mina = vec![url];
        }
        if let Ok(urls) = std::env::var("ZKAPP_FALLBACK_URLS") {
            mina.truncate(1);
            mina.extend(
                urls.split(',')
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(String::from),
            );
        }
        if let Ok(url) = std::env::var("ZKAPP_ARCHIVE_URL") {
            archive = Some(vec![url]);
        }
        if let Ok(id) = std::env::var("ZKAPP_NETWORK_ID") {
            network_id = Some(NetworkId::from(id));
        }
        self.network = NetworkOptions::Detailed {
            mina: EndpointList::Many(mina),
            archive: archive.map(EndpointList::Many),
            network_id,
        };

        if let Ok(timeout) = std::env::var("ZKAPP_HTTP_TIMEOUT_MS") {
            self.http.timeout_ms = timeout
                .parse()
                .map_err(|e| anyhow!("Invalid ZKAPP_HTTP_TIMEOUT_MS: {}", e))?;
        }

        if let Ok(credentials) = std::env::var("ZKAPP_GRAPHQL_TOKEN") {
            self.http.credentials = Some(credentials);
        }

        if let Ok(attempts) = std::env::var("ZKAPP_MAX_ATTEMPTS") {
            self.polling.max_attempts = attempts
                .parse()
                .map_err(|e| anyhow!("Invalid ZKAPP_MAX_ATTEMPTS: {}", e))?;
        }

        if let Ok(interval) = std::env::var("ZKAPP_POLL_INTERVAL_MS") {
            self.polling.interval_ms = interval
                .parse()
                .map_err(|e| anyhow!("Invalid ZKAPP_POLL_INTERVAL_MS: {}", e))?;
        }

        if let Ok(enabled) = std::env::var("ZKAPP_PROOFS_ENABLED") {
            self.proofs_enabled = enabled
                .parse()
                .map_err(|e| anyhow!("Invalid ZKAPP_PROOFS_ENABLED: {}", e))?;
        }

        if let Ok(url) = std::env::var("ZKAPP_FAUCET_URL") {
            self.faucet_url = url;
        }

        if let Ok(filter) = std::env::var("ZKAPP_LOG") {
            self.logging.filter = filter;
        }

        if let Ok(json) = std::env::var("ZKAPP_LOG_JSON") {
            self.logging.json = json
                .parse()
                .map_err(|e| anyhow!("Invalid ZKAPP_LOG_JSON: {}", e))?;
        }

        self.validate()?;
        Ok(())
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.network
            .clone()
            .resolve()
            .map_err(|e| ConfigError::Network(e.to_string()))?;
        validate_url(&self.faucet_url).map_err(|message| ConfigError::Url {
            field: "faucet_url",
            message,
        })?;

        if self.http.timeout_ms == 0 {
            return Err(ConfigError::Zero("http.timeout_ms"));
        }
        if self.http.status_depth == 0 {
            return Err(ConfigError::Zero("http.status_depth"));
        }
        if self.polling.max_attempts == 0 {
            return Err(ConfigError::Zero("polling.max_attempts"));
        }
        if self.funding.max_attempts == 0 {
            return Err(ConfigError::Zero("funding.max_attempts"));
        }
        if self.limits.max_account_updates == 0 {
            return Err(ConfigError::Zero("limits.max_account_updates"));
        }
        if self.limits.max_encoded_bytes == 0 {
            return Err(ConfigError::Zero("limits.max_encoded_bytes"));
        }
        Ok(())
    }
}

fn split_network(options: &NetworkOptions) -> (Vec<String>, Option<Vec<String>>, Option<NetworkId>) {
    match options.clone() {
        NetworkOptions::Url(url) => (vec![url], None, None),
        NetworkOptions::Detailed {
            mina,
            archive,
            network_id,
        } => (mina.into_vec(), archive.map(EndpointList::into_vec), network_id),
    }
}
