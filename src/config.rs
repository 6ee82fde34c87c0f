//! Configuration module for the MEV sentry
//!
//! Loads the TOML configuration file (after `.env` has been applied to the process
//! environment) and validates the static peer lists before any peer is built.

use alloy::primitives::{Address, U256};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::gateway::strip_port;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Inbound JSON-RPC service
    #[serde(default)]
    pub service: ServiceConfig,

    /// Validators this sentry fronts, keyed by public hostname
    #[serde(default)]
    pub validators: Vec<ValidatorConfig>,

    /// Builders that may receive issue reports, keyed by address
    #[serde(default)]
    pub builders: Vec<BuilderConfig>,

    /// Background peer state polling
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// HTTP client used for every upstream peer
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Prometheus endpoint
    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Address the JSON-RPC server binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Maximum concurrently served calls, zero or negative for unbounded
    #[serde(default)]
    pub rpc_concurrency: i64,

    /// Per-call deadline in milliseconds, zero for none
    #[serde(default)]
    pub rpc_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Private JSON-RPC endpoint of the validator
    pub url: String,

    /// Public hostname callers use to reach this validator through the sentry
    pub hostname: String,

    /// Static builder fee ceiling in wei; read from the validator's params when absent
    #[serde(default)]
    pub fee_ceiling: Option<U256>,

    /// Payment account
    pub account: AccountConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// `privateKey` or `keystore`
    pub mode: String,

    #[serde(default)]
    pub private_key: Option<String>,

    /// Keystore file, or keystore directory searched by `address`
    #[serde(default)]
    pub keystore_path: Option<PathBuf>,

    /// File holding the keystore password, removed once read
    #[serde(default)]
    pub password_file_path: Option<PathBuf>,

    #[serde(default)]
    pub address: Option<String>,
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("mode", &self.mode)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("keystore_path", &self.keystore_path)
            .field("password_file_path", &self.password_file_path)
            .field("address", &self.address)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderConfig {
    pub address: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Interval between peer state refresh ticks
    #[serde(default = "default_refresh_interval_ms")]
    pub interval_ms: u64,

    /// Upper bound for each individual refresh fetch
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,

    #[serde(default = "default_pool_idle_timeout_secs")]
    pub pool_idle_timeout_secs: u64,

    #[serde(default = "default_tcp_keepalive_secs")]
    pub tcp_keepalive_secs: u64,

    /// Accept self-signed certificates on private validator endpoints
    #[serde(default = "default_true")]
    pub insecure_skip_verify: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_metrics_listen_addr")]
    pub listen_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Also write logs to `<dir>/mev-sentry.log`
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

// Default value functions
fn default_listen_addr() -> String { "0.0.0.0:8555".to_string() }
fn default_refresh_interval_ms() -> u64 { 1_000 }
fn default_fetch_timeout_ms() -> u64 { 800 }
fn default_request_timeout_ms() -> u64 { 5_000 }
fn default_connect_timeout_ms() -> u64 { 5_000 }
fn default_pool_max_idle_per_host() -> usize { 50 }
fn default_pool_idle_timeout_secs() -> u64 { 90 }
fn default_tcp_keepalive_secs() -> u64 { 60 }
fn default_metrics_listen_addr() -> String { "0.0.0.0:6060".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_true() -> bool { true }

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            rpc_concurrency: 0,
            rpc_timeout_ms: 0,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_refresh_interval_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
            pool_idle_timeout_secs: default_pool_idle_timeout_secs(),
            tcp_keepalive_secs: default_tcp_keepalive_secs(),
            insecure_skip_verify: default_true(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            listen_addr: default_metrics_listen_addr(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            dir: None,
        }
    }
}

impl ServiceConfig {
    /// Per-call deadline, `None` when disabled
    pub fn rpc_timeout(&self) -> Option<Duration> {
        (self.rpc_timeout_ms > 0).then(|| Duration::from_millis(self.rpc_timeout_ms))
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl BuilderConfig {
    pub fn parsed_address(&self) -> anyhow::Result<Address> {
        self.address
            .parse::<Address>()
            .with_context(|| format!("invalid builder address {}", self.address))
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path))?;
        Self::from_toml(&content)
    }

    /// Load configuration after applying `.env` to the process environment
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_file(path)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the sentry cannot route with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.refresh.interval_ms == 0 {
            bail!("refresh.interval_ms must be greater than zero");
        }
        if self.refresh.fetch_timeout_ms >= self.refresh.interval_ms {
            bail!(
                "refresh.fetch_timeout_ms ({}) must be below refresh.interval_ms ({})",
                self.refresh.fetch_timeout_ms,
                self.refresh.interval_ms
            );
        }

        let mut hostnames = HashSet::new();
        for validator in &self.validators {
            if validator.hostname.is_empty() {
                bail!("validator {} has an empty hostname", validator.url);
            }
            if strip_port(&validator.hostname) != validator.hostname {
                bail!(
                    "validator hostname {} must be a bare host without port or brackets",
                    validator.hostname
                );
            }
            if !hostnames.insert(validator.hostname.to_ascii_lowercase()) {
                bail!("duplicate validator hostname {}", validator.hostname);
            }
        }

        let mut addresses = HashSet::new();
        for builder in &self.builders {
            let address = builder.parsed_address()?;
            if !addresses.insert(address) {
                bail!("duplicate builder address {}", builder.address);
            }
        }

        Ok(())
    }
}
