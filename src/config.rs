//! Configuration management with validation and defaults
//!
//! Configuration is loaded from defaults or a TOML file, then overridden by
//! `SHOOTOUT_*` environment variables, then validated.

use crate::errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Default gas budget for the oracle callback
pub const DEFAULT_CALLBACK_GAS_LIMIT: u64 = 700_000;

/// Top-level configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShootoutConfig {
    pub request: RequestConfig,
    pub devnet: DevnetConfig,
    pub logging: LoggingConfig,
}

/// Randomness request settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RequestConfig {
    /// Gas budget handed to the pricing oracle and attached to the request
    pub callback_gas_limit: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            callback_gas_limit: DEFAULT_CALLBACK_GAS_LIMIT,
        }
    }
}

/// In-process devnet settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DevnetConfig {
    /// Wei charged per unit of callback gas
    pub gas_price_wei: u64,
    /// Flat wei charged per request
    pub base_fee_wei: u64,
    /// Delay between submission and the mined receipt
    pub confirmation_delay_ms: u64,
    /// How long a confirmation waiter blocks before giving up
    pub confirmation_timeout_ms: u64,
    /// Balance of the simulated player account
    pub starting_balance_wei: u64,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            gas_price_wei: 1_000_000_000, // 1 gwei
            base_fee_wei: 50_000_000_000_000,
            confirmation_delay_ms: 250,
            confirmation_timeout_ms: 30_000,
            starting_balance_wei: 5_000_000_000_000_000_000, // 5 ether
        }
    }
}

impl DevnetConfig {
    pub fn confirmation_delay(&self) -> Duration {
        Duration::from_millis(self.confirmation_delay_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }
}

/// Log filter settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter directive, overridden by `RUST_LOG`
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ShootoutConfig {
    /// Fast devnet timings for tests and demos
    pub fn fast_devnet() -> Self {
        Self {
            devnet: DevnetConfig {
                confirmation_delay_ms: 5,
                confirmation_timeout_ms: 2_000,
                ..DevnetConfig::default()
            },
            ..Self::default()
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.request.callback_gas_limit == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "request.callback_gas_limit".to_string(),
                value: "0".to_string(),
                reason: "Callback gas limit must be positive".to_string(),
            });
        }

        if self.devnet.confirmation_timeout_ms == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "devnet.confirmation_timeout_ms".to_string(),
                value: "0".to_string(),
                reason: "Confirmation timeout cannot be zero".to_string(),
            });
        }

        if self.devnet.confirmation_timeout_ms < self.devnet.confirmation_delay_ms {
            return Err(ConfigurationError::InvalidValue {
                field: "devnet.confirmation_timeout_ms".to_string(),
                value: self.devnet.confirmation_timeout_ms.to_string(),
                reason: format!(
                    "Timeout must be at least the confirmation delay ({}ms)",
                    self.devnet.confirmation_delay_ms
                ),
            });
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigurationError::InvalidValue {
                field: "logging.level".to_string(),
                value: String::new(),
                reason: "Log level cannot be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration loader with environment variable support
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> Result<ShootoutConfig, ConfigurationError> {
        let mut config = match self.config_path {
            Some(ref path) => self.load_from_file(path)?,
            None => ShootoutConfig::default(),
        };

        apply_overrides(&mut config, |key| env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> Result<ShootoutConfig, ConfigurationError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)))
    }

    /// Save configuration to file
    pub fn save(&self, config: &ShootoutConfig, path: &str) -> Result<(), ConfigurationError> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to write to {}: {}", path, e)))
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: String, reason: &str) -> Result<T, ConfigurationError> {
    value.parse().map_err(|_| ConfigurationError::InvalidValue {
        field: key.to_string(),
        value,
        reason: reason.to_string(),
    })
}

/// Apply `SHOOTOUT_*` overrides read through `lookup`
fn apply_overrides<F>(config: &mut ShootoutConfig, lookup: F) -> Result<(), ConfigurationError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup("SHOOTOUT_CALLBACK_GAS_LIMIT") {
        config.request.callback_gas_limit =
            parse_override("SHOOTOUT_CALLBACK_GAS_LIMIT", value, "Invalid gas limit")?;
    }
    if let Some(value) = lookup("SHOOTOUT_GAS_PRICE_WEI") {
        config.devnet.gas_price_wei = parse_override("SHOOTOUT_GAS_PRICE_WEI", value, "Invalid wei amount")?;
    }
    if let Some(value) = lookup("SHOOTOUT_CONFIRMATION_DELAY_MS") {
        config.devnet.confirmation_delay_ms =
            parse_override("SHOOTOUT_CONFIRMATION_DELAY_MS", value, "Invalid delay value")?;
    }
    if let Some(value) = lookup("SHOOTOUT_CONFIRMATION_TIMEOUT_MS") {
        config.devnet.confirmation_timeout_ms =
            parse_override("SHOOTOUT_CONFIRMATION_TIMEOUT_MS", value, "Invalid timeout value")?;
    }
    if let Some(value) = lookup("SHOOTOUT_STARTING_BALANCE_WEI") {
        config.devnet.starting_balance_wei =
            parse_override("SHOOTOUT_STARTING_BALANCE_WEI", value, "Invalid wei amount")?;
    }
    if let Some(level) = lookup("SHOOTOUT_LOG_LEVEL") {
        config.logging.level = level;
    }

    Ok(())
}
