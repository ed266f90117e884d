//! # Configuration Crate
//!
//! YAML configuration surface for the monitor. Invalid values are rejected
//! at startup by [`AppConfig::validate`]; nothing is silently clamped.

use common::{AssetPair, ExchangeId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub detector: DetectorSettings,
    pub alerts: AlertSettings,
    pub exchanges: Vec<ExchangeSettings>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectorSettings {
    /// Representative notional per route, in quote-currency units. Used for
    /// profit estimation only, never for order sizing.
    pub assumed_volume: Decimal,
    /// Withholding rate applied above the threshold (e.g. 0.01 for 1%).
    pub withholding_rate: Decimal,
    /// Notional cutoff below which no withholding applies.
    pub withholding_threshold: Decimal,
    /// Seconds between stale-entry sweeps of the price cache.
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
}

fn default_prune_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlertSettings {
    /// Minimum seconds between two emissions for the same route.
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeSettings {
    pub name: String,
    /// Wire dialect: one of the supported feed decoders.
    pub dialect: String,
    pub url: String,
    /// Watched pair in BASE/QUOTE form, e.g. "USDT/INR".
    pub pair: String,
    pub maker_fee_rate: Decimal,
    pub taker_fee_rate: Decimal,
    pub heartbeat_interval_secs: u64,
    /// Heartbeat windows without traffic before the feed counts as degraded.
    pub missed_beat_tolerance: u32,
    pub max_reconnect_attempts: u32,
    pub backoff: BackoffSettings,
}

impl ExchangeSettings {
    pub fn exchange_id(&self) -> ExchangeId {
        ExchangeId(self.name.clone())
    }

    pub fn asset_pair(&self) -> Result<AssetPair, ConfigError> {
        AssetPair::from_str(&self.pair).map_err(|e| {
            ConfigError::ValidationError(format!("bad pair for exchange '{}': {}", self.name, e))
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackoffSettings {
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: AppConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            serde_yaml::to_string(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Get exchange settings by name
    pub fn get_exchange(&self, name: &str) -> Option<&ExchangeSettings> {
        self.exchanges.iter().find(|e| e.name == name)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exchanges.is_empty() {
            return Err(ConfigError::ValidationError(
                "No exchanges configured".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for exchange in &self.exchanges {
            if exchange.name.is_empty() {
                return Err(ConfigError::ValidationError(
                    "Exchange name cannot be empty".to_string(),
                ));
            }
            if !names.insert(&exchange.name) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate exchange name '{}'",
                    exchange.name
                )));
            }
            if exchange.url.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "Endpoint URL for exchange '{}' cannot be empty",
                    exchange.name
                )));
            }
            if exchange.dialect.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "Dialect for exchange '{}' cannot be empty",
                    exchange.name
                )));
            }
            exchange.asset_pair()?;

            for (label, rate) in [
                ("maker", exchange.maker_fee_rate),
                ("taker", exchange.taker_fee_rate),
            ] {
                if rate < Decimal::ZERO || rate >= Decimal::ONE {
                    return Err(ConfigError::ValidationError(format!(
                        "{} fee rate for exchange '{}' must be within [0, 1)",
                        label, exchange.name
                    )));
                }
            }

            if exchange.heartbeat_interval_secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "Heartbeat interval for exchange '{}' must be greater than 0",
                    exchange.name
                )));
            }
            if exchange.missed_beat_tolerance == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "Missed-beat tolerance for exchange '{}' must be greater than 0",
                    exchange.name
                )));
            }
            if exchange.max_reconnect_attempts == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "Max reconnect attempts for exchange '{}' must be greater than 0",
                    exchange.name
                )));
            }
            if exchange.backoff.initial_delay_ms == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "Initial backoff delay for exchange '{}' must be greater than 0",
                    exchange.name
                )));
            }
            if exchange.backoff.multiplier < 1.0 {
                return Err(ConfigError::ValidationError(format!(
                    "Backoff multiplier for exchange '{}' must be at least 1",
                    exchange.name
                )));
            }
            if exchange.backoff.max_delay_ms < exchange.backoff.initial_delay_ms {
                return Err(ConfigError::ValidationError(format!(
                    "Max backoff delay for exchange '{}' cannot be below the initial delay",
                    exchange.name
                )));
            }
        }

        if self.detector.assumed_volume <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(
                "Assumed volume must be greater than 0".to_string(),
            ));
        }
        if self.detector.withholding_rate < Decimal::ZERO
            || self.detector.withholding_rate >= Decimal::ONE
        {
            return Err(ConfigError::ValidationError(
                "Withholding rate must be within [0, 1)".to_string(),
            ));
        }
        if self.detector.withholding_threshold < Decimal::ZERO {
            return Err(ConfigError::ValidationError(
                "Withholding threshold cannot be negative".to_string(),
            ));
        }
        if self.detector.prune_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "Prune interval must be greater than 0".to_string(),
            ));
        }
        if self.alerts.cooldown_secs == 0 {
            return Err(ConfigError::ValidationError(
                "Alert cooldown must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
