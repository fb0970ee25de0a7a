use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::SOMPI_PER_COIN;
use crate::bridge::BridgeSettings;
use crate::error_handling::RetryConfig;
use crate::miner::{DEFAULT_MAX_ITERATIONS, DEFAULT_PROGRESS_INTERVAL};
use crate::prng::NonceSource;
use crate::types::IdPrefix;
use crate::utxo::MIN_FEE_SOMPI;

pub const DEFAULT_REQUIRED_PREFIX: &str = "97b4";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Addresses
    pub entry_address: String,
    pub sender_address: String,

    // Collaborators
    pub ledger_api_url: String,
    pub signer_url: String,
    pub rpc_timeout_ms: u64,

    // Entry protocol
    pub required_prefix: String,
    pub min_amount_sompi: u64,
    pub fee_sompi: u64,

    // Mining
    pub max_iterations: u64,
    pub progress_interval: u64,
    pub mining_workers: usize,

    // Monitoring and logging
    pub log_level: String,
    pub metrics_port: Option<u16>,

    // Error handling and recovery
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            entry_address: String::new(),
            sender_address: String::new(),

            ledger_api_url: "https://api.kaspa.org".to_string(),
            signer_url: "http://localhost:8090/sign".to_string(),
            rpc_timeout_ms: 15_000,

            required_prefix: DEFAULT_REQUIRED_PREFIX.to_string(),
            min_amount_sompi: SOMPI_PER_COIN,
            fee_sompi: MIN_FEE_SOMPI,

            max_iterations: DEFAULT_MAX_ITERATIONS,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            mining_workers: 1,

            log_level: "info".to_string(),
            metrics_port: None,

            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, val: String) -> Result<T, ConfigError> {
    val.parse().map_err(|_| ConfigError::InvalidEnvVar(name.to_string(), val))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        // Required configuration
        config.entry_address =
            lookup("ENTRY_ADDRESS").ok_or_else(|| ConfigError::MissingEnvVar("ENTRY_ADDRESS".to_string()))?;
        config.sender_address =
            lookup("SENDER_ADDRESS").ok_or_else(|| ConfigError::MissingEnvVar("SENDER_ADDRESS".to_string()))?;

        // Optional configuration with defaults
        if let Some(val) = lookup("LEDGER_API_URL") {
            config.ledger_api_url = val.trim_end_matches('/').to_string();
        }
        if let Some(val) = lookup("SIGNER_URL") {
            config.signer_url = val;
        }
        if let Some(val) = lookup("RPC_TIMEOUT_MS") {
            config.rpc_timeout_ms = parse_var("RPC_TIMEOUT_MS", val)?;
        }

        if let Some(val) = lookup("REQUIRED_PREFIX") {
            config.required_prefix = val;
        }
        if let Some(val) = lookup("MIN_AMOUNT_SOMPI") {
            config.min_amount_sompi = parse_var("MIN_AMOUNT_SOMPI", val)?;
        }
        if let Some(val) = lookup("FEE_SOMPI") {
            config.fee_sompi = parse_var("FEE_SOMPI", val)?;
        }

        if let Some(val) = lookup("MAX_ITERATIONS") {
            config.max_iterations = parse_var("MAX_ITERATIONS", val)?;
        }
        if let Some(val) = lookup("PROGRESS_INTERVAL") {
            config.progress_interval = parse_var("PROGRESS_INTERVAL", val)?;
        }
        if let Some(val) = lookup("MINING_WORKERS") {
            config.mining_workers = parse_var("MINING_WORKERS", val)?;
        }

        if let Some(val) = lookup("LOG_LEVEL") {
            config.log_level = val;
        }
        if let Some(val) = lookup("METRICS_PORT") {
            config.metrics_port = Some(parse_var("METRICS_PORT", val)?);
        }

        if let Some(val) = lookup("MAX_RETRIES") {
            config.max_retries = parse_var("MAX_RETRIES", val)?;
        }
        if let Some(val) = lookup("RETRY_DELAY_MS") {
            config.retry_delay_ms = parse_var("RETRY_DELAY_MS", val)?;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.entry_address.is_empty() {
            return Err(ConfigError::ValidationError("ENTRY_ADDRESS is required".to_string()));
        }
        if self.sender_address.is_empty() {
            return Err(ConfigError::ValidationError("SENDER_ADDRESS is required".to_string()));
        }
        if !self.ledger_api_url.starts_with("http") {
            return Err(ConfigError::ValidationError("LEDGER_API_URL must be a valid HTTP URL".to_string()));
        }
        if !self.signer_url.starts_with("http") {
            return Err(ConfigError::ValidationError("SIGNER_URL must be a valid HTTP URL".to_string()));
        }
        if IdPrefix::parse(&self.required_prefix).is_none() {
            return Err(ConfigError::ValidationError("REQUIRED_PREFIX must be 1-64 hex characters".to_string()));
        }
        if self.min_amount_sompi == 0 {
            return Err(ConfigError::ValidationError("MIN_AMOUNT_SOMPI must be greater than 0".to_string()));
        }
        if self.fee_sompi < MIN_FEE_SOMPI {
            return Err(ConfigError::ValidationError(format!("FEE_SOMPI must be at least {MIN_FEE_SOMPI}")));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::ValidationError("MAX_ITERATIONS must be greater than 0".to_string()));
        }
        if self.mining_workers == 0 {
            return Err(ConfigError::ValidationError("MINING_WORKERS must be greater than 0".to_string()));
        }
        Ok(())
    }

    pub fn bridge_settings(&self) -> Result<BridgeSettings, ConfigError> {
        let required_prefix = IdPrefix::parse(&self.required_prefix).ok_or_else(|| {
            ConfigError::InvalidEnvVar("REQUIRED_PREFIX".to_string(), self.required_prefix.clone())
        })?;
        Ok(BridgeSettings {
            entry_address: self.entry_address.clone(),
            required_prefix,
            min_amount_sompi: self.min_amount_sompi,
            fee_sompi: self.fee_sompi,
            max_iterations: self.max_iterations,
            progress_interval: self.progress_interval,
            workers: self.mining_workers,
        })
    }

    /// Fresh OS entropy on every call.
    pub fn nonce_source(&self) -> NonceSource {
        NonceSource::from_entropy()
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig { max_retries: self.max_retries, retry_delay: self.get_retry_delay(), ..RetryConfig::default() }
    }

    pub fn get_retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn get_rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const ENTRY: &str = "kaspa:qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqkx9awp4e";

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_protocol_constants() {
        let config = Config::from_lookup(lookup(&[("ENTRY_ADDRESS", ENTRY), ("SENDER_ADDRESS", ENTRY)])).unwrap();
        config.validate().unwrap();
        assert_eq!(config.required_prefix, "97b4");
        assert_eq!(config.min_amount_sompi, 100_000_000);
        assert_eq!(config.fee_sompi, 10_000);
        assert_eq!(config.max_iterations, 10_000_000);
        assert_eq!(config.progress_interval, 100_000);

        let settings = config.bridge_settings().unwrap();
        assert_eq!(settings.required_prefix.to_string(), "97b4");
        assert_eq!(settings.workers, 1);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("ENTRY_ADDRESS", ENTRY),
            ("SENDER_ADDRESS", ENTRY),
            ("LEDGER_API_URL", "http://localhost:8000/"),
            ("MAX_ITERATIONS", "500"),
            ("MINING_WORKERS", "4"),
            ("METRICS_PORT", "9100"),
        ]))
        .unwrap();
        assert_eq!(config.ledger_api_url, "http://localhost:8000");
        assert_eq!(config.max_iterations, 500);
        assert_eq!(config.mining_workers, 4);
        assert_eq!(config.metrics_port, Some(9100));
    }

    #[test]
    fn missing_and_invalid_values() {
        assert!(matches!(
            Config::from_lookup(lookup(&[("SENDER_ADDRESS", ENTRY)])),
            Err(ConfigError::MissingEnvVar(name)) if name == "ENTRY_ADDRESS"
        ));
        assert!(matches!(
            Config::from_lookup(lookup(&[("ENTRY_ADDRESS", ENTRY), ("SENDER_ADDRESS", ENTRY), ("MAX_ITERATIONS", "lots")])),
            Err(ConfigError::InvalidEnvVar(name, _)) if name == "MAX_ITERATIONS"
        ));

        let config = Config::from_lookup(lookup(&[
            ("ENTRY_ADDRESS", ENTRY),
            ("SENDER_ADDRESS", ENTRY),
            ("REQUIRED_PREFIX", "97z4"),
        ]))
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn fee_below_minimum_is_rejected() {
        let config = Config::from_lookup(lookup(&[
            ("ENTRY_ADDRESS", ENTRY),
            ("SENDER_ADDRESS", ENTRY),
            ("FEE_SOMPI", "0"),
        ]))
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(msg)) if msg.contains("FEE_SOMPI")));
    }

    #[test]
    fn each_run_draws_its_own_start_nonce() {
        let vars = [("ENTRY_ADDRESS", ENTRY), ("SENDER_ADDRESS", ENTRY), ("NONCE_SEED", "replay")];
        let first = Config::from_lookup(lookup(&vars)).unwrap();
        let second = Config::from_lookup(lookup(&vars)).unwrap();
        // 8 draws each; a full collision by chance is ~2^-256
        let a: Vec<u32> = (0..8).map(|_| first.nonce_source().start_nonce()).collect();
        let b: Vec<u32> = (0..8).map(|_| second.nonce_source().start_nonce()).collect();
        assert_ne!(a, b);
    }
}
