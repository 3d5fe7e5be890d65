//! Simulator configuration
//!
//! Settings are read from the process environment, after loading a `.env` file from the working
//! directory if there is one.
use std::{env, str::FromStr, time::Duration};

use serde::Deserialize;

use crate::{
    errors::ConfigError,
    models::{TraceFallback, TraceStrategy},
};

pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// JSON-RPC endpoint of the node the simulations run against
    pub rpc_url: String,
    /// Strategy used when the caller doesn't pick one
    pub strategy: TraceStrategy,
    /// Behaviour when the strategy's tracer is missing
    pub fallback: TraceFallback,
    /// Run `eth_estimateGas` before executing
    pub estimate_gas: bool,
    /// Ask the node to impersonate the sender for the duration of the simulation
    pub impersonate_sender: bool,
    /// Upper bound on waiting for the execution receipt
    pub receipt_timeout: Duration,
    /// Delay between two receipt polls
    pub receipt_poll_interval: Duration,
    /// Attempts for each token metadata read (1 means no retry)
    pub metadata_attempts: usize,
    /// Delay before the first metadata retry, doubled for every further one
    pub metadata_retry_delay: Duration,
    /// Number of tokens whose metadata is cached
    pub metadata_cache_size: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            strategy: TraceStrategy::default(),
            fallback: TraceFallback::default(),
            estimate_gas: true,
            impersonate_sender: false,
            receipt_timeout: Duration::from_secs(30),
            receipt_poll_interval: Duration::from_millis(100),
            metadata_attempts: 3,
            metadata_retry_delay: Duration::from_millis(50),
            metadata_cache_size: 1024,
        }
    }
}

impl SimulatorConfig {
    /// Loads the configuration from `.env` and the environment. Unset keys keep their default.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine, the variables may come from the environment itself.
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(url) = lookup("RPC_URL") {
            config.rpc_url = url;
        }
        if let Some(strategy) = parse_key(&lookup, "SIM_TRACE_STRATEGY", TraceStrategy::from_str)? {
            config.strategy = strategy;
        }
        if let Some(fallback) = parse_key(&lookup, "SIM_TRACE_FALLBACK", TraceFallback::from_str)? {
            config.fallback = fallback;
        }
        if let Some(estimate) = parse_key(&lookup, "SIM_ESTIMATE_GAS", parse_bool)? {
            config.estimate_gas = estimate;
        }
        if let Some(impersonate) = parse_key(&lookup, "SIM_IMPERSONATE", parse_bool)? {
            config.impersonate_sender = impersonate;
        }
        if let Some(ms) = parse_key(&lookup, "SIM_RECEIPT_TIMEOUT_MS", u64::from_str)? {
            config.receipt_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_key(&lookup, "SIM_RECEIPT_POLL_MS", u64::from_str)? {
            config.receipt_poll_interval = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_key(&lookup, "SIM_METADATA_RETRIES", usize::from_str)? {
            config.metadata_attempts = attempts.max(1);
        }
        if let Some(ms) = parse_key(&lookup, "SIM_METADATA_RETRY_DELAY_MS", u64::from_str)? {
            config.metadata_retry_delay = Duration::from_millis(ms);
        }
        if let Some(size) = parse_key(&lookup, "SIM_METADATA_CACHE_SIZE", u64::from_str)? {
            config.metadata_cache_size = size;
        }
        Ok(config)
    }
}

fn parse_key<F, T, P, E>(lookup: &F, key: &str, parse: P) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Result<T, E>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => parse(raw.trim())
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key: key.to_string(), value: raw }),
    }
}

fn parse_bool(value: &str) -> Result<bool, ()> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = SimulatorConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, SimulatorConfig::default());
        assert_eq!(config.rpc_url, DEFAULT_RPC_URL);
        assert_eq!(config.strategy, TraceStrategy::ReceiptOnly);
    }

    #[test]
    fn test_overrides() {
        let config = SimulatorConfig::from_lookup(lookup_from(&[
            ("RPC_URL", "http://anvil:8545"),
            ("SIM_TRACE_STRATEGY", "call_tree"),
            ("SIM_TRACE_FALLBACK", "receipt"),
            ("SIM_ESTIMATE_GAS", "false"),
            ("SIM_IMPERSONATE", "yes"),
            ("SIM_RECEIPT_TIMEOUT_MS", "1500"),
            ("SIM_RECEIPT_POLL_MS", "20"),
            ("SIM_METADATA_RETRIES", "0"),
            ("SIM_METADATA_CACHE_SIZE", "16"),
        ]))
        .unwrap();

        assert_eq!(config.rpc_url, "http://anvil:8545");
        assert_eq!(config.strategy, TraceStrategy::CallTree);
        assert_eq!(config.fallback, TraceFallback::ReceiptOnly);
        assert!(!config.estimate_gas);
        assert!(config.impersonate_sender);
        assert_eq!(config.receipt_timeout, Duration::from_millis(1500));
        assert_eq!(config.receipt_poll_interval, Duration::from_millis(20));
        assert_eq!(config.metadata_attempts, 1);
        assert_eq!(config.metadata_cache_size, 16);
    }

    #[test]
    fn test_invalid_value() {
        let err =
            SimulatorConfig::from_lookup(lookup_from(&[("SIM_RECEIPT_TIMEOUT_MS", "soon")]))
                .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "SIM_RECEIPT_TIMEOUT_MS".to_string(),
                value: "soon".to_string()
            }
        );

        assert!(SimulatorConfig::from_lookup(lookup_from(&[("SIM_TRACE_STRATEGY", "vm")])).is_err());
        assert!(SimulatorConfig::from_lookup(lookup_from(&[("SIM_ESTIMATE_GAS", "maybe")])).is_err());
    }
}
