//! Engine settings validation.
//!
//! Validates the `[backtest]` and `[pricing]` sections before any run and
//! turns them into typed `EngineSettings`. Every key is optional.

use std::path::PathBuf;

use crate::domain::backtest::{DEFAULT_RISK_FREE_RATE, InitialHoldings};
use crate::domain::error::VaultsimError;
use crate::domain::pricing::{DEFAULT_CACHE_TTL_SECS, DEFAULT_COUNTER_ASSET, DEFAULT_NATIVE_ASSET};
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_QUOTE_API_URL: &str = "https://api.coingecko.com/api/v3";
pub const DEFAULT_HORIZON_URL: &str = "https://horizon.stellar.org";
pub const DEFAULT_METADATA_URL: &str = "https://api.stellar.expert/explorer/public";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub risk_free_rate: f64,
    /// Used when a request does not name its own mode.
    pub initial_holdings: InitialHoldings,
    pub counter_asset: String,
    pub native_asset: String,
    pub request_timeout_secs: u64,
    pub cache_ttl_secs: i64,
    pub mock_seed: Option<u64>,
    pub csv_dir: Option<PathBuf>,
    pub quote_api_url: String,
    pub horizon_url: String,
    pub metadata_url: String,
    pub offline: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            initial_holdings: InitialHoldings::default(),
            counter_asset: DEFAULT_COUNTER_ASSET.to_string(),
            native_asset: DEFAULT_NATIVE_ASSET.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            mock_seed: None,
            csv_dir: None,
            quote_api_url: DEFAULT_QUOTE_API_URL.to_string(),
            horizon_url: DEFAULT_HORIZON_URL.to_string(),
            metadata_url: DEFAULT_METADATA_URL.to_string(),
            offline: false,
        }
    }
}

impl EngineSettings {
    /// Validates `config` and reads it, filling absent keys with defaults.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, VaultsimError> {
        validate_settings(config)?;
        let defaults = EngineSettings::default();
        let string_or = |section: &str, key: &str, default: String| {
            non_empty(config, section, key).unwrap_or(default)
        };

        Ok(EngineSettings {
            risk_free_rate: config.get_double("backtest", "risk_free_rate", defaults.risk_free_rate),
            initial_holdings: parse_key::<InitialHoldings>(config, "backtest", "initial_holdings")?
                .unwrap_or(defaults.initial_holdings),
            counter_asset: string_or("pricing", "counter_asset", defaults.counter_asset),
            native_asset: string_or("pricing", "native_asset", defaults.native_asset),
            request_timeout_secs: parse_key::<u64>(config, "pricing", "request_timeout_secs")?
                .unwrap_or(defaults.request_timeout_secs),
            cache_ttl_secs: parse_key::<i64>(config, "pricing", "cache_ttl_secs")?
                .unwrap_or(defaults.cache_ttl_secs),
            mock_seed: parse_key::<u64>(config, "pricing", "mock_seed")?,
            csv_dir: non_empty(config, "pricing", "csv_dir").map(PathBuf::from),
            quote_api_url: string_or("pricing", "quote_api_url", defaults.quote_api_url),
            horizon_url: string_or("pricing", "horizon_url", defaults.horizon_url),
            metadata_url: string_or("pricing", "metadata_url", defaults.metadata_url),
            offline: config.get_bool("pricing", "offline", defaults.offline),
        })
    }
}

pub fn validate_settings(config: &dyn ConfigPort) -> Result<(), VaultsimError> {
    validate_risk_free_rate(config)?;
    validate_initial_holdings(config)?;
    validate_assets(config)?;
    validate_timeout(config)?;
    validate_cache_ttl(config)?;
    validate_mock_seed(config)?;
    validate_urls(config)?;
    validate_offline(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> VaultsimError {
    VaultsimError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `Ok(None)` when absent, an error when present but unparseable.
fn parse_key<T: std::str::FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, VaultsimError> {
    match non_empty(config, section, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| invalid(section, key, format!("'{raw}' is not a valid value"))),
    }
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), VaultsimError> {
    let value = parse_key::<f64>(config, "backtest", "risk_free_rate")?;
    if value.is_some_and(|v| !(0.0..1.0).contains(&v)) {
        return Err(invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_initial_holdings(config: &dyn ConfigPort) -> Result<(), VaultsimError> {
    parse_key::<InitialHoldings>(config, "backtest", "initial_holdings")?;
    Ok(())
}

fn validate_assets(config: &dyn ConfigPort) -> Result<(), VaultsimError> {
    for key in ["counter_asset", "native_asset"] {
        let value = config.get_string("pricing", key);
        if value.is_some_and(|v| v.trim().is_empty()) {
            return Err(invalid("pricing", key, format!("{key} must not be empty")));
        }
    }
    Ok(())
}

fn validate_timeout(config: &dyn ConfigPort) -> Result<(), VaultsimError> {
    let value = parse_key::<i64>(config, "pricing", "request_timeout_secs")?;
    if value.is_some_and(|v| v <= 0) {
        return Err(invalid(
            "pricing",
            "request_timeout_secs",
            "request_timeout_secs must be positive",
        ));
    }
    Ok(())
}

fn validate_cache_ttl(config: &dyn ConfigPort) -> Result<(), VaultsimError> {
    let value = parse_key::<i64>(config, "pricing", "cache_ttl_secs")?;
    if value.is_some_and(|v| v < 0) {
        return Err(invalid(
            "pricing",
            "cache_ttl_secs",
            "cache_ttl_secs must be non-negative",
        ));
    }
    Ok(())
}

fn validate_mock_seed(config: &dyn ConfigPort) -> Result<(), VaultsimError> {
    parse_key::<u64>(config, "pricing", "mock_seed")?;
    Ok(())
}

fn validate_urls(config: &dyn ConfigPort) -> Result<(), VaultsimError> {
    for key in ["quote_api_url", "horizon_url", "metadata_url"] {
        let url = non_empty(config, "pricing", key);
        if url.is_some_and(|u| !(u.starts_with("http://") || u.starts_with("https://"))) {
            return Err(invalid(
                "pricing",
                key,
                format!("{key} must be an http(s) URL"),
            ));
        }
    }
    Ok(())
}

fn validate_offline(config: &dyn ConfigPort) -> Result<(), VaultsimError> {
    if let Some(value) = non_empty(config, "pricing", "offline") {
        let recognized = matches!(
            value.to_lowercase().as_str(),
            "true" | "false" | "yes" | "no" | "1" | "0"
        );
        if !recognized {
            return Err(invalid("pricing", "offline", "offline must be a boolean"));
        }
    }
    Ok(())
}
