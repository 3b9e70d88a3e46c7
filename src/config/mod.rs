use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Strategy thresholds and risk parameters.
///
/// Read-only input to the signal validator and the trading service. The
/// authoritative copy lives with the embedding application; this struct only
/// mirrors it for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyConfig {
    pub symbol: String,
    pub timeframe: String,
    #[serde(rename = "plusDIThreshold")]
    pub plus_di_threshold: f64,
    #[serde(rename = "minusDIThreshold")]
    pub minus_di_threshold: f64,
    pub adx_minimum: f64,
    pub take_profit_percent: f64,
    pub stop_loss_percent: f64,
    pub leverage: f64,
    pub quantity: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            timeframe: "5m".to_string(),
            plus_di_threshold: 25.0,
            minus_di_threshold: 20.0,
            adx_minimum: 20.0,
            take_profit_percent: 2.0,
            stop_loss_percent: 1.0,
            leverage: 10.0,
            quantity: 0.001,
        }
    }
}

impl StrategyConfig {
    /// Build the config from environment variables, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            symbol: env_or("SYMBOL", defaults.symbol),
            timeframe: env_or("TIMEFRAME", defaults.timeframe),
            plus_di_threshold: env_parse("PLUS_DI_THRESHOLD", defaults.plus_di_threshold),
            minus_di_threshold: env_parse("MINUS_DI_THRESHOLD", defaults.minus_di_threshold),
            adx_minimum: env_parse("ADX_MINIMUM", defaults.adx_minimum),
            take_profit_percent: env_parse("TAKE_PROFIT_PERCENT", defaults.take_profit_percent),
            stop_loss_percent: env_parse("STOP_LOSS_PERCENT", defaults.stop_loss_percent),
            leverage: env_parse("LEVERAGE", defaults.leverage),
            quantity: env_parse("ORDER_QUANTITY", defaults.quantity),
        }
    }
}

/// Knobs for the synthetic price walk driving mark-to-market.
#[derive(Debug, Clone, Copy)]
pub struct SimulatorSettings {
    pub interval: Duration,
    /// Per-tick random change drawn from `(-volatility, volatility)`.
    pub volatility: f64,
    /// Hard clamp on the per-tick change.
    pub max_move: f64,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            volatility: 0.002,
            max_move: 0.005,
        }
    }
}

/// Knobs for the reconciliation loop.
#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    pub interval: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

/// Credentials for the remote testnet account.
#[derive(Debug, Clone)]
pub struct TestnetCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl TestnetCredentials {
    /// Load credentials from `TESTNET_API_KEY` / `TESTNET_API_SECRET`.
    /// Returns `Ok(None)` when neither is set (testnet execution disabled),
    /// and an error when only one of the pair is present.
    pub fn from_env() -> Result<Option<Self>> {
        let key = std::env::var("TESTNET_API_KEY").ok().filter(|v| !v.is_empty());
        let secret = std::env::var("TESTNET_API_SECRET").ok().filter(|v| !v.is_empty());

        match (key, secret) {
            (Some(api_key), Some(api_secret)) => Ok(Some(Self { api_key, api_secret })),
            (None, None) => Ok(None),
            _ => Err(Error::Config(
                "TESTNET_API_KEY and TESTNET_API_SECRET must be set together".to_string(),
            )),
        }
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_parse(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let config = StrategyConfig::default();
        assert_eq!(config.symbol, "BTCUSDT");
        assert_eq!(config.plus_di_threshold, 25.0);
        assert_eq!(config.minus_di_threshold, 20.0);
        assert_eq!(config.adx_minimum, 20.0);
        assert_eq!(config.leverage, 10.0);
    }

    #[test]
    fn test_default_simulator_settings() {
        let settings = SimulatorSettings::default();
        assert_eq!(settings.interval, Duration::from_secs(60));
        assert_eq!(settings.volatility, 0.002);
        assert_eq!(settings.max_move, 0.005);
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = StrategyConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("plusDIThreshold"));
        let back: StrategyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.take_profit_percent, config.take_profit_percent);
    }
}
