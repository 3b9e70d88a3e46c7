use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::time::{sleep, Duration};

use crate::error::{Error, Result};
use crate::models::{OrderSide, PriceQuote, PriceSource};

const BINANCE_SPOT_TESTNET_URL: &str = "https://testnet.binance.vision";
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000;

/// Market price feed consumed by the trading service and the simulation
/// loop. Implementations may fail with a transient `RemoteUnavailable`; the
/// callers decide whether to retry, skip, or surface it.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn get_current_price(&self, symbol: &str) -> Result<PriceQuote>;
}

/// Live price feed backed by the Binance spot ticker endpoint.
#[derive(Clone)]
pub struct BinanceMarketData {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TickerPriceResponse {
    #[allow(dead_code)]
    symbol: String,
    price: String,
}

impl BinanceMarketData {
    pub fn new() -> Self {
        Self::with_base_url(BINANCE_SPOT_TESTNET_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, base_url }
    }

    async fn fetch_price_once(&self, symbol: &str) -> Result<f64> {
        let url = format!("{}/api/v3/ticker/price", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol.to_uppercase())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RemoteUnavailable(format!(
                "ticker request for {symbol} returned {status}: {body}"
            )));
        }

        let ticker: TickerPriceResponse = response.json().await?;
        ticker
            .price
            .parse::<f64>()
            .map_err(|e| Error::RemoteUnavailable(format!("unparseable ticker price for {symbol}: {e}")))
    }
}

impl Default for BinanceMarketData {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceOracle for BinanceMarketData {
    /// Fetch the current price with retry and exponential backoff for
    /// transient failures. Exhausted retries surface the last error; nothing
    /// substitutes a made-up price here.
    async fn get_current_price(&self, symbol: &str) -> Result<PriceQuote> {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match self.fetch_price_once(symbol).await {
                Ok(price) => {
                    if attempt > 1 {
                        tracing::info!(symbol, attempt, "price fetch recovered after retries");
                    }
                    return Ok(PriceQuote::new(symbol.to_uppercase(), price, PriceSource::Live));
                }
                Err(e) => {
                    if attempt < MAX_RETRIES {
                        let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt - 1);
                        tracing::warn!(
                            symbol,
                            attempt,
                            max_retries = MAX_RETRIES,
                            backoff_ms,
                            error = %e,
                            "price fetch failed, retrying"
                        );
                        sleep(Duration::from_millis(backoff_ms)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::RemoteUnavailable("all retry attempts failed".to_string())))
    }
}

/// Deterministic oracle serving a fixed price table. Used for offline runs
/// and tests; quotes are tagged `Fallback` so consumers can tell them from
/// live data.
pub struct FixedPriceOracle {
    prices: HashMap<String, f64>,
}

impl FixedPriceOracle {
    pub fn new(prices: HashMap<String, f64>) -> Self {
        Self { prices }
    }

    pub fn single(symbol: impl Into<String>, price: f64) -> Self {
        let mut prices = HashMap::new();
        prices.insert(symbol.into().to_uppercase(), price);
        Self { prices }
    }
}

#[async_trait]
impl PriceOracle for FixedPriceOracle {
    async fn get_current_price(&self, symbol: &str) -> Result<PriceQuote> {
        let key = symbol.to_uppercase();
        match self.prices.get(&key) {
            Some(&price) => Ok(PriceQuote::new(key, price, PriceSource::Fallback)),
            None => Err(Error::RemoteUnavailable(format!(
                "no fallback price configured for {symbol}"
            ))),
        }
    }
}

/// Derive TP/SL trigger prices from the configured percentages.
pub fn calculate_tp_sl(
    side: OrderSide,
    current_price: f64,
    take_profit_percent: f64,
    stop_loss_percent: f64,
) -> (f64, f64) {
    match side {
        OrderSide::Buy => (
            current_price * (1.0 + take_profit_percent / 100.0),
            current_price * (1.0 - stop_loss_percent / 100.0),
        ),
        OrderSide::Sell => (
            current_price * (1.0 - take_profit_percent / 100.0),
            current_price * (1.0 + stop_loss_percent / 100.0),
        ),
    }
}
