pub mod testnet;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

use crate::error::Result;
use crate::models::OrderSide;

pub use testnet::BinanceTestnetClient;

/// Order record as reported by the remote exchange.
///
/// `status` stays in the remote vocabulary (`NEW`, `FILLED`, ...); mapping
/// into local statuses is the reconciliation service's job.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteOrder {
    pub order_id: i64,
    pub status: String,
    pub price: Option<f64>,
    /// Milliseconds since epoch, when the exchange reports one.
    pub update_time: Option<i64>,
}

/// Open position snapshot from the remote account.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionInfo {
    pub entry_price: f64,
    pub mark_price: f64,
    pub unrealized_profit: f64,
    pub position_amt: f64,
}

/// Client for the remote testnet account. Auth and network failures surface
/// as `RemoteUnavailable`; a missing order or position is `Ok(None)`, not an
/// error.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        leverage: Option<f64>,
    ) -> Result<RemoteOrder>;

    async fn get_order_status(&self, symbol: &str, order_id: i64) -> Result<Option<RemoteOrder>>;

    async fn get_position_info(&self, symbol: &str) -> Result<Option<PositionInfo>>;
}

/// Binance reports most numeric fields as JSON strings.
pub(crate) fn de_f64_str<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        Text(String),
        Number(f64),
    }

    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::Text(s) => s.parse::<f64>().map_err(serde::de::Error::custom),
        StringOrNumber::Number(n) => Ok(n),
    }
}
