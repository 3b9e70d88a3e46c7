use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;

use super::{de_f64_str, ExchangeClient, PositionInfo, RemoteOrder};
use crate::error::{Error, Result};
use crate::models::OrderSide;

const BINANCE_FUTURES_TESTNET_URL: &str = "https://testnet.binancefuture.com/fapi";
const RECV_WINDOW_MS: u64 = 60_000;
const REQUEST_TIMEOUT_SECS: u64 = 10;
// Signed futures endpoints share a 1200 weight/min budget; stay well under.
const RATE_LIMIT_RPM: u32 = 600;

// Binance error code for "Order does not exist".
const CODE_UNKNOWN_ORDER: i64 = -2013;

type HmacSha256 = Hmac<Sha256>;

type TestnetRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Signed REST client for the Binance futures testnet.
///
/// Cloneable; all clones share one rate limiter.
#[derive(Clone)]
pub struct BinanceTestnetClient {
    client: Client,
    api_key: String,
    api_secret: String,
    base_url: String,
    rate_limiter: Arc<TestnetRateLimiter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: i64,
    status: String,
    #[serde(default, deserialize_with = "de_f64_opt")]
    avg_price: Option<f64>,
    #[serde(default, deserialize_with = "de_f64_opt")]
    price: Option<f64>,
    #[serde(default)]
    update_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRiskEntry {
    symbol: String,
    #[serde(deserialize_with = "de_f64_str")]
    entry_price: f64,
    #[serde(deserialize_with = "de_f64_str")]
    mark_price: f64,
    #[serde(rename = "unRealizedProfit", deserialize_with = "de_f64_str")]
    unrealized_profit: f64,
    #[serde(deserialize_with = "de_f64_str")]
    position_amt: f64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    #[allow(dead_code)]
    msg: String,
}

fn de_f64_opt<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Some(de_f64_str(deserializer)?))
}

impl OrderResponse {
    fn into_remote_order(self) -> RemoteOrder {
        // Market orders report their fill in avgPrice; the limit-style price
        // field is usually "0".
        let price = self
            .avg_price
            .filter(|p| *p > 0.0)
            .or(self.price.filter(|p| *p > 0.0));
        RemoteOrder {
            order_id: self.order_id,
            status: self.status,
            price,
            update_time: self.update_time,
        }
    }
}

impl BinanceTestnetClient {
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self::with_base_url(api_key, api_secret, BINANCE_FUTURES_TESTNET_URL.to_string())
    }

    pub fn with_base_url(api_key: String, api_secret: String, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap());

        Self {
            client,
            api_key,
            api_secret,
            base_url,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn signed_url(&self, endpoint: &str, params: &str) -> String {
        let timestamp = Utc::now().timestamp_millis();
        let query = if params.is_empty() {
            format!("timestamp={timestamp}&recvWindow={RECV_WINDOW_MS}")
        } else {
            format!("{params}&timestamp={timestamp}&recvWindow={RECV_WINDOW_MS}")
        };
        let signature = self.sign(&query);
        format!("{}{}?{}&signature={}", self.base_url, endpoint, query, signature)
    }

    async fn send_signed(&self, method: reqwest::Method, url: String) -> Result<reqwest::Response> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .request(method, url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        Ok(response)
    }

    async fn error_from_response(response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Error::RemoteUnavailable(format!("testnet returned {status}: {body}"))
    }

    /// Whether an error body means "order does not exist" rather than a
    /// transport problem.
    fn is_unknown_order(body: &str) -> bool {
        serde_json::from_str::<ApiErrorBody>(body)
            .map(|e| e.code == CODE_UNKNOWN_ORDER)
            .unwrap_or(false)
    }

    async fn set_leverage(&self, symbol: &str, leverage: f64) -> Result<()> {
        let params = format!("symbol={}&leverage={}", symbol.to_uppercase(), leverage as u32);
        let url = self.signed_url("/v1/leverage", &params);
        let response = self.send_signed(reqwest::Method::POST, url).await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }
        Ok(())
    }
}

#[async_trait]
impl ExchangeClient for BinanceTestnetClient {
    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        leverage: Option<f64>,
    ) -> Result<RemoteOrder> {
        let symbol = symbol.to_uppercase();

        if let Some(leverage) = leverage {
            // Leverage must be set before the order; a failure here aborts
            // the placement rather than opening a mis-leveraged position.
            self.set_leverage(&symbol, leverage).await?;
        }

        let params = format!("symbol={symbol}&side={side}&type=MARKET&quantity={quantity}");
        let url = self.signed_url("/v1/order", &params);
        let response = self.send_signed(reqwest::Method::POST, url).await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let order: OrderResponse = response.json().await?;
        let remote = order.into_remote_order();
        tracing::info!(
            symbol = %symbol,
            remote_order_id = remote.order_id,
            status = %remote.status,
            "placed testnet market order"
        );
        Ok(remote)
    }

    async fn get_order_status(&self, symbol: &str, order_id: i64) -> Result<Option<RemoteOrder>> {
        let params = format!("symbol={}&orderId={}", symbol.to_uppercase(), order_id);
        let url = self.signed_url("/v1/order", &params);
        let response = self.send_signed(reqwest::Method::GET, url).await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if Self::is_unknown_order(&body) {
                return Ok(None);
            }
            return Err(Error::RemoteUnavailable(format!(
                "testnet returned {status}: {body}"
            )));
        }

        let order: OrderResponse = response.json().await?;
        Ok(Some(order.into_remote_order()))
    }

    async fn get_position_info(&self, symbol: &str) -> Result<Option<PositionInfo>> {
        let url = self.signed_url("/v2/positionRisk", "");
        let response = self.send_signed(reqwest::Method::GET, url).await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let positions: Vec<PositionRiskEntry> = response.json().await?;
        let symbol = symbol.to_uppercase();

        Ok(positions
            .into_iter()
            .find(|p| p.symbol.eq_ignore_ascii_case(&symbol) && p.position_amt != 0.0)
            .map(|p| PositionInfo {
                entry_price: p.entry_price,
                mark_price: p.mark_price,
                unrealized_profit: p.unrealized_profit,
                position_amt: p.position_amt,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn test_client(base_url: String) -> BinanceTestnetClient {
        BinanceTestnetClient::with_base_url("key".to_string(), "secret".to_string(), base_url)
    }

    #[test]
    fn test_signature_is_deterministic_hex() {
        let client = test_client("http://localhost".to_string());
        let sig = client.sign("symbol=BTCUSDT&timestamp=1700000000000");
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(sig, client.sign("symbol=BTCUSDT&timestamp=1700000000000"));
    }

    #[test]
    fn test_signed_url_carries_auth_params() {
        let client = test_client("http://localhost".to_string());
        let url = client.signed_url("/v1/order", "symbol=BTCUSDT");
        assert!(url.starts_with("http://localhost/v1/order?symbol=BTCUSDT&timestamp="));
        assert!(url.contains(&format!("recvWindow={RECV_WINDOW_MS}")));
        assert!(url.contains("&signature="));
    }

    #[tokio::test]
    async fn test_get_order_status_parses_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/order")
            .match_query(Matcher::Regex("symbol=BTCUSDT&orderId=42&.*".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"orderId": 42, "status": "FILLED", "avgPrice": "50100.5", "price": "0", "updateTime": 1700000000000}"#,
            )
            .create_async()
            .await;

        let client = test_client(server.url());
        let order = client.get_order_status("BTCUSDT", 42).await.unwrap().unwrap();

        assert_eq!(order.order_id, 42);
        assert_eq!(order.status, "FILLED");
        assert_eq!(order.price, Some(50100.5));
        assert_eq!(order.update_time, Some(1_700_000_000_000));
    }

    #[tokio::test]
    async fn test_unknown_order_maps_to_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/order")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code": -2013, "msg": "Order does not exist."}"#)
            .create_async()
            .await;

        let client = test_client(server.url());
        let order = client.get_order_status("BTCUSDT", 99).await.unwrap();
        assert!(order.is_none());
    }

    #[tokio::test]
    async fn test_auth_failure_is_remote_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/order")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"code": -2014, "msg": "API-key format invalid."}"#)
            .create_async()
            .await;

        let client = test_client(server.url());
        let result = client.get_order_status("BTCUSDT", 1).await;
        assert!(matches!(result, Err(Error::RemoteUnavailable(_))));
    }

    #[tokio::test]
    async fn test_position_info_picks_active_symbol() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/positionRisk")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[
                    {"symbol": "ETHUSDT", "entryPrice": "0.0", "markPrice": "0.0", "unRealizedProfit": "0.0", "positionAmt": "0"},
                    {"symbol": "BTCUSDT", "entryPrice": "50000.0", "markPrice": "50500.0", "unRealizedProfit": "5.0", "positionAmt": "0.01"}
                ]"#,
            )
            .create_async()
            .await;

        let client = test_client(server.url());
        let position = client.get_position_info("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(position.entry_price, 50000.0);
        assert_eq!(position.unrealized_profit, 5.0);
        assert_eq!(position.position_amt, 0.01);

        // Flat symbols (positionAmt == 0) read as no position.
        let flat = client.get_position_info("ETHUSDT").await.unwrap();
        assert!(flat.is_none());
    }
}
