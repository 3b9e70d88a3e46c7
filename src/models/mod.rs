use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order side, matching the signal vocabulary of the charting tool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order lifecycle states. `Open` is the only initial state; the other three
/// are terminal and an order never leaves them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Open,
    Filled,
    Closed,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Open)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Open => write!(f, "OPEN"),
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Closed => write!(f, "CLOSED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Indicator values that triggered an order, kept for auditability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalSnapshot {
    #[serde(rename = "plusDI")]
    pub plus_di: f64,
    #[serde(rename = "minusDI")]
    pub minus_di: f64,
    pub adx: f64,
}

/// Link to the order's mirror on the remote testnet account.
///
/// `order_id` is written once when the remote order is placed; only
/// `status` and `updated_at` change afterwards, during reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLink {
    pub order_id: i64,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

/// A tracked order. Created in `Open` state by the signal path or the API,
/// mutated only through the store's guarded update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leverage: Option<f64>,
    pub entry_price: f64,
    pub take_profit_price: f64,
    pub stop_loss_price: f64,
    pub status: OrderStatus,
    pub profit: Option<f64>,
    pub profit_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_price: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub close_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<SignalSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteLink>,
}

impl Order {
    /// Whether the order has a remote mirror that still needs reconciling.
    pub fn needs_reconciliation(&self) -> bool {
        self.remote.is_some() && !self.status.is_terminal()
    }
}

/// Raw trading signal as delivered by the charting tool webhook.
///
/// All indicator fields are optional at the wire level; the validator is
/// responsible for rejecting incomplete payloads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradingSignal {
    #[serde(rename = "plusDI", alias = "plus_di", default)]
    pub plus_di: Option<f64>,
    #[serde(rename = "minusDI", alias = "minus_di", default)]
    pub minus_di: Option<f64>,
    #[serde(default)]
    pub adx: Option<f64>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub timeframe: Option<String>,
}

/// Outcome of signal validation.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalVerdict {
    Valid { action: OrderSide },
    Invalid { reason: String },
}

impl SignalVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, SignalVerdict::Valid { .. })
    }

    pub fn action(&self) -> Option<OrderSide> {
        match self {
            SignalVerdict::Valid { action } => Some(*action),
            SignalVerdict::Invalid { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            SignalVerdict::Valid { .. } => None,
            SignalVerdict::Invalid { reason } => Some(reason),
        }
    }
}

/// Where a price sample came from. Callers and tests can assert which path
/// produced a quote instead of guessing from side effects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PriceSource {
    Live,
    Simulated,
    Fallback,
}

/// A price sample with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: f64,
    pub source: PriceSource,
    pub timestamp: DateTime<Utc>,
}

impl PriceQuote {
    pub fn new(symbol: impl Into<String>, price: f64, source: PriceSource) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            source,
            timestamp: Utc::now(),
        }
    }
}
