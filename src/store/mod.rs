use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Order, OrderSide, OrderStatus, RemoteLink, SignalSnapshot};

fn default_quantity() -> f64 {
    0.001
}

/// Creation payload with the historical webhook field spellings unified into
/// the canonical schema. `action` and `side`, `price`/`price_entry` and
/// `entryPrice`, and the snake/camel TP-SL spellings all land on the same
/// fields.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub symbol: String,
    #[serde(alias = "action")]
    pub side: OrderSide,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    #[serde(default)]
    pub leverage: Option<f64>,
    #[serde(alias = "price", alias = "price_entry", alias = "entryPrice")]
    pub entry_price: f64,
    #[serde(alias = "tp_price", alias = "tpPrice", alias = "takeProfitPrice")]
    pub take_profit_price: f64,
    #[serde(alias = "sl_price", alias = "slPrice", alias = "stopLossPrice")]
    pub stop_loss_price: f64,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub signal: Option<SignalSnapshot>,
}

/// Filter for `OrderStore::list`.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub symbol: Option<String>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn by_status(status: OrderStatus) -> Self {
        Self {
            symbol: None,
            status: Some(status),
        }
    }

    pub fn by_symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: Some(symbol.into()),
            status: None,
        }
    }

    fn matches(&self, order: &Order) -> bool {
        if let Some(symbol) = &self.symbol {
            if &order.symbol != symbol {
                return false;
            }
        }
        if let Some(status) = self.status {
            if order.status != status {
                return false;
            }
        }
        true
    }
}

/// Fields merged into an order alongside a status update.
#[derive(Debug, Clone, Default)]
pub struct OrderPatch {
    pub profit: Option<f64>,
    pub profit_percent: Option<f64>,
    pub close_reason: Option<String>,
    pub close_price: Option<f64>,
    pub close_time: Option<DateTime<Utc>>,
    pub remote_status: Option<String>,
    pub remote_updated_at: Option<DateTime<Utc>>,
}

/// Owns all order records and their status transitions.
///
/// Every mutation is a read-modify-write under one lock, so interleaved
/// updates from the simulation and reconciliation loops serialize per id.
/// No await point ever runs while the lock is held.
pub struct OrderStore {
    orders: Mutex<HashMap<Uuid, Order>>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self {
            orders: Mutex::new(HashMap::new()),
        }
    }

    /// Create a new order in `Open` state with no profit recorded yet.
    pub fn create(&self, data: NewOrder) -> Result<Order> {
        if data.entry_price <= 0.0 {
            return Err(Error::Validation("entry price must be positive".to_string()));
        }
        if data.quantity <= 0.0 {
            return Err(Error::Validation("quantity must be positive".to_string()));
        }
        if data.take_profit_price <= 0.0 || data.stop_loss_price <= 0.0 {
            return Err(Error::Validation(
                "take profit and stop loss prices must be positive".to_string(),
            ));
        }

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            symbol: data.symbol,
            side: data.side,
            quantity: data.quantity,
            leverage: data.leverage,
            entry_price: data.entry_price,
            take_profit_price: data.take_profit_price,
            stop_loss_price: data.stop_loss_price,
            status: OrderStatus::Open,
            profit: None,
            profit_percent: None,
            close_reason: None,
            close_price: None,
            created_at: now,
            updated_at: now,
            close_time: None,
            timeframe: data.timeframe,
            signal: data.signal,
            remote: None,
        };

        self.orders.lock().unwrap().insert(order.id, order.clone());
        tracing::debug!(order_id = %order.id, symbol = %order.symbol, side = %order.side, "created order");

        Ok(order)
    }

    pub fn get(&self, id: Uuid) -> Result<Order> {
        self.orders
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound(id))
    }

    /// List orders matching the filter, newest first.
    pub fn list(&self, filter: &OrderFilter) -> Vec<Order> {
        let orders = self.orders.lock().unwrap();
        let mut result: Vec<Order> = orders.values().filter(|o| filter.matches(o)).cloned().collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        result
    }

    pub fn list_all(&self) -> Vec<Order> {
        self.list(&OrderFilter::default())
    }

    /// Apply a status transition plus patch fields.
    ///
    /// Terminal states are sticky: once an order is Filled, Closed or
    /// Cancelled, any further update returns the record unchanged. A
    /// transition into a terminal state stamps `close_time` exactly once.
    pub fn update_status(&self, id: Uuid, status: OrderStatus, patch: OrderPatch) -> Result<Order> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders.get_mut(&id).ok_or(Error::NotFound(id))?;

        if order.status.is_terminal() {
            if status != order.status {
                tracing::debug!(
                    order_id = %id,
                    current = %order.status,
                    requested = %status,
                    "ignoring status change on settled order"
                );
            }
            return Ok(order.clone());
        }

        order.status = status;
        order.updated_at = Utc::now();

        if let Some(profit) = patch.profit {
            order.profit = Some(profit);
        }
        if let Some(profit_percent) = patch.profit_percent {
            order.profit_percent = Some(profit_percent);
        }
        if let Some(reason) = patch.close_reason {
            order.close_reason = Some(reason);
        }
        if let Some(price) = patch.close_price {
            order.close_price = Some(price);
        }
        if let Some(remote_status) = patch.remote_status {
            if let Some(remote) = order.remote.as_mut() {
                remote.status = remote_status;
                if let Some(at) = patch.remote_updated_at {
                    remote.updated_at = at;
                }
            } else {
                tracing::warn!(order_id = %id, "remote status patch for an unlinked order, dropping");
            }
        }

        if status.is_terminal() && order.close_time.is_none() {
            order.close_time = Some(patch.close_time.unwrap_or_else(Utc::now));
        }

        Ok(order.clone())
    }

    /// Attach the remote order id. Write-once: a second link attempt for a
    /// different remote id is rejected, matching the remote-id immutability
    /// rule.
    pub fn link_remote(&self, id: Uuid, remote_order_id: i64, remote_status: String) -> Result<Order> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders.get_mut(&id).ok_or(Error::NotFound(id))?;

        match &order.remote {
            Some(existing) if existing.order_id != remote_order_id => {
                return Err(Error::Validation(format!(
                    "order {} is already linked to remote order {}",
                    id, existing.order_id
                )));
            }
            _ => {}
        }

        order.remote = Some(RemoteLink {
            order_id: remote_order_id,
            status: remote_status,
            updated_at: Utc::now(),
        });
        order.updated_at = Utc::now();

        tracing::info!(order_id = %id, remote_order_id, "linked order to remote mirror");

        Ok(order.clone())
    }

    pub fn delete(&self, id: Uuid) -> bool {
        self.orders.lock().unwrap().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.orders.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.lock().unwrap().is_empty()
    }
}

impl Default for OrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy_order() -> NewOrder {
        NewOrder {
            symbol: "BTCUSDT".to_string(),
            side: OrderSide::Buy,
            quantity: 1.0,
            leverage: Some(1.0),
            entry_price: 100.0,
            take_profit_price: 104.0,
            stop_loss_price: 98.0,
            timeframe: None,
            signal: None,
        }
    }

    #[test]
    fn test_create_starts_open_with_no_profit() {
        let store = OrderStore::new();
        let order = store.create(buy_order()).unwrap();

        assert_eq!(order.status, OrderStatus::Open);
        assert_eq!(order.profit, None);
        assert_eq!(order.profit_percent, None);
        assert_eq!(order.close_time, None);
        assert!(order.remote.is_none());
    }

    #[test]
    fn test_create_rejects_nonpositive_prices() {
        let store = OrderStore::new();
        let mut bad = buy_order();
        bad.entry_price = 0.0;
        assert!(matches!(store.create(bad), Err(Error::Validation(_))));

        let mut bad = buy_order();
        bad.quantity = -1.0;
        assert!(matches!(store.create(bad), Err(Error::Validation(_))));
    }

    #[test]
    fn test_aliased_payload_normalizes() {
        // Webhook-era spellings: action / price_entry / tp_price / sl_price.
        let json = r#"{
            "symbol": "ETHUSDT",
            "action": "SELL",
            "price_entry": 2000.0,
            "tp_price": 1960.0,
            "sl_price": 2020.0
        }"#;
        let data: NewOrder = serde_json::from_str(json).unwrap();
        assert_eq!(data.side, OrderSide::Sell);
        assert_eq!(data.entry_price, 2000.0);
        assert_eq!(data.take_profit_price, 1960.0);
        assert_eq!(data.stop_loss_price, 2020.0);
        // Quantity falls back when the payload omits it.
        assert_eq!(data.quantity, 0.001);

        // Canonical spellings land on the same fields.
        let json = r#"{
            "symbol": "ETHUSDT",
            "side": "BUY",
            "quantity": 0.5,
            "entryPrice": 2000.0,
            "takeProfitPrice": 2040.0,
            "stopLossPrice": 1980.0
        }"#;
        let data: NewOrder = serde_json::from_str(json).unwrap();
        assert_eq!(data.side, OrderSide::Buy);
        assert_eq!(data.quantity, 0.5);
        assert_eq!(data.entry_price, 2000.0);
    }

    #[test]
    fn test_get_unknown_id_is_not_found() {
        let store = OrderStore::new();
        let missing = Uuid::new_v4();
        assert!(matches!(store.get(missing), Err(Error::NotFound(id)) if id == missing));
    }

    #[test]
    fn test_list_newest_first_with_filters() {
        let store = OrderStore::new();
        let first = store.create(buy_order()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let mut eth = buy_order();
        eth.symbol = "ETHUSDT".to_string();
        let second = store.create(eth).unwrap();

        let all = store.list_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);
        assert_eq!(all[1].id, first.id);

        let btc_only = store.list(&OrderFilter::by_symbol("BTCUSDT"));
        assert_eq!(btc_only.len(), 1);
        assert_eq!(btc_only[0].id, first.id);

        store
            .update_status(first.id, OrderStatus::Filled, OrderPatch::default())
            .unwrap();
        let open_only = store.list(&OrderFilter::by_status(OrderStatus::Open));
        assert_eq!(open_only.len(), 1);
        assert_eq!(open_only[0].id, second.id);
    }

    #[test]
    fn test_terminal_status_is_sticky() {
        let store = OrderStore::new();
        let order = store.create(buy_order()).unwrap();

        let filled = store
            .update_status(
                order.id,
                OrderStatus::Filled,
                OrderPatch {
                    profit: Some(5.0),
                    close_reason: Some("TP hit".to_string()),
                    ..OrderPatch::default()
                },
            )
            .unwrap();
        assert_eq!(filled.status, OrderStatus::Filled);
        let close_time = filled.close_time.expect("close time set on fill");

        // Attempts to leave the terminal state are ignored, record unchanged.
        let after = store
            .update_status(
                order.id,
                OrderStatus::Cancelled,
                OrderPatch {
                    profit: Some(-99.0),
                    ..OrderPatch::default()
                },
            )
            .unwrap();
        assert_eq!(after.status, OrderStatus::Filled);
        assert_eq!(after.profit, Some(5.0));
        assert_eq!(after.close_time, Some(close_time));
        assert_eq!(after.updated_at, filled.updated_at);
    }

    #[test]
    fn test_close_time_set_once_on_first_terminal_transition() {
        let store = OrderStore::new();
        let order = store.create(buy_order()).unwrap();

        // Mark-to-market writes while open never stamp a close time.
        let open = store
            .update_status(
                order.id,
                OrderStatus::Open,
                OrderPatch {
                    profit: Some(1.0),
                    profit_percent: Some(1.0),
                    ..OrderPatch::default()
                },
            )
            .unwrap();
        assert_eq!(open.close_time, None);
        assert_eq!(open.profit, Some(1.0));

        let closed = store
            .update_status(order.id, OrderStatus::Closed, OrderPatch::default())
            .unwrap();
        assert!(closed.close_time.is_some());
    }

    #[test]
    fn test_remote_link_is_write_once() {
        let store = OrderStore::new();
        let order = store.create(buy_order()).unwrap();

        let linked = store.link_remote(order.id, 42, "NEW".to_string()).unwrap();
        assert_eq!(linked.remote.as_ref().unwrap().order_id, 42);

        // Relinking the same id refreshes the status.
        let relinked = store.link_remote(order.id, 42, "FILLED".to_string()).unwrap();
        assert_eq!(relinked.remote.as_ref().unwrap().status, "FILLED");

        // A different remote id is refused.
        assert!(matches!(
            store.link_remote(order.id, 43, "NEW".to_string()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_remote_status_patch_updates_link_only() {
        let store = OrderStore::new();
        let order = store.create(buy_order()).unwrap();
        store.link_remote(order.id, 7, "NEW".to_string()).unwrap();

        let updated = store
            .update_status(
                order.id,
                OrderStatus::Open,
                OrderPatch {
                    remote_status: Some("PARTIALLY_FILLED".to_string()),
                    remote_updated_at: Some(Utc::now()),
                    ..OrderPatch::default()
                },
            )
            .unwrap();

        assert_eq!(updated.status, OrderStatus::Open);
        assert_eq!(updated.remote.as_ref().unwrap().status, "PARTIALLY_FILLED");
        assert_eq!(updated.remote.as_ref().unwrap().order_id, 7);
    }

    #[test]
    fn test_delete() {
        let store = OrderStore::new();
        let order = store.create(buy_order()).unwrap();
        assert!(store.delete(order.id));
        assert!(!store.delete(order.id));
        assert!(store.is_empty());
    }
}
