use std::sync::Arc;

use crate::error::Result;
use crate::models::{Order, OrderSide, OrderStatus};
use crate::store::{OrderPatch, OrderStore};

/// Result of pricing an order against a market sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Valuation {
    pub profit: f64,
    pub profit_percent: f64,
    pub status: OrderStatus,
    pub close_reason: Option<&'static str>,
}

/// Marks orders to market and fires their TP/SL triggers.
///
/// Stateless apart from the store handle; safe to share between the
/// simulation loop and ad hoc callers.
#[derive(Clone)]
pub struct ProfitEvaluator {
    store: Arc<OrderStore>,
}

impl ProfitEvaluator {
    pub fn new(store: Arc<OrderStore>) -> Self {
        Self { store }
    }

    /// Re-price an order at `current_price` and persist the result.
    ///
    /// Settled orders are returned untouched. Open orders are written on
    /// every call, trigger or not: the latest unrealized profit is part of
    /// the record. That makes each evaluation a store write; if the polling
    /// interval ever drops well below the default, batch these writes.
    pub fn evaluate(&self, order: &Order, current_price: f64) -> Result<Order> {
        if order.status.is_terminal() {
            return Ok(order.clone());
        }

        let valuation = valuation(order, current_price);

        let patch = OrderPatch {
            profit: Some(valuation.profit),
            profit_percent: Some(valuation.profit_percent),
            close_reason: valuation.close_reason.map(str::to_string),
            ..OrderPatch::default()
        };

        if let Some(reason) = valuation.close_reason {
            tracing::info!(
                order_id = %order.id,
                symbol = %order.symbol,
                price = current_price,
                profit = valuation.profit,
                reason,
                "trigger fired"
            );
        }

        self.store.update_status(order.id, valuation.status, patch)
    }
}

/// Price an order against a market sample without touching the store.
pub fn valuation(order: &Order, current_price: f64) -> Valuation {
    let direction = match order.side {
        OrderSide::Buy => 1.0,
        OrderSide::Sell => -1.0,
    };

    let mut profit = (current_price - order.entry_price) * direction * order.quantity;
    let mut profit_percent = (current_price - order.entry_price) * direction / order.entry_price * 100.0;

    if let Some(leverage) = order.leverage {
        profit *= leverage;
        profit_percent *= leverage;
    }

    let profit = round2(profit);
    let profit_percent = round2(profit_percent);

    let (status, close_reason) = match order.side {
        OrderSide::Buy if current_price >= order.take_profit_price => {
            (OrderStatus::Filled, Some("TP hit"))
        }
        OrderSide::Buy if current_price <= order.stop_loss_price => {
            (OrderStatus::Closed, Some("SL hit"))
        }
        OrderSide::Sell if current_price <= order.take_profit_price => {
            (OrderStatus::Filled, Some("TP hit"))
        }
        OrderSide::Sell if current_price >= order.stop_loss_price => {
            (OrderStatus::Closed, Some("SL hit"))
        }
        _ => (OrderStatus::Open, None),
    };

    Valuation {
        profit,
        profit_percent,
        status,
        close_reason,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
