use std::sync::Arc;

use crate::config::StrategyConfig;
use crate::error::Result;
use crate::market::{calculate_tp_sl, PriceOracle};
use crate::models::{Order, SignalSnapshot, SignalVerdict, TradingSignal};
use crate::signal::validate_signal;
use crate::store::{NewOrder, OrderStore};
use crate::exchange::ExchangeClient;

/// What became of a processed signal.
#[derive(Debug, Clone)]
pub enum SignalOutcome {
    /// Signal failed validation; nothing was created.
    Rejected { reason: String },
    /// A simulated order was opened. `remote_error` reports a failed
    /// testnet placement; the local order survives it.
    Executed {
        order: Order,
        remote_error: Option<String>,
    },
}

/// Turns validated signals into orders: entry price from the oracle, TP/SL
/// from the configured percentages, optional mirror order on the testnet.
pub struct TradingService {
    store: Arc<OrderStore>,
    oracle: Arc<dyn PriceOracle>,
    exchange: Option<Arc<dyn ExchangeClient>>,
    config: StrategyConfig,
}

impl TradingService {
    pub fn new(
        store: Arc<OrderStore>,
        oracle: Arc<dyn PriceOracle>,
        exchange: Option<Arc<dyn ExchangeClient>>,
        config: StrategyConfig,
    ) -> Self {
        Self {
            store,
            oracle,
            exchange,
            config,
        }
    }

    /// Validate a signal and, when it qualifies, open a simulated order.
    ///
    /// With an exchange client configured, the order is also placed on the
    /// testnet account and linked to the returned remote id. Placement
    /// failures are isolated: the simulated order stays, the error is
    /// reported in the outcome, and reconciliation simply has nothing to do
    /// for it.
    pub async fn process_signal(&self, signal: &TradingSignal) -> Result<SignalOutcome> {
        let verdict = validate_signal(signal, &self.config);
        let action = match verdict {
            SignalVerdict::Valid { action } => action,
            SignalVerdict::Invalid { reason } => {
                tracing::info!(reason = %reason, "signal rejected");
                return Ok(SignalOutcome::Rejected { reason });
            }
        };

        let symbol = signal.symbol.clone().unwrap_or_else(|| self.config.symbol.clone());
        let quote = self.oracle.get_current_price(&symbol).await?;

        let (take_profit_price, stop_loss_price) = calculate_tp_sl(
            action,
            quote.price,
            self.config.take_profit_percent,
            self.config.stop_loss_percent,
        );

        let snapshot = match (signal.plus_di, signal.minus_di, signal.adx) {
            (Some(plus_di), Some(minus_di), Some(adx)) => Some(SignalSnapshot {
                plus_di,
                minus_di,
                adx,
            }),
            _ => None,
        };

        let order = self.store.create(NewOrder {
            symbol: symbol.clone(),
            side: action,
            quantity: self.config.quantity,
            leverage: Some(self.config.leverage),
            entry_price: quote.price,
            take_profit_price,
            stop_loss_price,
            timeframe: signal.timeframe.clone().or_else(|| Some(self.config.timeframe.clone())),
            signal: snapshot,
        })?;

        tracing::info!(
            order_id = %order.id,
            symbol = %symbol,
            side = %action,
            entry_price = quote.price,
            price_source = ?quote.source,
            take_profit_price,
            stop_loss_price,
            "opened simulated order"
        );

        let Some(exchange) = &self.exchange else {
            return Ok(SignalOutcome::Executed {
                order,
                remote_error: None,
            });
        };

        match exchange
            .place_market_order(&symbol, action, self.config.quantity, Some(self.config.leverage))
            .await
        {
            Ok(remote) => {
                let linked = self.store.link_remote(order.id, remote.order_id, remote.status)?;
                Ok(SignalOutcome::Executed {
                    order: linked,
                    remote_error: None,
                })
            }
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "testnet placement failed, keeping simulated order");
                Ok(SignalOutcome::Executed {
                    order,
                    remote_error: Some(e.to_string()),
                })
            }
        }
    }
}
