use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;

use crate::config::SimulatorSettings;
use crate::evaluator::ProfitEvaluator;
use crate::market::PriceOracle;
use crate::models::{Order, OrderStatus, PriceQuote, PriceSource};
use crate::scheduler::Scheduler;
use crate::store::{OrderFilter, OrderStore};

/// Periodic driver that walks a synthetic price over every symbol with open
/// orders and feeds it to the evaluator.
pub struct MarketSimulator {
    core: Arc<SimulatorCore>,
    scheduler: Scheduler,
}

struct SimulatorCore {
    store: Arc<OrderStore>,
    oracle: Arc<dyn PriceOracle>,
    evaluator: ProfitEvaluator,
    settings: SimulatorSettings,
}

impl MarketSimulator {
    pub fn new(store: Arc<OrderStore>, oracle: Arc<dyn PriceOracle>, settings: SimulatorSettings) -> Self {
        let evaluator = ProfitEvaluator::new(store.clone());
        Self {
            core: Arc::new(SimulatorCore {
                store,
                oracle,
                evaluator,
                settings,
            }),
            scheduler: Scheduler::new("market-simulator", settings.interval),
        }
    }

    /// Start the periodic updates. No-op returning false when already
    /// running.
    pub fn start(&self) -> bool {
        let core = self.core.clone();
        self.scheduler.start(move || {
            let core = core.clone();
            async move {
                core.update_open_orders().await;
            }
        })
    }

    pub fn stop(&self) -> bool {
        self.scheduler.stop()
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Run one tick synchronously, returning the number of orders touched.
    pub async fn force_update(&self) -> usize {
        self.core.update_open_orders().await
    }
}

impl SimulatorCore {
    /// One simulation tick: group open orders by symbol, derive one
    /// simulated price per symbol, and re-price every order at it. A failed
    /// price fetch skips that symbol for this tick only.
    async fn update_open_orders(&self) -> usize {
        let open_orders = self.store.list(&OrderFilter::by_status(OrderStatus::Open));

        let mut by_symbol: HashMap<String, Vec<Order>> = HashMap::new();
        for order in open_orders {
            by_symbol.entry(order.symbol.clone()).or_default().push(order);
        }

        let mut touched = 0;

        for (symbol, orders) in by_symbol {
            let base = match self.oracle.get_current_price(&symbol).await {
                Ok(quote) => quote,
                Err(e) => {
                    tracing::warn!(symbol = %symbol, error = %e, "price fetch failed, skipping symbol this tick");
                    continue;
                }
            };

            let simulated = simulate_quote(&base, &self.settings, &mut rand::thread_rng());
            tracing::info!(
                symbol = %symbol,
                base_price = base.price,
                simulated_price = simulated.price,
                orders = orders.len(),
                "simulation tick"
            );

            for order in &orders {
                match self.evaluator.evaluate(order, simulated.price) {
                    Ok(_) => touched += 1,
                    Err(e) => {
                        tracing::error!(order_id = %order.id, error = %e, "failed to re-price order");
                    }
                }
            }
        }

        touched
    }
}

/// Apply a bounded random walk step to a base quote.
///
/// The change is drawn uniformly from `(-volatility, volatility)` and
/// clamped to `[-max_move, max_move]`, so the result always lies within
/// `base * (1 ± max_move)`.
pub fn simulate_quote<R: Rng>(base: &PriceQuote, settings: &SimulatorSettings, rng: &mut R) -> PriceQuote {
    let change: f64 = rng.gen_range(-settings.volatility..settings.volatility);
    let clamped = change.clamp(-settings.max_move, settings.max_move);
    PriceQuote::new(
        base.symbol.clone(),
        base.price * (1.0 + clamped),
        PriceSource::Simulated,
    )
}
