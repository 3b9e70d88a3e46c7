use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tokio::task::JoinSet;

use crate::config::SyncSettings;
use crate::error::Result;
use crate::exchange::{ExchangeClient, PositionInfo, RemoteOrder};
use crate::models::{Order, OrderStatus};
use crate::scheduler::Scheduler;
use crate::store::{OrderPatch, OrderStore};

/// Remote status value the exchange uses for a completed fill. Triggers the
/// position lookup during reconciliation.
const REMOTE_FILLED: &str = "FILLED";

/// Periodic driver that pulls the authoritative state of every
/// remote-linked order and merges it into the local record.
pub struct ReconciliationService {
    core: Arc<SyncCore>,
    scheduler: Scheduler,
}

struct SyncCore {
    store: Arc<OrderStore>,
    exchange: Arc<dyn ExchangeClient>,
}

/// Per-order outcome of one reconciliation pass.
enum SyncOutcome {
    /// Remote state fetched and merged.
    Merged(Box<Order>),
    /// Remote order missing this cycle; left unchanged, retried next tick.
    Skipped,
}

/// Translate the exchange's status vocabulary into the local one.
///
/// The table is total: anything unrecognized maps to `Open` with a warning,
/// so an order is never silently dropped from tracking because the exchange
/// grew a new status value.
pub fn map_remote_status(remote: &str) -> OrderStatus {
    match remote {
        "NEW" => OrderStatus::Open,
        "PARTIALLY_FILLED" => OrderStatus::Open,
        "FILLED" => OrderStatus::Filled,
        "CANCELED" => OrderStatus::Cancelled,
        "REJECTED" => OrderStatus::Cancelled,
        "EXPIRED" => OrderStatus::Cancelled,
        "TRADE_CLOSED" => OrderStatus::Closed,
        other => {
            tracing::warn!(remote_status = other, "unmapped remote status, keeping order open");
            OrderStatus::Open
        }
    }
}

impl ReconciliationService {
    pub fn new(store: Arc<OrderStore>, exchange: Arc<dyn ExchangeClient>, settings: SyncSettings) -> Self {
        Self {
            core: Arc::new(SyncCore { store, exchange }),
            scheduler: Scheduler::new("testnet-sync", settings.interval),
        }
    }

    /// Start periodic reconciliation. No-op returning false when already
    /// running.
    pub fn start(&self) -> bool {
        let core = self.core.clone();
        self.scheduler.start(move || {
            let core = core.clone();
            async move {
                core.sync_all().await;
            }
        })
    }

    pub fn stop(&self) -> bool {
        self.scheduler.stop()
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Run one reconciliation pass, returning how many orders were merged.
    pub async fn force_sync_once(&self) -> usize {
        self.core.clone().sync_all().await
    }
}

impl SyncCore {
    /// Reconcile every pending order concurrently. Each order is its own
    /// task; one failure only bumps the failure count and never aborts the
    /// batch.
    async fn sync_all(self: Arc<Self>) -> usize {
        let pending: Vec<Order> = self
            .store
            .list_all()
            .into_iter()
            .filter(Order::needs_reconciliation)
            .collect();

        if pending.is_empty() {
            return 0;
        }

        tracing::debug!(count = pending.len(), "reconciling remote-linked orders");

        let mut tasks = JoinSet::new();
        for order in pending {
            let core = self.clone();
            tasks.spawn(async move {
                let order_id = order.id;
                (order_id, core.sync_order(order).await)
            });
        }

        let mut merged = 0usize;
        let mut skipped = 0usize;
        let mut failed = 0usize;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(SyncOutcome::Merged(order)))) => {
                    merged += 1;
                    tracing::debug!(
                        order_id = %order.id,
                        status = %order.status,
                        "merged remote state"
                    );
                }
                Ok((_, Ok(SyncOutcome::Skipped))) => skipped += 1,
                Ok((order_id, Err(e))) => {
                    failed += 1;
                    tracing::warn!(order_id = %order_id, error = %e, "reconciliation failed, retrying next cycle");
                }
                Err(e) => {
                    failed += 1;
                    tracing::error!(error = %e, "reconciliation task panicked");
                }
            }
        }

        tracing::info!(merged, skipped, failed, "reconciliation pass finished");
        merged
    }

    /// Reconcile one order against the exchange.
    async fn sync_order(&self, order: Order) -> Result<SyncOutcome> {
        let Some(link) = order.remote.clone() else {
            return Ok(SyncOutcome::Skipped);
        };

        let remote = match self.exchange.get_order_status(&order.symbol, link.order_id).await? {
            Some(remote) => remote,
            None => {
                tracing::debug!(
                    order_id = %order.id,
                    remote_order_id = link.order_id,
                    "remote order not found, skipping this cycle"
                );
                return Ok(SyncOutcome::Skipped);
            }
        };

        let mapped = map_remote_status(&remote.status);
        let mut patch = OrderPatch {
            remote_status: Some(remote.status.clone()),
            remote_updated_at: Some(remote_timestamp(&remote)),
            ..OrderPatch::default()
        };

        if remote.status == REMOTE_FILLED {
            match self.exchange.get_position_info(&order.symbol).await {
                Ok(Some(position)) => {
                    apply_position_fields(&mut patch, &order, &remote, &position);
                }
                Ok(None) => {
                    tracing::debug!(order_id = %order.id, symbol = %order.symbol, "no active remote position");
                }
                Err(e) => {
                    // Position data only enriches the merge; the status
                    // update still goes through without it.
                    tracing::warn!(order_id = %order.id, error = %e, "position lookup failed");
                }
            }
        }

        let updated = self.store.update_status(order.id, mapped, patch)?;
        Ok(SyncOutcome::Merged(Box::new(updated)))
    }
}

/// Timestamp recorded on the remote link. Prefer the exchange's own update
/// time so that re-merging unchanged remote state writes identical fields.
fn remote_timestamp(remote: &RemoteOrder) -> DateTime<Utc> {
    remote
        .update_time
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now)
}

/// Fill profit and close fields from the live position snapshot.
fn apply_position_fields(patch: &mut OrderPatch, order: &Order, remote: &RemoteOrder, position: &PositionInfo) {
    patch.profit = Some(position.unrealized_profit);

    // Return on equity: profit relative to the margin backing the position.
    let leverage = order.leverage.unwrap_or(1.0);
    if position.entry_price > 0.0 && position.position_amt != 0.0 && leverage > 0.0 {
        let margin = position.entry_price * position.position_amt.abs() / leverage;
        patch.profit_percent = Some(position.unrealized_profit / margin * 100.0);
    }

    if let Some(ms) = remote.update_time {
        patch.close_time = Utc.timestamp_millis_opt(ms).single();
        patch.close_price = remote.price.or(Some(position.mark_price));
    }
}
