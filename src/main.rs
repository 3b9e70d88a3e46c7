use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use signalbot::config::{SimulatorSettings, StrategyConfig, SyncSettings, TestnetCredentials};
use signalbot::exchange::{BinanceTestnetClient, ExchangeClient};
use signalbot::market::{BinanceMarketData, FixedPriceOracle, PriceOracle};
use signalbot::models::TradingSignal;
use signalbot::simulator::MarketSimulator;
use signalbot::store::OrderStore;
use signalbot::sync::ReconciliationService;
use signalbot::trading::{SignalOutcome, TradingService};

#[derive(Debug, Parser)]
#[command(name = "signalbot", about = "Signal-driven trading simulator with testnet sync")]
struct Args {
    /// Seconds between simulated mark-to-market ticks
    #[arg(long, default_value_t = 60)]
    sim_interval: u64,

    /// Seconds between testnet reconciliation passes
    #[arg(long, default_value_t = 30)]
    sync_interval: u64,

    /// Run against a fixed offline price table instead of the live ticker
    #[arg(long)]
    offline: bool,

    /// Process one synthetic BUY signal on startup (handy for smoke runs)
    #[arg(long)]
    send_test_signal: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    let config = StrategyConfig::from_env();

    tracing::info!("signalbot starting");
    tracing::info!("  Symbol: {} ({})", config.symbol, config.timeframe);
    tracing::info!(
        "  Thresholds: +DI>{}, -DI<{}, ADX>={}",
        config.plus_di_threshold,
        config.minus_di_threshold,
        config.adx_minimum
    );
    tracing::info!(
        "  TP/SL: {}% / {}%, leverage {}x, quantity {}",
        config.take_profit_percent,
        config.stop_loss_percent,
        config.leverage,
        config.quantity
    );

    let store = Arc::new(OrderStore::new());

    let oracle: Arc<dyn PriceOracle> = if args.offline {
        tracing::info!("  Price feed: offline fallback table");
        Arc::new(FixedPriceOracle::single(config.symbol.clone(), 50_000.0))
    } else {
        tracing::info!("  Price feed: Binance spot ticker");
        Arc::new(BinanceMarketData::new())
    };

    let exchange: Option<Arc<dyn ExchangeClient>> = match TestnetCredentials::from_env()? {
        Some(credentials) => {
            tracing::info!("  Testnet execution: enabled");
            Some(Arc::new(BinanceTestnetClient::new(
                credentials.api_key,
                credentials.api_secret,
            )))
        }
        None => {
            tracing::info!("  Testnet execution: disabled (no credentials)");
            None
        }
    };

    let trading = TradingService::new(store.clone(), oracle.clone(), exchange.clone(), config);

    if args.send_test_signal {
        send_test_signal(&trading).await;
    }

    let simulator = MarketSimulator::new(
        store.clone(),
        oracle,
        SimulatorSettings {
            interval: Duration::from_secs(args.sim_interval),
            ..SimulatorSettings::default()
        },
    );
    simulator.start();

    let reconciliation = exchange.map(|client| {
        let service = ReconciliationService::new(
            store,
            client,
            SyncSettings {
                interval: Duration::from_secs(args.sync_interval),
            },
        );
        service.start();
        service
    });

    tracing::info!("Press Ctrl+C to stop...");
    tokio::signal::ctrl_c().await?;

    tracing::info!("shutting down");
    simulator.stop();
    if let Some(service) = reconciliation {
        service.stop();
    }

    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signalbot=info".into()),
        )
        .init();
}

/// One synthetic BUY-grade signal through the full path, mirroring the old
/// test-webhook script.
async fn send_test_signal(trading: &TradingService) {
    let signal = TradingSignal {
        plus_di: Some(30.0),
        minus_di: Some(10.0),
        adx: Some(25.0),
        symbol: None,
        timeframe: None,
    };

    match trading.process_signal(&signal).await {
        Ok(SignalOutcome::Executed { order, remote_error }) => {
            tracing::info!(order_id = %order.id, "test signal executed");
            if let Some(error) = remote_error {
                tracing::warn!(error = %error, "testnet placement failed for test signal");
            }
        }
        Ok(SignalOutcome::Rejected { reason }) => {
            tracing::warn!(reason = %reason, "test signal rejected");
        }
        Err(e) => {
            tracing::error!(error = %e, "test signal processing failed");
        }
    }
}
