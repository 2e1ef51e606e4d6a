use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::Mutex;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use signal_engine::config::{self, RuntimeConfig};
use signal_engine::error::EngineError;
use signal_engine::exchange::CandleFetcher;
use signal_engine::persistence::{FileStore, Persistence};
use signal_engine::strategy::Strategy;
use signal_engine::types::{Candle, Frame, Interval, Position, ProposedSignal, SignalState};
use signal_engine::{Event, EventBus, Registry};

#[derive(Parser)]
#[command(name = "signal-engine-cli")]
#[command(author = "Trading Bot")]
#[command(version = "0.1.0")]
#[command(about = "Deterministic signal-lifecycle execution engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a synthetic price series through the engine and report every transition
    Backtest {
        /// Start date (YYYY-MM-DD)
        #[arg(short, long)]
        start: String,
        /// End date (YYYY-MM-DD)
        #[arg(short, long)]
        end: String,
        /// Symbol to backtest
        #[arg(long, default_value = "BTCUSDT")]
        symbol: String,
    },
    /// Run the engine against the wall clock until interrupted
    Live {
        #[arg(long, default_value = "BTCUSDT")]
        symbol: String,
    },
    /// Show the current slot state (demo: always idle, no persisted session loaded)
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("signal-engine-cli v0.1.0");

    let runtime_config = Arc::new(config::load(Some(&cli.config)).unwrap_or_else(|e| {
        error!("failed to load {}: {}, falling back to defaults", cli.config, e);
        RuntimeConfig::default()
    }));

    match cli.command {
        Commands::Backtest { start, end, symbol } => {
            run_backtest(runtime_config, &start, &end, &symbol).await?;
        }
        Commands::Live { symbol } => {
            run_live(runtime_config, &symbol).await?;
        }
        Commands::Status => {
            info!("status: no persisted session loaded, slot is idle");
        }
    }

    Ok(())
}

async fn run_backtest(config: Arc<RuntimeConfig>, start: &str, end: &str, symbol: &str) -> Result<()> {
    let start_date = NaiveDate::parse_from_str(start, "%Y-%m-%d").map_err(|_| anyhow!("invalid start date, use YYYY-MM-DD"))?;
    let end_date = NaiveDate::parse_from_str(end, "%Y-%m-%d").map_err(|_| anyhow!("invalid end date, use YYYY-MM-DD"))?;
    if end_date <= start_date {
        return Err(anyhow!("end date must be after start date"));
    }

    info!("backtesting {} from {} to {}", symbol, start_date, end_date);

    let registry = Registry::new();
    let exchange: Arc<dyn CandleFetcher> = Arc::new(SyntheticFetcher::new(symbol, dec!(100)));
    registry.register_exchange("synthetic", exchange).await.map_err(|e| anyhow!(e))?;
    let strategy: Arc<Mutex<Box<dyn Strategy>>> = Arc::new(Mutex::new(Box::new(SmaCrossStrategy::new())));
    registry.register_strategy("sma_cross", strategy).await.map_err(|e| anyhow!(e))?;

    let events = Arc::new(EventBus::new());
    events
        .subscribe(|event| async move {
            log_event(&event);
        })
        .await;

    let file_store: FileStore<SignalState> = FileStore::new(&config.general.persistence_root, "signal/sma_cross")?;
    let store: Arc<dyn Persistence<SignalState>> = Arc::new(file_store);
    registry
        .engine("sma_cross", "sma_cross", "synthetic", None, symbol, config, Some(store), events.clone())
        .await
        .map_err(|e| anyhow!(e))?;

    let start_dt = Utc
        .from_utc_datetime(&start_date.and_hms_opt(0, 0, 0).ok_or_else(|| anyhow!("invalid start date"))?);
    let end_dt = Utc
        .from_utc_datetime(&end_date.and_hms_opt(0, 0, 0).ok_or_else(|| anyhow!("invalid end date"))?);
    let frame = Frame::new("backtest", Interval::M1, start_dt, end_dt);
    registry.register_frame("backtest", frame).await.map_err(|e| anyhow!(e))?;

    let driver = registry
        .backtest_driver("sma_cross-backtest", "sma_cross", "synthetic", "backtest", events)
        .await
        .map_err(|e| anyhow!(e))?;
    let evaluated = driver.run().await?;

    info!("backtest finished, {} ticks evaluated", evaluated);
    Ok(())
}

async fn run_live(config: Arc<RuntimeConfig>, symbol: &str) -> Result<()> {
    info!("starting live run for {}, press Ctrl+C to stop", symbol);

    let registry = Registry::new();
    let exchange: Arc<dyn CandleFetcher> = Arc::new(SyntheticFetcher::new(symbol, dec!(100)));
    registry.register_exchange("synthetic", exchange).await.map_err(|e| anyhow!(e))?;
    let strategy: Arc<Mutex<Box<dyn Strategy>>> = Arc::new(Mutex::new(Box::new(SmaCrossStrategy::new())));
    registry.register_strategy("sma_cross", strategy).await.map_err(|e| anyhow!(e))?;

    let events = Arc::new(EventBus::new());
    events
        .subscribe(|event| async move {
            log_event(&event);
        })
        .await;

    let tick_ttl_ms = config.general.tick_ttl_ms;
    let file_store: FileStore<SignalState> = FileStore::new(&config.general.persistence_root, "signal/sma_cross")?;
    let store: Arc<dyn Persistence<SignalState>> = Arc::new(file_store);
    registry
        .engine("sma_cross", "sma_cross", "synthetic", None, symbol, config, Some(store), events.clone())
        .await
        .map_err(|e| anyhow!(e))?;

    let driver = registry
        .live_driver("sma_cross-live", "sma_cross", tick_ttl_ms, events)
        .await
        .map_err(|e| anyhow!(e))?;
    let driver_for_signal = driver.clone();

    tokio::select! {
        result = driver.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested, waiting for the current slot to go idle...");
            driver_for_signal.request_stop();
            driver_for_signal.run().await?;
        }
    }

    Ok(())
}

fn log_event(event: &Event) {
    match event {
        Event::Idle { strategy_name, symbol } => info!(strategy_name, symbol, "idle"),
        Event::Scheduled { record } => info!(id = %record.id, symbol = %record.symbol, position = %record.position, "scheduled"),
        Event::Opened { record } => info!(id = %record.id, symbol = %record.symbol, price_open = %record.price_open, "opened"),
        Event::Active { record } => info!(id = %record.id, symbol = %record.symbol, "active"),
        Event::Closed { record, reason, pnl } => {
            info!(id = %record.id, symbol = %record.symbol, reason = ?reason, pnl_pct = %pnl.pnl_pct, "closed")
        }
        Event::Cancelled { record, reason } => info!(id = %record.id, symbol = %record.symbol, reason = ?reason, "cancelled"),
        Event::RiskRejection { strategy_name, symbol, note } => info!(strategy_name, symbol, note, "risk rejection"),
        Event::Error { strategy_name, symbol, message } => error!(strategy_name, symbol, message, "engine error"),
        Event::Done { backtest } => info!(backtest, "done"),
    }
}

/// A deterministic pseudo-random walk used by the demo CLI in place of a
/// real exchange client — order placement and live market-data plumbing are
/// a host's concern, not this engine's (§6 non-goals).
struct SyntheticFetcher {
    symbol: String,
    seed_price: Decimal,
    // Millisecond cursor advanced by every fetch, so `get_candles_next` picks
    // up right after whatever was last served instead of always restarting
    // at zero (§6).
    cursor_ms: AtomicI64,
}

impl SyntheticFetcher {
    fn new(symbol: impl Into<String>, seed_price: Decimal) -> Self {
        Self { symbol: symbol.into(), seed_price, cursor_ms: AtomicI64::new(0) }
    }

    fn candle_at(&self, timestamp_ms: i64) -> Candle {
        let step = timestamp_ms / 60_000;
        let wobble = Decimal::from((step.rem_euclid(23) - 11).abs()) * dec!(0.05);
        let direction = if step.rem_euclid(2) == 0 { dec!(1) } else { dec!(-1) };
        let close = (self.seed_price + wobble * direction).max(dec!(0.01));
        let open = close - dec!(0.05) * direction;
        let high = open.max(close) + dec!(0.05);
        let low = open.min(close) - dec!(0.05);
        Candle::new(timestamp_ms, open, high, low, close, dec!(10))
    }
}

#[async_trait]
impl CandleFetcher for SyntheticFetcher {
    async fn get_candles(&self, _symbol: &str, interval: Interval, since_ms: i64, limit: usize) -> Result<Vec<Candle>, EngineError> {
        let step = interval.to_millis().max(60_000);
        let candles: Vec<Candle> = (0..limit as i64).map(|i| self.candle_at(since_ms + i * step)).collect();
        self.cursor_ms.store(since_ms + limit as i64 * step, Ordering::SeqCst);
        Ok(candles)
    }

    async fn get_candles_next(&self, _symbol: &str, interval: Interval, limit: usize) -> Result<Vec<Candle>, EngineError> {
        let step = interval.to_millis().max(60_000);
        let since_ms = self.cursor_ms.load(Ordering::SeqCst);
        let candles: Vec<Candle> = (0..limit as i64).map(|i| self.candle_at(since_ms + i * step)).collect();
        self.cursor_ms.store(since_ms + limit as i64 * step, Ordering::SeqCst);
        Ok(candles)
    }
}

/// Minimal SMA-crossover demo strategy: proposes an immediate long the first
/// time it is asked, then stays quiet. Exists only so `backtest`/`live` have
/// something to run; real strategies are supplied by the host.
struct SmaCrossStrategy {
    proposed_once: bool,
}

impl SmaCrossStrategy {
    fn new() -> Self {
        Self { proposed_once: false }
    }
}

#[async_trait]
impl Strategy for SmaCrossStrategy {
    fn name(&self) -> &str {
        "sma_cross"
    }

    fn interval_ms(&self) -> i64 {
        60_000
    }

    async fn get_signal(&mut self, _symbol: &str) -> Option<ProposedSignal> {
        if self.proposed_once {
            return None;
        }
        self.proposed_once = true;
        Some(ProposedSignal {
            position: Position::Long,
            price_open: None,
            price_take_profit: dec!(103),
            price_stop_loss: dec!(98),
            minute_estimated_time: 240,
            note: "demo crossover".to_string(),
            id: None,
        })
    }
}
