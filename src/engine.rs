use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::RuntimeConfig;
use crate::error::EngineResult;
use crate::eventbus::{Event, EventBus};
use crate::exchange::CandleFetcher;
use crate::oracle::{OracleOutcome, PriceOracle};
use crate::persistence::{Persistence, ReadOutcome};
use crate::pnl::PnlCalculator;
use crate::risk::{RiskDecision, RiskGate};
use crate::strategy::Strategy;
use crate::types::{Candle, CancelReason, CloseReason, Interval, Position, SignalRecord, SignalState};
use crate::validator::{SignalValidator, ValidationOutcome};

enum ScheduledOutcome {
    StopBeforeActivation,
    Activated,
    NoTouch,
}

/// The per-(strategy,symbol) state machine (§4.6). Holds at most one
/// `SignalRecord` and drives it through `idle → scheduled/opened → active →
/// closed/cancelled → idle` exclusively via `tick` and `backtest`; there are
/// no internal timers.
///
/// `Opened` and the terminal states are never cached in `self.state` — they
/// are one-tick-visible return values only. `Opened` is promoted to `Active`
/// immediately (persistence records a position as `Active` from the moment
/// it is entered, since there is no behavioral difference between the two
/// for recovery purposes), and `Closed`/`Cancelled` revert the cached slot
/// to `Idle` in the same tick that produced them, matching §3's "ceases to
/// exist on disk the instant it becomes closed or cancelled".
pub struct SignalEngine {
    strategy_name: String,
    exchange_name: String,
    symbol: String,
    config: Arc<RuntimeConfig>,
    fetcher: Arc<dyn CandleFetcher>,
    strategy: Arc<Mutex<Box<dyn Strategy>>>,
    risk_gate: Option<Arc<RiskGate>>,
    store: Option<Arc<dyn Persistence<SignalState>>>,
    events: Arc<EventBus>,
    oracle: PriceOracle,
    validator: SignalValidator,
    pnl_calculator: PnlCalculator,
    state: Mutex<SignalState>,
    last_get_signal_at: Mutex<Option<i64>>,
    loaded: AtomicBool,
    stopped: AtomicBool,
}

impl SignalEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        strategy_name: impl Into<String>,
        exchange_name: impl Into<String>,
        symbol: impl Into<String>,
        config: Arc<RuntimeConfig>,
        fetcher: Arc<dyn CandleFetcher>,
        strategy: Arc<Mutex<Box<dyn Strategy>>>,
        risk_gate: Option<Arc<RiskGate>>,
        store: Option<Arc<dyn Persistence<SignalState>>>,
        events: Arc<EventBus>,
    ) -> Self {
        let oracle = PriceOracle::new(config.clone());
        let validator = SignalValidator::new(config.clone());
        let pnl_calculator = PnlCalculator::new(config.pnl.slippage_fraction(), config.pnl.fee_fraction());
        Self {
            strategy_name: strategy_name.into(),
            exchange_name: exchange_name.into(),
            symbol: symbol.into(),
            config,
            fetcher,
            strategy,
            risk_gate,
            store,
            events,
            oracle,
            validator,
            pnl_calculator,
            state: Mutex::new(SignalState::Idle),
            last_get_signal_at: Mutex::new(None),
            loaded: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn strategy_name(&self) -> &str {
        &self.strategy_name
    }

    /// Prevents future `getSignal` invocations for this slot. Does not
    /// forcibly close a live position — the engine keeps evaluating exits
    /// until the current signal reaches a terminal state (§4.6).
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub async fn current_state(&self) -> SignalState {
        self.state.lock().await.clone()
    }

    async fn ensure_loaded(&self) -> EngineResult<()> {
        if self.loaded.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let Some(store) = &self.store else { return Ok(()) };
        match store.read(&self.symbol).await {
            ReadOutcome::Found(state) => {
                info!(symbol = %self.symbol, strategy = %self.strategy_name, label = state.label(), "recovered signal state from persistence");
                *self.state.lock().await = state;
            }
            ReadOutcome::NotFound => {}
            ReadOutcome::Corrupt(reason) => {
                error!(symbol = %self.symbol, reason = %reason, "persisted signal entry is corrupt, removing");
                store.remove(&self.symbol).await?;
            }
        }
        Ok(())
    }

    /// Drives the slot forward by one tick (§4.6 `tick` contract).
    pub async fn tick(&self, now_ms: i64) -> EngineResult<SignalState> {
        self.ensure_loaded().await?;
        let mut guard = self.state.lock().await;
        let current = guard.clone();
        let (result, next_cached) = match current {
            SignalState::Idle => self.handle_idle(now_ms).await?,
            SignalState::Scheduled(record) => self.handle_scheduled(record, now_ms).await?,
            SignalState::Active(record) => self.handle_active(record, now_ms).await?,
            // Opened/Closed/Cancelled are never cached; defensive fallback only.
            other => (other, SignalState::Idle),
        };
        *guard = next_cached;
        Ok(result)
    }

    /// Fast-forwards an `opened`/`active` signal across historical candles
    /// (§4.6 `backtest`). Returns `None` if the slot is not currently
    /// active, or `Some((Closed{..}, closeTimestampMs))` once an exit
    /// condition fires within the given candle slice — the timestamp lets
    /// `BacktestDriver` skip ahead to the right frame position; if no
    /// candle closes the position the slot remains `Active` and `None` is
    /// returned.
    pub async fn backtest(&self, candles: &[Candle]) -> EngineResult<Option<(SignalState, i64)>> {
        let record = {
            let guard = self.state.lock().await;
            match &*guard {
                SignalState::Active(record) => record.clone(),
                _ => return Ok(None),
            }
        };

        for candle in candles {
            if let Some((reason, price)) = Self::evaluate_exit_candle(&record, candle) {
                let state = self.close_and_finalize(record, price, reason).await?;
                *self.state.lock().await = SignalState::Idle;
                return Ok(Some((state, candle.timestamp_ms)));
            }
            if candle.timestamp_ms - record.pending_at >= record.minute_estimated_time * 60_000 {
                let state = self.close_and_finalize(record, candle.close, CloseReason::TimeExpired).await?;
                *self.state.lock().await = SignalState::Idle;
                return Ok(Some((state, candle.timestamp_ms)));
            }
        }
        Ok(None)
    }

    async fn handle_idle(&self, now_ms: i64) -> EngineResult<(SignalState, SignalState)> {
        if self.stopped.load(Ordering::SeqCst) {
            self.publish_idle().await;
            return Ok((SignalState::Idle, SignalState::Idle));
        }

        let interval_ms = self.strategy.lock().await.interval_ms();
        {
            let mut last = self.last_get_signal_at.lock().await;
            if let Some(last_ms) = *last {
                if now_ms - last_ms < interval_ms {
                    drop(last);
                    self.publish_idle().await;
                    return Ok((SignalState::Idle, SignalState::Idle));
                }
            }
            *last = Some(now_ms);
        }

        let timeout = Duration::from_secs(self.config.scheduling.max_signal_generation_seconds.max(0) as u64);
        let proposed = {
            let mut strategy = self.strategy.lock().await;
            match tokio::time::timeout(timeout, strategy.get_signal(&self.symbol)).await {
                Ok(Some(proposed)) => proposed,
                Ok(None) => {
                    self.publish_idle().await;
                    return Ok((SignalState::Idle, SignalState::Idle));
                }
                Err(_) => {
                    self.publish_error("strategy getSignal timed out".to_string()).await;
                    return Ok((SignalState::Idle, SignalState::Idle));
                }
            }
        };

        let current_price = match self.oracle.reference_price(self.fetcher.as_ref(), &self.symbol, now_ms).await {
            Ok(OracleOutcome::Price(price)) => price,
            Ok(OracleOutcome::InsufficientData) => {
                self.publish_idle().await;
                return Ok((SignalState::Idle, SignalState::Idle));
            }
            Err(e) => {
                self.publish_error(e.to_string()).await;
                return Ok((SignalState::Idle, SignalState::Idle));
            }
        };

        let record = match self.validator.validate(&proposed, &self.symbol, &self.strategy_name, &self.exchange_name, current_price, now_ms) {
            ValidationOutcome::Rejected(reason) => {
                self.publish_error(reason).await;
                return Ok((SignalState::Idle, SignalState::Idle));
            }
            ValidationOutcome::Valid(record) => record,
        };

        if let Some(gate) = &self.risk_gate {
            let decision = gate.check(&proposed, &self.symbol, &self.strategy_name, current_price, now_ms).await;
            if decision == RiskDecision::Reject {
                self.events
                    .publish(Event::RiskRejection {
                        strategy_name: self.strategy_name.clone(),
                        symbol: self.symbol.clone(),
                        note: "risk gate vetoed proposed signal".to_string(),
                    })
                    .await;
                return Ok((SignalState::Idle, SignalState::Idle));
            }
        }

        let is_immediate = proposed.price_open.is_none() || proposed.price_open == Some(current_price);
        if is_immediate {
            self.finalize_opened(record, now_ms).await
        } else {
            if let Some(store) = &self.store {
                store.write(&self.symbol, &SignalState::Scheduled(record.clone())).await?;
            }
            self.events.publish(Event::Scheduled { record: record.clone() }).await;
            Ok((SignalState::Scheduled(record.clone()), SignalState::Scheduled(record)))
        }
    }

    async fn handle_scheduled(&self, record: SignalRecord, now_ms: i64) -> EngineResult<(SignalState, SignalState)> {
        let await_deadline_ms = record.scheduled_at + self.config.scheduling.schedule_await_minutes * 60_000;
        if now_ms >= await_deadline_ms {
            return self.finalize_cancelled(record, CancelReason::ScheduleTimeout).await;
        }

        let Some(candle) = self.latest_candle(now_ms).await else {
            return Ok((SignalState::Scheduled(record.clone()), SignalState::Scheduled(record)));
        };

        match Self::scheduled_outcome(&record, &candle) {
            ScheduledOutcome::StopBeforeActivation => self.finalize_cancelled(record, CancelReason::StopBeforeActivation).await,
            ScheduledOutcome::Activated => self.finalize_opened(record, now_ms).await,
            ScheduledOutcome::NoTouch => Ok((SignalState::Scheduled(record.clone()), SignalState::Scheduled(record))),
        }
    }

    async fn handle_active(&self, record: SignalRecord, now_ms: i64) -> EngineResult<(SignalState, SignalState)> {
        let price = match self.oracle.reference_price(self.fetcher.as_ref(), &self.symbol, now_ms).await {
            Ok(OracleOutcome::Price(price)) => price,
            Ok(OracleOutcome::InsufficientData) => {
                return Ok((SignalState::Active(record.clone()), SignalState::Active(record)));
            }
            Err(e) => {
                self.publish_error(e.to_string()).await;
                return Ok((SignalState::Active(record.clone()), SignalState::Active(record)));
            }
        };

        if let Some((reason, exit_price)) = Self::evaluate_exit_price(&record, price) {
            let state = self.close_and_finalize(record, exit_price, reason).await?;
            return Ok((state, SignalState::Idle));
        }

        if now_ms - record.pending_at >= record.minute_estimated_time * 60_000 {
            let state = self.close_and_finalize(record, price, CloseReason::TimeExpired).await?;
            return Ok((state, SignalState::Idle));
        }

        Ok((SignalState::Active(record.clone()), SignalState::Active(record)))
    }

    async fn finalize_opened(&self, mut record: SignalRecord, now_ms: i64) -> EngineResult<(SignalState, SignalState)> {
        record.pending_at = now_ms;
        if let Some(store) = &self.store {
            store.write(&self.symbol, &SignalState::Active(record.clone())).await?;
        }
        if let Some(gate) = &self.risk_gate {
            gate.add(&record, &self.strategy_name, &self.exchange_name, now_ms).await?;
        }
        info!(symbol = %self.symbol, strategy = %self.strategy_name, price_open = %record.price_open, "signal opened");
        self.events.publish(Event::Opened { record: record.clone() }).await;
        Ok((SignalState::Opened(record.clone()), SignalState::Active(record)))
    }

    async fn finalize_cancelled(&self, record: SignalRecord, reason: CancelReason) -> EngineResult<(SignalState, SignalState)> {
        if let Some(store) = &self.store {
            store.remove(&self.symbol).await?;
        }
        info!(symbol = %self.symbol, strategy = %self.strategy_name, reason = %reason, "signal cancelled");
        self.events.publish(Event::Cancelled { record: record.clone(), reason }).await;
        Ok((SignalState::Cancelled { record, reason }, SignalState::Idle))
    }

    async fn close_and_finalize(&self, record: SignalRecord, price_close: Decimal, reason: CloseReason) -> EngineResult<SignalState> {
        let pnl = self.pnl_calculator.close(record.position, record.price_open, price_close, reason);
        if let Some(store) = &self.store {
            store.remove(&self.symbol).await?;
        }
        if let Some(gate) = &self.risk_gate {
            gate.drop_position(&self.strategy_name, &self.symbol).await?;
        }
        info!(symbol = %self.symbol, strategy = %self.strategy_name, reason = %reason, pnl_pct = %pnl.pnl_pct, "signal closed");
        self.events.publish(Event::Closed { record: record.clone(), reason, pnl }).await;
        Ok(SignalState::Closed { record, pnl })
    }

    async fn publish_idle(&self) {
        self.events
            .publish(Event::Idle { strategy_name: self.strategy_name.clone(), symbol: self.symbol.clone() })
            .await;
    }

    async fn publish_error(&self, message: String) {
        self.events
            .publish(Event::Error { strategy_name: self.strategy_name.clone(), symbol: self.symbol.clone(), message })
            .await;
    }

    async fn latest_candle(&self, now_ms: i64) -> Option<Candle> {
        let since_ms = now_ms - Interval::M1.to_millis() * 2;
        let candles = self.fetcher.get_candles(&self.symbol, Interval::M1, since_ms, 2).await.ok()?;
        candles.into_iter().filter(|c| c.timestamp_ms < now_ms).last()
    }

    /// Activation-vs-stop priority for a scheduled signal (§4.6): the
    /// stop-loss side is checked first, so a candle spanning both the entry
    /// and the stop cancels rather than opening only to immediately close.
    fn scheduled_outcome(record: &SignalRecord, candle: &Candle) -> ScheduledOutcome {
        match record.position {
            Position::Long => {
                if candle.low <= record.price_stop_loss {
                    ScheduledOutcome::StopBeforeActivation
                } else if candle.low <= record.price_open {
                    ScheduledOutcome::Activated
                } else {
                    ScheduledOutcome::NoTouch
                }
            }
            Position::Short => {
                if candle.high >= record.price_stop_loss {
                    ScheduledOutcome::StopBeforeActivation
                } else if candle.high >= record.price_open {
                    ScheduledOutcome::Activated
                } else {
                    ScheduledOutcome::NoTouch
                }
            }
        }
    }

    /// Exit evaluation against a scalar reference price (the oracle's
    /// per-tick VWAP). Stop-loss is checked before take-profit so the
    /// SL-wins tie-break (§9) is structural rather than a special case.
    fn evaluate_exit_price(record: &SignalRecord, price: Decimal) -> Option<(CloseReason, Decimal)> {
        match record.position {
            Position::Long => {
                if price <= record.price_stop_loss {
                    Some((CloseReason::StopLoss, price))
                } else if price >= record.price_take_profit {
                    Some((CloseReason::TakeProfit, price))
                } else {
                    None
                }
            }
            Position::Short => {
                if price >= record.price_stop_loss {
                    Some((CloseReason::StopLoss, price))
                } else if price <= record.price_take_profit {
                    Some((CloseReason::TakeProfit, price))
                } else {
                    None
                }
            }
        }
    }

    /// Same evaluation, against a candle's own close (§4.6 fast-forward
    /// resolution of the open question on per-candle reference price).
    fn evaluate_exit_candle(record: &SignalRecord, candle: &Candle) -> Option<(CloseReason, Decimal)> {
        Self::evaluate_exit_price(record, candle.close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProposedSignal;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct QueueStrategy {
        interval_ms: i64,
        queue: Vec<Option<ProposedSignal>>,
    }

    #[async_trait]
    impl Strategy for QueueStrategy {
        fn name(&self) -> &str {
            "test-strategy"
        }
        fn interval_ms(&self) -> i64 {
            self.interval_ms
        }
        async fn get_signal(&mut self, _symbol: &str) -> Option<ProposedSignal> {
            if self.queue.is_empty() {
                None
            } else {
                self.queue.remove(0)
            }
        }
    }

    struct FixedFetcher {
        candles: Vec<Candle>,
    }

    #[async_trait]
    impl CandleFetcher for FixedFetcher {
        async fn get_candles(&self, _symbol: &str, _interval: Interval, since_ms: i64, limit: usize) -> Result<Vec<Candle>, crate::error::EngineError> {
            let mut matched: Vec<Candle> = self.candles.iter().filter(|c| c.timestamp_ms >= since_ms).cloned().collect();
            matched.truncate(limit);
            Ok(matched)
        }
        async fn get_candles_next(&self, _symbol: &str, _interval: Interval, _limit: usize) -> Result<Vec<Candle>, crate::error::EngineError> {
            Ok(Vec::new())
        }
    }

    struct InMemoryStore {
        data: StdMutex<HashMap<String, SignalState>>,
    }

    impl InMemoryStore {
        fn new() -> Self {
            Self { data: StdMutex::new(HashMap::new()) }
        }
    }

    #[async_trait]
    impl Persistence<SignalState> for InMemoryStore {
        async fn read(&self, entity_id: &str) -> ReadOutcome<SignalState> {
            match self.data.lock().unwrap().get(entity_id) {
                Some(state) => ReadOutcome::Found(state.clone()),
                None => ReadOutcome::NotFound,
            }
        }
        async fn write(&self, entity_id: &str, value: &SignalState) -> EngineResult<()> {
            self.data.lock().unwrap().insert(entity_id.to_string(), value.clone());
            Ok(())
        }
        async fn remove(&self, entity_id: &str) -> EngineResult<()> {
            self.data.lock().unwrap().remove(entity_id);
            Ok(())
        }
        async fn list(&self) -> EngineResult<Vec<String>> {
            Ok(self.data.lock().unwrap().keys().cloned().collect())
        }
        async fn init(&self) -> EngineResult<Vec<(String, SignalState)>> {
            Ok(self.data.lock().unwrap().iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        }
    }

    fn small_window_config() -> Arc<RuntimeConfig> {
        let mut config = RuntimeConfig::default();
        config.oracle.avg_price_candles_count = 1;
        config.oracle.min_candles_for_median = 1;
        Arc::new(config)
    }

    fn make_engine(
        config: Arc<RuntimeConfig>,
        candles: Vec<Candle>,
        queue: Vec<Option<ProposedSignal>>,
        store: Option<Arc<dyn Persistence<SignalState>>>,
    ) -> SignalEngine {
        let fetcher: Arc<dyn CandleFetcher> = Arc::new(FixedFetcher { candles });
        let strategy: Arc<Mutex<Box<dyn Strategy>>> = Arc::new(Mutex::new(Box::new(QueueStrategy { interval_ms: 0, queue })));
        SignalEngine::new("trend", "binance", "BTCUSDT", config, fetcher, strategy, None, store, Arc::new(EventBus::new()))
    }

    fn candle(ts: i64, o: Decimal, h: Decimal, l: Decimal, c: Decimal) -> Candle {
        Candle::new(ts, o, h, l, c, dec!(1))
    }

    #[tokio::test]
    async fn immediate_long_opens_then_closes_on_take_profit_via_backtest() {
        let config = small_window_config();
        let candles = vec![candle(-60_000, dec!(100), dec!(100), dec!(100), dec!(100))];
        let proposed = ProposedSignal::long(dec!(101), dec!(99), 60);
        let engine = make_engine(config, candles, vec![Some(proposed)], None);

        let opened = engine.tick(0).await.unwrap();
        assert!(matches!(opened, SignalState::Opened(_)));
        assert!(matches!(engine.current_state().await, SignalState::Active(_)));

        let fast_forward_candles = vec![
            candle(60_000, dec!(100), dec!(100.5), dec!(99.8), dec!(100.5)),
            candle(120_000, dec!(100.5), dec!(101.3), dec!(100.4), dec!(101.2)),
        ];
        let (closed, close_ts) = engine.backtest(&fast_forward_candles).await.unwrap().unwrap();
        assert_eq!(close_ts, 120_000);
        match closed {
            SignalState::Closed { pnl, .. } => {
                assert_eq!(pnl.reason, CloseReason::TakeProfit);
                assert!(pnl.pnl_pct > Decimal::ZERO);
            }
            _ => panic!("expected closed state"),
        }
        assert!(matches!(engine.current_state().await, SignalState::Idle));
    }

    #[tokio::test]
    async fn scheduled_long_cancels_on_stop_before_activation() {
        let config = small_window_config();
        let candles = vec![
            candle(-60_000, dec!(99.5), dec!(99.5), dec!(99.5), dec!(99.5)),
            candle(0, dec!(100), dec!(101), dec!(98.5), dec!(99)),
        ];
        let proposed = ProposedSignal::long(dec!(102), dec!(99), 60).with_price_open(dec!(100));
        let store: Arc<dyn Persistence<SignalState>> = Arc::new(InMemoryStore::new());
        let engine = make_engine(config, candles, vec![Some(proposed)], Some(store));

        let scheduled = engine.tick(0).await.unwrap();
        assert!(matches!(scheduled, SignalState::Scheduled(_)));

        let cancelled = engine.tick(60_000).await.unwrap();
        match cancelled {
            SignalState::Cancelled { reason, .. } => assert_eq!(reason, CancelReason::StopBeforeActivation),
            other => panic!("expected cancelled, got {:?}", other),
        }
        assert!(matches!(engine.current_state().await, SignalState::Idle));
    }

    #[tokio::test]
    async fn scheduled_long_cancels_on_await_timeout() {
        let mut config = RuntimeConfig::default();
        config.oracle.avg_price_candles_count = 1;
        config.oracle.min_candles_for_median = 1;
        config.scheduling.schedule_await_minutes = 1;
        let config = Arc::new(config);
        let candles = vec![candle(-60_000, dec!(99.5), dec!(99.5), dec!(99.5), dec!(99.5))];
        let proposed = ProposedSignal::long(dec!(102), dec!(99), 60).with_price_open(dec!(100));
        let engine = make_engine(config, candles, vec![Some(proposed)], None);

        let scheduled = engine.tick(0).await.unwrap();
        assert!(matches!(scheduled, SignalState::Scheduled(_)));

        let cancelled = engine.tick(120_000).await.unwrap();
        match cancelled {
            SignalState::Cancelled { reason, .. } => assert_eq!(reason, CancelReason::ScheduleTimeout),
            other => panic!("expected cancelled, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn active_signal_closes_on_time_expiry() {
        let config = small_window_config();
        let candles = vec![
            candle(-60_000, dec!(100), dec!(100), dec!(100), dec!(100)),
            candle(60_000, dec!(100), dec!(100.2), dec!(99.9), dec!(100)),
        ];
        let proposed = ProposedSignal::long(dec!(110), dec!(90), 1);
        let engine = make_engine(config, candles, vec![Some(proposed)], None);

        let opened = engine.tick(0).await.unwrap();
        assert!(matches!(opened, SignalState::Opened(_)));

        let closed = engine.tick(120_000).await.unwrap();
        match closed {
            SignalState::Closed { pnl, .. } => assert_eq!(pnl.reason, CloseReason::TimeExpired),
            other => panic!("expected closed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn validation_rejection_keeps_slot_idle_without_persistence_write() {
        let config = small_window_config();
        let candles = vec![candle(-60_000, dec!(100), dec!(100), dec!(100), dec!(100))];
        // TP distance far below the default 0.5% minimum.
        let proposed = ProposedSignal::long(dec!(100.05), dec!(99), 60);
        let store: Arc<dyn Persistence<SignalState>> = Arc::new(InMemoryStore::new());
        let engine = make_engine(config, candles, vec![Some(proposed)], Some(store.clone()));

        let result = engine.tick(0).await.unwrap();
        assert!(matches!(result, SignalState::Idle));
        assert!(matches!(store.read("BTCUSDT").await, ReadOutcome::NotFound));
    }

    #[tokio::test]
    async fn recovers_active_signal_from_persistence_and_closes_on_first_tick() {
        let config = small_window_config();
        // Strictly older than the recovery tick at 60_000, per the oracle's window rule.
        let candles = vec![candle(59_000, dec!(101), dec!(101.5), dec!(100.9), dec!(101.5))];
        let fetcher: Arc<dyn CandleFetcher> = Arc::new(FixedFetcher { candles });
        let strategy: Arc<Mutex<Box<dyn Strategy>>> = Arc::new(Mutex::new(Box::new(QueueStrategy { interval_ms: 0, queue: vec![] })));

        let proposed = ProposedSignal::long(dec!(101), dec!(99), 60);
        let record = SignalRecord::from_proposed(&proposed, "BTCUSDT", "trend", "binance", dec!(100), 0);
        let store: Arc<dyn Persistence<SignalState>> = Arc::new(InMemoryStore::new());
        store.write("BTCUSDT", &SignalState::Active(record)).await.unwrap();

        // Simulates a restart: a fresh engine instance, with no in-memory
        // state, backed by a store that already holds an `Active` record.
        let engine = SignalEngine::new("trend", "binance", "BTCUSDT", config, fetcher, strategy, None, Some(store.clone()), Arc::new(EventBus::new()));

        let result = engine.tick(60_000).await.unwrap();
        match result {
            SignalState::Closed { pnl, .. } => assert_eq!(pnl.reason, CloseReason::TakeProfit),
            other => panic!("expected closed on first tick after recovery, got {:?}", other),
        }
        assert!(matches!(engine.current_state().await, SignalState::Idle));
        assert!(matches!(store.read("BTCUSDT").await, ReadOutcome::NotFound));
    }

    #[tokio::test]
    async fn scheduled_signal_activates_and_reaches_active_state() {
        let config = small_window_config();
        let candles = vec![
            candle(-60_000, dec!(99.7), dec!(99.7), dec!(99.7), dec!(99.7)),
            candle(0, dec!(100), dec!(100.5), dec!(99.9), dec!(100)),
        ];
        let proposed = ProposedSignal::long(dec!(102), dec!(99), 60).with_price_open(dec!(100));
        let engine = make_engine(config, candles, vec![Some(proposed)], None);

        let scheduled = engine.tick(0).await.unwrap();
        assert!(matches!(scheduled, SignalState::Scheduled(_)));

        let activated = engine.tick(60_000).await.unwrap();
        assert!(matches!(activated, SignalState::Opened(_)));
        assert!(matches!(engine.current_state().await, SignalState::Active(_)));
    }
}
