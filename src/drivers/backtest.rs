use std::sync::Arc;

use tracing::info;

use crate::engine::SignalEngine;
use crate::error::EngineResult;
use crate::eventbus::{Event, EventBus};
use crate::exchange::CandleFetcher;
use crate::types::{Frame, Interval, SignalState};

/// Walks a `Frame`'s materialized timestamp sequence against one
/// `SignalEngine`, fast-forwarding across historical candles while a
/// position is open (§4.7).
pub struct BacktestDriver {
    engine: Arc<SignalEngine>,
    exchange: Arc<dyn CandleFetcher>,
    events: Arc<EventBus>,
    frame: Frame,
}

impl BacktestDriver {
    pub fn new(engine: Arc<SignalEngine>, exchange: Arc<dyn CandleFetcher>, events: Arc<EventBus>, frame: Frame) -> Self {
        Self { engine, exchange, events, frame }
    }

    /// Runs the backtest to completion, returning the number of ticks
    /// actually evaluated (timestamps skipped by fast-forward don't count).
    pub async fn run(&self) -> EngineResult<usize> {
        let timestamps = self.frame.timestamps();
        let mut evaluated = 0usize;
        let mut skip_until: Option<i64> = None;

        for timestamp in timestamps {
            if let Some(until) = skip_until {
                if timestamp <= until {
                    continue;
                }
                skip_until = None;
            }

            evaluated += 1;
            let state = self.engine.tick(timestamp).await?;

            if let SignalState::Opened(record) = state {
                let horizon_limit = ((record.minute_estimated_time * 60_000) / self.frame.interval.to_millis()).max(1) as usize;
                let candles = self.exchange.get_candles_next(&record.symbol, self.frame.interval, horizon_limit).await?;
                if let Some((_closed, close_ts)) = self.engine.backtest(&candles).await? {
                    skip_until = Some(close_ts);
                }
            }
        }

        info!(frame = %self.frame.name, evaluated, "backtest finished");
        self.events.publish(Event::Done { backtest: true }).await;
        Ok(evaluated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::persistence::Persistence;
    use crate::risk::RiskGate;
    use crate::strategy::Strategy;
    use crate::types::{Candle, SignalState as State};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tokio::sync::Mutex;

    struct QueueStrategy {
        queue: Vec<Option<crate::types::ProposedSignal>>,
    }

    #[async_trait]
    impl Strategy for QueueStrategy {
        fn name(&self) -> &str {
            "test"
        }
        fn interval_ms(&self) -> i64 {
            0
        }
        async fn get_signal(&mut self, _symbol: &str) -> Option<crate::types::ProposedSignal> {
            if self.queue.is_empty() {
                None
            } else {
                self.queue.remove(0)
            }
        }
    }

    struct SeriesFetcher {
        candles: Vec<Candle>,
        // Tracks the timestamp of the last candle served by either method, so
        // `get_candles_next` can resume right after it (§6).
        cursor_ms: std::sync::atomic::AtomicI64,
    }

    impl SeriesFetcher {
        fn new(candles: Vec<Candle>) -> Self {
            Self { candles, cursor_ms: std::sync::atomic::AtomicI64::new(i64::MIN) }
        }
    }

    #[async_trait]
    impl CandleFetcher for SeriesFetcher {
        async fn get_candles(&self, _symbol: &str, _interval: Interval, since_ms: i64, limit: usize) -> Result<Vec<Candle>, crate::error::EngineError> {
            let mut matched: Vec<Candle> = self.candles.iter().filter(|c| c.timestamp_ms >= since_ms).cloned().collect();
            matched.truncate(limit);
            if let Some(last) = matched.last() {
                self.cursor_ms.store(last.timestamp_ms, std::sync::atomic::Ordering::SeqCst);
            }
            Ok(matched)
        }
        async fn get_candles_next(&self, _symbol: &str, _interval: Interval, limit: usize) -> Result<Vec<Candle>, crate::error::EngineError> {
            let cursor = self.cursor_ms.load(std::sync::atomic::Ordering::SeqCst);
            let mut matched: Vec<Candle> = self.candles.iter().filter(|c| c.timestamp_ms > cursor).cloned().collect();
            matched.truncate(limit);
            if let Some(last) = matched.last() {
                self.cursor_ms.store(last.timestamp_ms, std::sync::atomic::Ordering::SeqCst);
            }
            Ok(matched)
        }
    }

    fn candle(ts: i64, close: Decimal) -> Candle {
        Candle::new(ts, close, close, close, close, dec!(1))
    }

    #[tokio::test]
    async fn skips_timestamps_while_position_is_open() {
        let mut config = RuntimeConfig::default();
        config.oracle.avg_price_candles_count = 1;
        config.oracle.min_candles_for_median = 1;
        let config = Arc::new(config);

        let candles = vec![
            candle(-60_000, dec!(100)),
            candle(0, dec!(100)),
            candle(60_000, dec!(100.5)),
            candle(120_000, dec!(101.2)),
            candle(180_000, dec!(101.5)),
        ];
        let exchange: Arc<dyn CandleFetcher> = Arc::new(SeriesFetcher::new(candles));
        let strategy: Arc<Mutex<Box<dyn Strategy>>> =
            Arc::new(Mutex::new(Box::new(QueueStrategy { queue: vec![Some(crate::types::ProposedSignal::long(dec!(101), dec!(99), 60))] })));
        let events = Arc::new(EventBus::new());

        let engine = Arc::new(SignalEngine::new(
            "trend",
            "binance",
            "BTCUSDT",
            config,
            exchange.clone(),
            strategy,
            None::<Arc<RiskGate>>,
            None::<Arc<dyn Persistence<State>>>,
            events.clone(),
        ));

        let start = Utc.timestamp_millis_opt(0).unwrap();
        let end = Utc.timestamp_millis_opt(180_000).unwrap();
        let frame = Frame::new("test", Interval::M1, start, end);
        let driver = BacktestDriver::new(engine, exchange, events, frame);

        let evaluated = driver.run().await.unwrap();
        // 4 frame timestamps (0, 60_000, 120_000, 180_000); opening happens
        // at 0 and the fast-forward closes the position at 120_000, so both
        // 60_000 and 120_000 are skipped and only 0 and 180_000 are ticked.
        assert_eq!(evaluated, 2);
    }
}
