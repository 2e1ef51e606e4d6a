use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::config::RuntimeConfig;
use crate::error::EngineError;
use crate::exchange::CandleFetcher;
use crate::types::{Candle, Interval};

/// Result of an oracle lookup. `InsufficientData` is recoverable — the caller
/// (the engine's `tick`) skips the tick rather than treating it as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleOutcome {
    Price(Decimal),
    InsufficientData,
}

/// Produces a volume-weighted reference price from the last `N` one-minute
/// candles strictly older than `now` (§4.1).
pub struct PriceOracle {
    config: Arc<RuntimeConfig>,
}

impl PriceOracle {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self { config }
    }

    pub async fn reference_price(
        &self,
        fetcher: &dyn CandleFetcher,
        symbol: &str,
        now_ms: i64,
    ) -> Result<OracleOutcome, EngineError> {
        let oracle = &self.config.oracle;
        let window_ms = (oracle.avg_price_candles_count as i64) * Interval::M1.to_millis();
        let since_ms = now_ms - window_ms;

        let mut attempt = 0;
        loop {
            let candles = fetcher
                .get_candles(symbol, Interval::M1, since_ms, oracle.avg_price_candles_count)
                .await
                .map_err(|e| EngineError::ExchangeTransient(e.to_string()))?;

            let window: Vec<&Candle> = candles.iter().filter(|c| c.timestamp_ms < now_ms).collect();

            if window.len() < oracle.min_candles_for_median {
                debug!(symbol, available = window.len(), "insufficient candles for oracle");
                return Ok(OracleOutcome::InsufficientData);
            }

            if self.has_anomaly(&window) {
                attempt += 1;
                if attempt > oracle.get_candles_retry_count {
                    return Err(EngineError::ExchangeTransient(format!(
                        "price anomaly persisted across {} retries for {}",
                        oracle.get_candles_retry_count, symbol
                    )));
                }
                warn!(symbol, attempt, "price anomaly detected, retrying oracle fetch");
                tokio::time::sleep(std::time::Duration::from_millis(oracle.get_candles_retry_delay_ms)).await;
                continue;
            }

            return Ok(OracleOutcome::Price(Self::weighted_price(&window)));
        }
    }

    fn has_anomaly(&self, window: &[&Candle]) -> bool {
        let median = Self::median_close(window);
        if median.is_zero() {
            return false;
        }
        let factor = self.config.oracle.price_anomaly_threshold_factor;
        window.iter().any(|c| {
            let ratio = if c.close >= median { c.close / median } else { median / c.close };
            ratio > factor
        })
    }

    fn median_close(window: &[&Candle]) -> Decimal {
        let mut closes: Vec<Decimal> = window.iter().map(|c| c.close).collect();
        closes.sort();
        let len = closes.len();
        if len == 0 {
            return Decimal::ZERO;
        }
        if len % 2 == 1 {
            closes[len / 2]
        } else {
            (closes[len / 2 - 1] + closes[len / 2]) / Decimal::from(2)
        }
    }

    /// Σ(close·volume)/Σ(volume) if total volume > 0, else the arithmetic
    /// mean of closes (§4.1).
    fn weighted_price(window: &[&Candle]) -> Decimal {
        let total_volume: Decimal = window.iter().map(|c| c.volume).sum();
        if total_volume > Decimal::ZERO {
            let weighted_sum: Decimal = window.iter().map(|c| c.close * c.volume).sum();
            weighted_sum / total_volume
        } else {
            let sum: Decimal = window.iter().map(|c| c.close).sum();
            sum / Decimal::from(window.len() as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    struct FixedFetcher {
        candles: Mutex<Vec<Candle>>,
    }

    #[async_trait]
    impl CandleFetcher for FixedFetcher {
        async fn get_candles(&self, _symbol: &str, _interval: Interval, _since_ms: i64, _limit: usize) -> Result<Vec<Candle>, EngineError> {
            Ok(self.candles.lock().unwrap().clone())
        }

        async fn get_candles_next(&self, _symbol: &str, _interval: Interval, _limit: usize) -> Result<Vec<Candle>, EngineError> {
            Ok(Vec::new())
        }
    }

    fn candle(ts: i64, close: Decimal, volume: Decimal) -> Candle {
        Candle::new(ts, close, close, close, close, volume)
    }

    #[tokio::test]
    async fn uses_volume_weighted_price_when_volume_present() {
        let config = Arc::new(RuntimeConfig::default());
        let oracle = PriceOracle::new(config);
        let fetcher = FixedFetcher {
            candles: Mutex::new(vec![
                candle(0, dec!(100), dec!(1)),
                candle(60_000, dec!(200), dec!(3)),
                candle(120_000, dec!(100), dec!(1)),
            ]),
        };
        let outcome = oracle.reference_price(&fetcher, "BTCUSDT", 300_000).await.unwrap();
        // (100*1 + 200*3 + 100*1) / 5 = 140
        assert_eq!(outcome, OracleOutcome::Price(dec!(140)));
    }

    #[tokio::test]
    async fn falls_back_to_mean_when_no_volume() {
        let config = Arc::new(RuntimeConfig::default());
        let oracle = PriceOracle::new(config);
        let fetcher = FixedFetcher {
            candles: Mutex::new(vec![
                candle(0, dec!(100), dec!(0)),
                candle(60_000, dec!(200), dec!(0)),
                candle(120_000, dec!(300), dec!(0)),
            ]),
        };
        let outcome = oracle.reference_price(&fetcher, "BTCUSDT", 300_000).await.unwrap();
        assert_eq!(outcome, OracleOutcome::Price(dec!(200)));
    }

    #[tokio::test]
    async fn reports_insufficient_data_below_min_candles() {
        let config = Arc::new(RuntimeConfig::default());
        let oracle = PriceOracle::new(config);
        let fetcher = FixedFetcher {
            candles: Mutex::new(vec![candle(0, dec!(100), dec!(1))]),
        };
        let outcome = oracle.reference_price(&fetcher, "BTCUSDT", 300_000).await.unwrap();
        assert_eq!(outcome, OracleOutcome::InsufficientData);
    }

    #[tokio::test]
    async fn excludes_candles_not_older_than_now() {
        let config = Arc::new(RuntimeConfig::default());
        let oracle = PriceOracle::new(config);
        let fetcher = FixedFetcher {
            candles: Mutex::new(vec![
                candle(0, dec!(100), dec!(1)),
                candle(60_000, dec!(100), dec!(1)),
                candle(120_000, dec!(9999), dec!(1)), // not older than `now`
            ]),
        };
        let outcome = oracle.reference_price(&fetcher, "BTCUSDT", 120_000).await.unwrap();
        assert_eq!(outcome, OracleOutcome::InsufficientData);
    }

    #[tokio::test]
    async fn anomalous_window_fails_after_exhausting_retries() {
        let mut config = RuntimeConfig::default();
        config.oracle.get_candles_retry_count = 1;
        config.oracle.get_candles_retry_delay_ms = 1;
        config.oracle.price_anomaly_threshold_factor = dec!(2);
        let oracle = PriceOracle::new(Arc::new(config));
        let fetcher = FixedFetcher {
            candles: Mutex::new(vec![
                candle(0, dec!(100), dec!(1)),
                candle(60_000, dec!(100), dec!(1)),
                candle(120_000, dec!(1000), dec!(1)),
            ]),
        };
        let result = oracle.reference_price(&fetcher, "BTCUSDT", 300_000).await;
        assert!(result.is_err());
    }
}
