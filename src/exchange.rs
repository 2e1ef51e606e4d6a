use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::EngineError;
use crate::types::{Candle, Interval};

/// The abstract candle data source (§6). Modeled the same way the teacher
/// models its `Exchange` trait (`get_ticker`, `get_candles`, ...), narrowed to
/// the read-only subset this engine actually needs — order placement is
/// explicitly out of scope.
#[async_trait]
pub trait CandleFetcher: Send + Sync {
    /// Returns up to `limit` candles at `interval`, starting at `since`
    /// (aligned to the interval), chronologically ordered and non-overlapping.
    async fn get_candles(&self, symbol: &str, interval: Interval, since_ms: i64, limit: usize) -> Result<Vec<Candle>, EngineError>;

    /// Backtest-only look-ahead used by fast-forward: the next `limit`
    /// candles after the caller's current cursor.
    async fn get_candles_next(&self, symbol: &str, interval: Interval, limit: usize) -> Result<Vec<Candle>, EngineError>;

    fn format_price(&self, _symbol: &str, price: Decimal) -> String {
        price.to_string()
    }

    fn format_quantity(&self, _symbol: &str, quantity: Decimal) -> String {
        quantity.to_string()
    }
}
