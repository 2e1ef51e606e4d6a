use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single OHLCV candle. Immutable once observed — the engine never mutates candles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    pub fn new(
        timestamp_ms: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            timestamp_ms,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Whether this candle's OHLC values are internally consistent, per §6:
    /// `high >= max(open, close) >= min(open, close) >= low` and `volume >= 0`.
    pub fn is_well_formed(&self) -> bool {
        let hi = self.open.max(self.close);
        let lo = self.open.min(self.close);
        self.high >= hi && hi >= lo && lo >= self.low && self.volume >= Decimal::ZERO
    }

    pub fn typical_price(&self) -> Decimal {
        (self.high + self.low + self.close) / Decimal::from(3)
    }
}

/// A small rolling window of the most recently observed candles for one symbol.
#[derive(Debug, Clone, Default)]
pub struct CandleBuffer {
    candles: Vec<Candle>,
    max_size: usize,
}

impl CandleBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            candles: Vec::with_capacity(max_size),
            max_size,
        }
    }

    pub fn push(&mut self, candle: Candle) {
        if self.candles.len() >= self.max_size {
            self.candles.remove(0);
        }
        self.candles.push(candle);
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// The last `n` candles strictly older than `now`, oldest first.
    pub fn last_n_before(&self, n: usize, now_ms: i64) -> Vec<&Candle> {
        let eligible: Vec<&Candle> = self
            .candles
            .iter()
            .filter(|c| c.timestamp_ms < now_ms)
            .collect();
        let len = eligible.len();
        if n >= len {
            eligible
        } else {
            eligible[len - n..].to_vec()
        }
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(ts: i64, close: Decimal) -> Candle {
        Candle::new(ts, close, close, close, close, dec!(1))
    }

    #[test]
    fn well_formed_rejects_inverted_high_low() {
        let c = Candle::new(0, dec!(10), dec!(9), dec!(11), dec!(10), dec!(1));
        assert!(!c.is_well_formed());
    }

    #[test]
    fn well_formed_rejects_negative_volume() {
        let c = Candle::new(0, dec!(10), dec!(11), dec!(9), dec!(10), dec!(-1));
        assert!(!c.is_well_formed());
    }

    #[test]
    fn buffer_evicts_oldest_past_capacity() {
        let mut buf = CandleBuffer::new(2);
        buf.push(candle(0, dec!(1)));
        buf.push(candle(1, dec!(2)));
        buf.push(candle(2, dec!(3)));
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.as_slice()[0].timestamp_ms, 1);
    }

    #[test]
    fn last_n_before_excludes_current_and_future_candles() {
        let mut buf = CandleBuffer::new(10);
        for i in 0..5 {
            buf.push(candle(i * 60_000, Decimal::from(i + 1)));
        }
        let window = buf.last_n_before(3, 3 * 60_000);
        // candles at t=0,60000,120000 are < 180000; last 3 of those is all of them
        assert_eq!(window.len(), 3);
        assert_eq!(window.last().unwrap().timestamp_ms, 120_000);
    }
}
