use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Candle interval. Matches the set enumerated in §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H6,
    H8,
    H12,
    D1,
    D3,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::M1 => "1m",
            Interval::M3 => "3m",
            Interval::M5 => "5m",
            Interval::M15 => "15m",
            Interval::M30 => "30m",
            Interval::H1 => "1h",
            Interval::H2 => "2h",
            Interval::H4 => "4h",
            Interval::H6 => "6h",
            Interval::H8 => "8h",
            Interval::H12 => "12h",
            Interval::D1 => "1d",
            Interval::D3 => "3d",
        }
    }

    pub fn to_minutes(&self) -> i64 {
        match self {
            Interval::M1 => 1,
            Interval::M3 => 3,
            Interval::M5 => 5,
            Interval::M15 => 15,
            Interval::M30 => 30,
            Interval::H1 => 60,
            Interval::H2 => 120,
            Interval::H4 => 240,
            Interval::H6 => 360,
            Interval::H8 => 480,
            Interval::H12 => 720,
            Interval::D1 => 1440,
            Interval::D3 => 4320,
        }
    }

    pub fn to_millis(&self) -> i64 {
        self.to_minutes() * 60_000
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A backtest's ordered, finite timestamp sequence bounded by start/end and an interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub name: String,
    pub interval: Interval,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl Frame {
    pub fn new(name: impl Into<String>, interval: Interval, start_date: DateTime<Utc>, end_date: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            interval,
            start_date,
            end_date,
        }
    }

    /// Materializes `startDate, startDate+interval, ..., <= endDate`.
    pub fn timestamps(&self) -> Vec<i64> {
        let step_ms = self.interval.to_millis();
        let start = self.start_date.timestamp_millis();
        let end = self.end_date.timestamp_millis();
        if step_ms <= 0 || start > end {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut t = start;
        while t <= end {
            out.push(t);
            t += step_ms;
        }
        out
    }
}
