use serde::{Deserialize, Serialize};

use crate::types::signal::SignalRecord;

/// A position the `RiskGate` tracks across all strategies, keyed globally by
/// `(strategy_name, symbol)` (§3). Added on transition into `opened`, removed
/// on any transition to `closed` or `cancelled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskPosition {
    pub signal: SignalRecord,
    pub strategy_name: String,
    pub exchange_name: String,
    pub opened_at_ms: i64,
}

impl RiskPosition {
    pub fn new(signal: SignalRecord, strategy_name: impl Into<String>, exchange_name: impl Into<String>, opened_at_ms: i64) -> Self {
        Self {
            signal,
            strategy_name: strategy_name.into(),
            exchange_name: exchange_name.into(),
            opened_at_ms,
        }
    }

    pub fn key(&self) -> (String, String) {
        (self.strategy_name.clone(), self.signal.symbol.clone())
    }
}
