pub mod predicates;

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::persistence::Persistence;
use crate::types::{ProposedSignal, RiskPosition, SignalRecord};

/// Snapshot handed to every `RiskPredicate` (§4.5). Predicates see the full
/// cross-strategy book, not just their own slot, so portfolio-level limits
/// are expressible.
pub struct RiskCheckContext<'a> {
    pub symbol: &'a str,
    pub proposed: &'a ProposedSignal,
    pub strategy_name: &'a str,
    pub current_price: Decimal,
    pub now_ms: i64,
    pub active_positions: &'a [RiskPosition],
}

impl<'a> RiskCheckContext<'a> {
    pub fn active_position_count(&self) -> usize {
        self.active_positions.len()
    }
}

/// `Fn(&RiskCheckContext) -> Result<(), String>`, boxed so a `RiskGate` can
/// hold an open-ended, user-extensible chain rather than a fixed sequence of
/// hardcoded checks.
pub trait RiskPredicate: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self, ctx: &RiskCheckContext) -> Result<(), String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskDecision {
    Allow,
    Reject,
}

type PositionKey = (String, String);

/// The serialized form of a `RiskGate`'s position book, written as a single
/// entity under `risk/{riskName}/positions` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionsFile {
    pub entries: Vec<(PositionKey, RiskPosition)>,
}

/// Aggregates active `RiskPosition`s across all strategies and runs a chain
/// of `RiskPredicate`s against each proposal. The chain stops at the first
/// failing predicate (§4.5).
pub struct RiskGate {
    name: String,
    predicates: Vec<Box<dyn RiskPredicate>>,
    positions: Mutex<HashMap<PositionKey, RiskPosition>>,
    store: Option<Arc<dyn Persistence<PositionsFile>>>,
}

impl RiskGate {
    pub fn new(name: impl Into<String>, predicates: Vec<Box<dyn RiskPredicate>>) -> Self {
        Self {
            name: name.into(),
            predicates,
            positions: Mutex::new(HashMap::new()),
            store: None,
        }
    }

    pub fn with_persistence(mut self, store: Arc<dyn Persistence<PositionsFile>>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Loads the persisted position set on startup (live-mode recovery).
    pub async fn recover(&self) -> Result<(), EngineError> {
        let Some(store) = &self.store else { return Ok(()) };
        let survivors = store.init().await?;
        let mut positions = self.positions.lock().await;
        for (_, file) in survivors {
            for (key, position) in file.entries {
                positions.insert(key, position);
            }
        }
        Ok(())
    }

    pub async fn check(
        &self,
        proposed: &ProposedSignal,
        symbol: &str,
        strategy_name: &str,
        current_price: Decimal,
        now_ms: i64,
    ) -> RiskDecision {
        let positions = self.positions.lock().await;
        let active: Vec<RiskPosition> = positions.values().cloned().collect();
        drop(positions);

        let ctx = RiskCheckContext {
            symbol,
            proposed,
            strategy_name,
            current_price,
            now_ms,
            active_positions: &active,
        };

        for predicate in &self.predicates {
            if let Err(reason) = predicate.check(&ctx) {
                warn!(predicate = predicate.name(), symbol, strategy_name, reason = %reason, "risk predicate rejected signal");
                return RiskDecision::Reject;
            }
        }
        RiskDecision::Allow
    }

    /// Called on transition into `opened` (§4.5).
    pub async fn add(&self, record: &SignalRecord, strategy_name: &str, exchange_name: &str, opened_at_ms: i64) -> Result<(), EngineError> {
        let key = (strategy_name.to_string(), record.symbol.clone());
        let position = RiskPosition::new(record.clone(), strategy_name, exchange_name, opened_at_ms);
        {
            let mut positions = self.positions.lock().await;
            positions.insert(key, position);
        }
        info!(strategy_name, symbol = %record.symbol, "risk gate registered position");
        self.persist().await
    }

    /// Called on `closed` or `cancelled` (§4.5).
    pub async fn drop_position(&self, strategy_name: &str, symbol: &str) -> Result<(), EngineError> {
        let key = (strategy_name.to_string(), symbol.to_string());
        {
            let mut positions = self.positions.lock().await;
            positions.remove(&key);
        }
        self.persist().await
    }

    async fn persist(&self) -> Result<(), EngineError> {
        let Some(store) = &self.store else { return Ok(()) };
        let positions = self.positions.lock().await;
        let entries: Vec<(PositionKey, RiskPosition)> = positions.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        drop(positions);
        store.write("positions", &PositionsFile { entries }).await
    }
}
