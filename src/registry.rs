use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};

use crate::config::RuntimeConfig;
use crate::drivers::{BacktestDriver, LiveDriver};
use crate::engine::SignalEngine;
use crate::eventbus::EventBus;
use crate::exchange::CandleFetcher;
use crate::persistence::Persistence;
use crate::risk::RiskGate;
use crate::strategy::Strategy;
use crate::types::{Frame, SignalState};

/// Position-size calculator a `Strategy` may name via `sizing_name` (§4.10).
/// The core does not prescribe the algorithm.
pub trait Sizing: Send + Sync {
    fn size(&self, symbol: &str, price: Decimal) -> Decimal;
}

/// Default sizing: a fixed quantity of `Decimal::ONE`, purely so the demo
/// CLI and tests have something runnable.
pub struct FixedSizing;

impl Sizing for FixedSizing {
    fn size(&self, _symbol: &str, _price: Decimal) -> Decimal {
        Decimal::ONE
    }
}

/// Name-keyed lookup of user-registered strategies, exchanges, frames,
/// risks, and sizings (§4.10). Registration is by unique name; duplicate
/// names are rejected. Engine and driver *instances* built from those
/// collaborators are memoized per name too: the first call to `engine`,
/// `backtest_driver`, or `live_driver` for a given name constructs it, every
/// subsequent call returns the same `Arc`.
pub struct Registry {
    strategies: RwLock<HashMap<String, Arc<Mutex<Box<dyn Strategy>>>>>,
    exchanges: RwLock<HashMap<String, Arc<dyn CandleFetcher>>>,
    frames: RwLock<HashMap<String, Frame>>,
    risks: RwLock<HashMap<String, Arc<RiskGate>>>,
    sizings: RwLock<HashMap<String, Arc<dyn Sizing>>>,
    engines: RwLock<HashMap<String, Arc<SignalEngine>>>,
    backtest_drivers: RwLock<HashMap<String, Arc<BacktestDriver>>>,
    live_drivers: RwLock<HashMap<String, Arc<LiveDriver>>>,
}

impl Default for Registry {
    fn default() -> Self {
        let mut sizings: HashMap<String, Arc<dyn Sizing>> = HashMap::new();
        sizings.insert("default".to_string(), Arc::new(FixedSizing));
        Self {
            strategies: RwLock::new(HashMap::new()),
            exchanges: RwLock::new(HashMap::new()),
            frames: RwLock::new(HashMap::new()),
            risks: RwLock::new(HashMap::new()),
            sizings: RwLock::new(sizings),
            engines: RwLock::new(HashMap::new()),
            backtest_drivers: RwLock::new(HashMap::new()),
            live_drivers: RwLock::new(HashMap::new()),
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_strategy(&self, name: impl Into<String>, strategy: Arc<Mutex<Box<dyn Strategy>>>) -> Result<(), String> {
        let name = name.into();
        let mut strategies = self.strategies.write().await;
        if strategies.contains_key(&name) {
            return Err(format!("strategy '{}' is already registered", name));
        }
        strategies.insert(name, strategy);
        Ok(())
    }

    pub async fn strategy(&self, name: &str) -> Option<Arc<Mutex<Box<dyn Strategy>>>> {
        self.strategies.read().await.get(name).cloned()
    }

    pub async fn register_exchange(&self, name: impl Into<String>, exchange: Arc<dyn CandleFetcher>) -> Result<(), String> {
        let name = name.into();
        let mut exchanges = self.exchanges.write().await;
        if exchanges.contains_key(&name) {
            return Err(format!("exchange '{}' is already registered", name));
        }
        exchanges.insert(name, exchange);
        Ok(())
    }

    pub async fn exchange(&self, name: &str) -> Option<Arc<dyn CandleFetcher>> {
        self.exchanges.read().await.get(name).cloned()
    }

    pub async fn register_frame(&self, name: impl Into<String>, frame: Frame) -> Result<(), String> {
        let name = name.into();
        let mut frames = self.frames.write().await;
        if frames.contains_key(&name) {
            return Err(format!("frame '{}' is already registered", name));
        }
        frames.insert(name, frame);
        Ok(())
    }

    pub async fn frame(&self, name: &str) -> Option<Frame> {
        self.frames.read().await.get(name).cloned()
    }

    pub async fn register_risk(&self, name: impl Into<String>, risk: Arc<RiskGate>) -> Result<(), String> {
        let name = name.into();
        let mut risks = self.risks.write().await;
        if risks.contains_key(&name) {
            return Err(format!("risk '{}' is already registered", name));
        }
        risks.insert(name, risk);
        Ok(())
    }

    pub async fn risk(&self, name: &str) -> Option<Arc<RiskGate>> {
        self.risks.read().await.get(name).cloned()
    }

    pub async fn register_sizing(&self, name: impl Into<String>, sizing: Arc<dyn Sizing>) -> Result<(), String> {
        let name = name.into();
        let mut sizings = self.sizings.write().await;
        if sizings.contains_key(&name) {
            return Err(format!("sizing '{}' is already registered", name));
        }
        sizings.insert(name, sizing);
        Ok(())
    }

    pub async fn sizing(&self, name: &str) -> Option<Arc<dyn Sizing>> {
        self.sizings.read().await.get(name).cloned()
    }

    /// Builds (or returns the cached) `SignalEngine` keyed by `name`,
    /// resolving its strategy and exchange collaborators by their own
    /// registered names and its risk gate by `risk_name` if given.
    #[allow(clippy::too_many_arguments)]
    pub async fn engine(
        &self,
        name: &str,
        strategy_name: &str,
        exchange_name: &str,
        risk_name: Option<&str>,
        symbol: &str,
        config: Arc<RuntimeConfig>,
        store: Option<Arc<dyn Persistence<SignalState>>>,
        events: Arc<EventBus>,
    ) -> Result<Arc<SignalEngine>, String> {
        if let Some(engine) = self.engines.read().await.get(name) {
            return Ok(engine.clone());
        }

        let strategy = self.strategy(strategy_name).await.ok_or_else(|| format!("strategy '{}' is not registered", strategy_name))?;
        let exchange = self.exchange(exchange_name).await.ok_or_else(|| format!("exchange '{}' is not registered", exchange_name))?;
        let risk_gate = match risk_name {
            Some(risk_name) => Some(self.risk(risk_name).await.ok_or_else(|| format!("risk '{}' is not registered", risk_name))?),
            None => None,
        };

        let mut engines = self.engines.write().await;
        if let Some(engine) = engines.get(name) {
            return Ok(engine.clone());
        }
        let engine = Arc::new(SignalEngine::new(strategy_name, exchange_name, symbol, config, exchange, strategy, risk_gate, store, events));
        engines.insert(name.to_string(), engine.clone());
        Ok(engine)
    }

    /// Builds (or returns the cached) `BacktestDriver` keyed by `name`,
    /// driving the `engine` already cached under `engine_name` across the
    /// frame registered under `frame_name`.
    pub async fn backtest_driver(&self, name: &str, engine_name: &str, exchange_name: &str, frame_name: &str, events: Arc<EventBus>) -> Result<Arc<BacktestDriver>, String> {
        if let Some(driver) = self.backtest_drivers.read().await.get(name) {
            return Ok(driver.clone());
        }

        let engine = self.engines.read().await.get(engine_name).cloned().ok_or_else(|| format!("engine '{}' is not registered", engine_name))?;
        let exchange = self.exchange(exchange_name).await.ok_or_else(|| format!("exchange '{}' is not registered", exchange_name))?;
        let frame = self.frame(frame_name).await.ok_or_else(|| format!("frame '{}' is not registered", frame_name))?;

        let mut drivers = self.backtest_drivers.write().await;
        if let Some(driver) = drivers.get(name) {
            return Ok(driver.clone());
        }
        let driver = Arc::new(BacktestDriver::new(engine, exchange, events, frame));
        drivers.insert(name.to_string(), driver.clone());
        Ok(driver)
    }

    /// Builds (or returns the cached) `LiveDriver` keyed by `name`, driving
    /// the `engine` already cached under `engine_name`.
    pub async fn live_driver(&self, name: &str, engine_name: &str, tick_ttl_ms: i64, events: Arc<EventBus>) -> Result<Arc<LiveDriver>, String> {
        if let Some(driver) = self.live_drivers.read().await.get(name) {
            return Ok(driver.clone());
        }

        let engine = self.engines.read().await.get(engine_name).cloned().ok_or_else(|| format!("engine '{}' is not registered", engine_name))?;

        let mut drivers = self.live_drivers.write().await;
        if let Some(driver) = drivers.get(name) {
            return Ok(driver.clone());
        }
        let driver = Arc::new(LiveDriver::new(engine, events, tick_ttl_ms));
        drivers.insert(name.to_string(), driver.clone());
        Ok(driver)
    }
}
