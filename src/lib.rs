//! Deterministic signal-lifecycle execution engine. One `SignalEngine`
//! drives a single (strategy, symbol) slot through `idle -> scheduled/opened
//! -> active -> closed/cancelled -> idle` for both backtest and live modes,
//! with no internal timers or wall-clock reads — callers supply `now`.

pub mod config;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod eventbus;
pub mod exchange;
pub mod oracle;
pub mod persistence;
pub mod pnl;
pub mod registry;
pub mod risk;
pub mod strategy;
pub mod types;
pub mod validator;

pub use drivers::{BacktestDriver, LiveDriver};
pub use engine::SignalEngine;
pub use error::{EngineError, EngineResult};
pub use eventbus::{Event, EventBus};
pub use oracle::{OracleOutcome, PriceOracle};
pub use registry::Registry;
pub use risk::{RiskDecision, RiskGate};
pub use validator::{SignalValidator, ValidationOutcome};
