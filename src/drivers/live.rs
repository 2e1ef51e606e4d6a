use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use crate::engine::SignalEngine;
use crate::error::EngineResult;
use crate::eventbus::{Event, EventBus};
use crate::types::SignalState;

/// Drives one `SignalEngine` against the wall clock, forever, until asked to
/// stop (§4.8). Shutdown is graceful: a `stop()` request only takes effect
/// once the slot has returned to `idle`, so an open position is never
/// abandoned mid-flight.
pub struct LiveDriver {
    engine: Arc<SignalEngine>,
    events: Arc<EventBus>,
    tick_ttl: Duration,
    stop_requested: AtomicBool,
}

impl LiveDriver {
    pub fn new(engine: Arc<SignalEngine>, events: Arc<EventBus>, tick_ttl_ms: i64) -> Self {
        Self {
            engine,
            events,
            tick_ttl: Duration::from_millis(tick_ttl_ms.max(0) as u64),
            stop_requested: AtomicBool::new(false),
        }
    }

    /// Requests graceful shutdown. The loop keeps ticking until the current
    /// slot reaches `idle`; no new signals are proposed for it in the
    /// meantime.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.engine.stop();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Runs until `request_stop` is called and the slot is idle again.
    /// Never returns `Err` for transient exchange failures — those are
    /// already absorbed by the engine's own retry/error-event path.
    pub async fn run(&self) -> EngineResult<()> {
        loop {
            let now = Utc::now().timestamp_millis();
            let state = self.engine.tick(now).await?;

            if self.stop_requested() && matches!(state, SignalState::Idle) {
                break;
            }

            tokio::time::sleep(self.tick_ttl).await;
        }

        info!(strategy_name = self.engine.strategy_name(), symbol = self.engine.symbol(), "live driver stopped");
        self.events.publish(Event::Done { backtest: false }).await;
        Ok(())
    }
}
