use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::warn;

use crate::pnl::PnlResult;
use crate::types::{CancelReason, CloseReason, SignalRecord};

/// A lifecycle event emitted by a `SignalEngine` (§4.9).
#[derive(Debug, Clone)]
pub enum Event {
    Idle { strategy_name: String, symbol: String },
    Scheduled { record: SignalRecord },
    Opened { record: SignalRecord },
    Active { record: SignalRecord },
    Closed { record: SignalRecord, reason: CloseReason, pnl: PnlResult },
    Cancelled { record: SignalRecord, reason: CancelReason },
    RiskRejection { strategy_name: String, symbol: String, note: String },
    Error { strategy_name: String, symbol: String, message: String },
    Done { backtest: bool },
}

const REPLAY_BUFFER_SIZE: usize = 25;
const CHANNEL_CAPACITY: usize = 256;

type Handler = Arc<dyn Fn(Event) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Fan-out over `tokio::sync::broadcast` with one draining task per
/// subscriber, so each subscriber observes its events strictly in emission
/// order even though `broadcast` itself gives no ordering guarantee across
/// distinct receivers (§4.9). A bounded `VecDeque` of the last 25 events
/// backs replay for subscribers that attach late.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    history: Arc<Mutex<VecDeque<Event>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            history: Arc::new(Mutex::new(VecDeque::with_capacity(REPLAY_BUFFER_SIZE))),
        }
    }

    pub async fn publish(&self, event: Event) {
        {
            let mut history = self.history.lock().await;
            if history.len() == REPLAY_BUFFER_SIZE {
                history.pop_front();
            }
            history.push_back(event.clone());
        }
        // No active receivers is not an error; the event is still retained for replay.
        let _ = self.tx.send(event);
    }

    /// Replays up to the last 25 retained events to `handler`, then spawns a
    /// task that sequentially awaits `handler` for every subsequently
    /// published event until the bus is dropped or the subscriber lags.
    pub async fn subscribe<F, Fut>(&self, handler: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |event| Box::pin(handler(event)));
        let replay: Vec<Event> = self.history.lock().await.iter().cloned().collect();
        let mut rx = self.tx.subscribe();

        tokio::spawn(async move {
            for event in replay {
                (handler)(event).await;
            }
            loop {
                match rx.recv().await {
                    Ok(event) => (handler)(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event bus subscriber lagged, some events were dropped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}
