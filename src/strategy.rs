use async_trait::async_trait;

use crate::types::ProposedSignal;

/// The user-supplied signal-generation collaborator (§6). `get_signal` takes
/// `&mut self` — matching the teacher's own `Strategy::analyze(&mut self, ...)`
/// — because strategies typically carry rolling indicator state (EMAs, RSI,
/// ...) that must be fed or updated between calls.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Minimum spacing between `get_signal` invocations for a given slot —
    /// the throttle interval of §4.6 step 2.
    fn interval_ms(&self) -> i64;

    /// Produces a proposal, or `None` if the strategy has nothing to say this
    /// tick.
    async fn get_signal(&mut self, symbol: &str) -> Option<ProposedSignal>;

    /// Names a `RiskGate` registered under this name, if the strategy wants
    /// portfolio-level vetoes applied to its signals.
    fn risk_name(&self) -> Option<&str> {
        None
    }

    /// Names a sizing schema registered in the `Registry` (§4.10). The core
    /// does not prescribe a sizing algorithm; this is purely a lookup key a
    /// host may use.
    fn sizing_name(&self) -> Option<&str> {
        None
    }
}
