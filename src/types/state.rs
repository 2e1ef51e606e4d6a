use serde::{Deserialize, Serialize};

use crate::pnl::PnlResult;
use crate::types::signal::SignalRecord;

/// Why a signal closed out of the `active` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
    TimeExpired,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::TakeProfit => write!(f, "take_profit"),
            CloseReason::StopLoss => write!(f, "stop_loss"),
            CloseReason::TimeExpired => write!(f, "time_expired"),
        }
    }
}

/// Why a `scheduled` signal never activated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    /// The stop-loss side was touched before the entry price (§4.6 priority rule).
    StopBeforeActivation,
    /// `now - scheduledAt >= CC_SCHEDULE_AWAIT_MINUTES` elapsed without activation.
    ScheduleTimeout,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::StopBeforeActivation => write!(f, "stop_before_activation"),
            CancelReason::ScheduleTimeout => write!(f, "schedule_timeout"),
        }
    }
}

/// The signal lifecycle state for one `(strategy_name, symbol)` slot (§3, §9).
///
/// A tagged sum with one variant per state — state-specific data (a close
/// reason and PNL, a cancel reason) lives only on the variant that can
/// produce it, rather than as optional fields on a shared struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SignalState {
    Idle,
    Scheduled(SignalRecord),
    /// One-tick transient: emitted only at the moment of entry. The next
    /// tick observes `Active` for the same record.
    Opened(SignalRecord),
    Active(SignalRecord),
    Closed {
        record: SignalRecord,
        pnl: PnlResult,
    },
    Cancelled {
        record: SignalRecord,
        reason: CancelReason,
    },
}

impl SignalState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SignalState::Closed { .. } | SignalState::Cancelled { .. })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SignalState::Idle)
    }

    /// The non-terminal record this state is tracking, if any. Terminal
    /// states still carry their record (for the emitted event) but the slot
    /// is about to revert to `Idle`, so they are excluded here.
    pub fn record(&self) -> Option<&SignalRecord> {
        match self {
            SignalState::Idle => None,
            SignalState::Scheduled(r) | SignalState::Opened(r) | SignalState::Active(r) => Some(r),
            SignalState::Closed { record, .. } | SignalState::Cancelled { record, .. } => Some(record),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SignalState::Idle => "idle",
            SignalState::Scheduled(_) => "scheduled",
            SignalState::Opened(_) => "opened",
            SignalState::Active(_) => "active",
            SignalState::Closed { .. } => "closed",
            SignalState::Cancelled { .. } => "cancelled",
        }
    }
}
