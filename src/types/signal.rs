use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The side of a proposed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    Long,
    Short,
}

impl Position {
    pub fn opposite(&self) -> Self {
        match self {
            Position::Long => Position::Short,
            Position::Short => Position::Long,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Position::Long => write!(f, "long"),
            Position::Short => write!(f, "short"),
        }
    }
}

/// A proposed trade produced by a strategy each tick. Prices absent their
/// `Decimal` wrapper in the wire format are strictly positive finite reals —
/// represented here as `Decimal`, which cannot hold NaN/Infinity in the first
/// place; the validator still rejects a handful of boundary cases (zero,
/// negative) that `Decimal` *can* represent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedSignal {
    pub position: Position,
    /// Absence means "enter at market" — the engine resolves this to the
    /// current reference price when the signal is internalized.
    pub price_open: Option<Decimal>,
    pub price_take_profit: Decimal,
    pub price_stop_loss: Decimal,
    pub minute_estimated_time: i64,
    #[serde(default)]
    pub note: String,
    /// Caller-supplied id; a UUID v4 is generated if absent (§3).
    #[serde(default)]
    pub id: Option<String>,
}

impl ProposedSignal {
    pub fn long(price_take_profit: Decimal, price_stop_loss: Decimal, minute_estimated_time: i64) -> Self {
        Self {
            position: Position::Long,
            price_open: None,
            price_take_profit,
            price_stop_loss,
            minute_estimated_time,
            note: String::new(),
            id: None,
        }
    }

    pub fn short(price_take_profit: Decimal, price_stop_loss: Decimal, minute_estimated_time: i64) -> Self {
        Self {
            position: Position::Short,
            price_open: None,
            price_take_profit,
            price_stop_loss,
            minute_estimated_time,
            note: String::new(),
            id: None,
        }
    }

    pub fn with_price_open(mut self, price_open: Decimal) -> Self {
        self.price_open = Some(price_open);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }
}

/// A validated signal, internalized and owned by exactly one `SignalEngine`
/// instance keyed by `(strategy_name, symbol)` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    pub id: String,
    pub symbol: String,
    pub strategy_name: String,
    pub exchange_name: String,
    pub position: Position,
    /// Resolved at validation time: the proposed `price_open`, or the current
    /// reference price for a market (immediate) entry.
    pub price_open: Decimal,
    pub price_take_profit: Decimal,
    pub price_stop_loss: Decimal,
    /// Pre-trailing copies, kept alongside the (currently identical) working
    /// TP/SL above. No operation in this engine mutates TP/SL after
    /// validation — trailing adjustment, if a host wants it, is layered on
    /// top via the event bus and a fresh signal, not an in-place mutation —
    /// but the schema carries both fields so that extension doesn't require
    /// a migration.
    pub original_price_take_profit: Decimal,
    pub original_price_stop_loss: Decimal,
    pub minute_estimated_time: i64,
    pub note: String,
    /// Millisecond epoch when first emitted (scheduled or opened).
    pub scheduled_at: i64,
    /// Millisecond epoch when the position actually becomes active at
    /// `price_open`. Equal to `scheduled_at` for immediate entries.
    pub pending_at: i64,
}

impl SignalRecord {
    pub fn from_proposed(
        proposed: &ProposedSignal,
        symbol: impl Into<String>,
        strategy_name: impl Into<String>,
        exchange_name: impl Into<String>,
        resolved_price_open: Decimal,
        now_ms: i64,
    ) -> Self {
        Self {
            id: proposed.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
            symbol: symbol.into(),
            strategy_name: strategy_name.into(),
            exchange_name: exchange_name.into(),
            position: proposed.position,
            price_open: resolved_price_open,
            price_take_profit: proposed.price_take_profit,
            price_stop_loss: proposed.price_stop_loss,
            original_price_take_profit: proposed.price_take_profit,
            original_price_stop_loss: proposed.price_stop_loss,
            minute_estimated_time: proposed.minute_estimated_time,
            note: proposed.note.clone(),
            scheduled_at: now_ms,
            pending_at: now_ms,
        }
    }

    /// `true` if this record was an immediate (market) entry, i.e. it had no
    /// waiting period between `scheduled_at` and `pending_at`.
    pub fn is_immediate_entry(&self) -> bool {
        self.scheduled_at == self.pending_at
    }

    pub fn lifetime_deadline_ms(&self) -> i64 {
        self.pending_at + self.minute_estimated_time * 60_000
    }
}
