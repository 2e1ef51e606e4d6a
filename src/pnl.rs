use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::state::CloseReason;
use crate::types::signal::Position;

/// The outcome of closing a signal, attached to the `closed` event (§4.3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PnlResult {
    pub entry_adj: Decimal,
    pub exit_adj: Decimal,
    pub price_open: Decimal,
    pub price_close: Decimal,
    pub pnl_pct: Decimal,
    pub reason: CloseReason,
}

/// Computes realized PNL with fees and slippage applied, per §4.3.
#[derive(Debug, Clone, Copy)]
pub struct PnlCalculator {
    /// `CC_PERCENT_SLIPPAGE / 100`.
    pub slippage: Decimal,
    /// `CC_PERCENT_FEE / 100`.
    pub fee: Decimal,
}

impl PnlCalculator {
    pub fn new(slippage: Decimal, fee: Decimal) -> Self {
        Self { slippage, fee }
    }

    pub fn close(
        &self,
        position: Position,
        price_open: Decimal,
        price_close: Decimal,
        reason: CloseReason,
    ) -> PnlResult {
        let one = Decimal::ONE;
        let (entry_adj, exit_adj) = match position {
            Position::Long => (
                price_open * (one + self.slippage) * (one + self.fee),
                price_close * (one - self.slippage) * (one - self.fee),
            ),
            Position::Short => (
                price_open * (one - self.slippage) * (one - self.fee),
                price_close * (one + self.slippage) * (one + self.fee),
            ),
        };

        let pnl_pct = match position {
            Position::Long => (exit_adj - entry_adj) / entry_adj * Decimal::from(100),
            Position::Short => (entry_adj - exit_adj) / entry_adj * Decimal::from(100),
        };

        PnlResult {
            entry_adj,
            exit_adj,
            price_open,
            price_close,
            pnl_pct,
            reason,
        }
    }

    /// The `pnl_pct` an exact-round-trip close (closing at `price_open`) would
    /// yield for the given side — the identity of §8.5. `entry_adj` and
    /// `exit_adj` swap which side of the spread they sit on between Long and
    /// Short (see `close` above), so the closed form's denominator does too:
    /// `((1-s)(1-f))/((1+s)(1+f)) - 1` for Long, `((1-s)(1-f)-(1+s)(1+f))/((1-s)(1-f))`
    /// for Short. Used by tests to assert round-trip neutrality exactly
    /// rather than approximately.
    pub fn round_trip_neutral_pct(&self, position: Position) -> Decimal {
        let one = Decimal::ONE;
        let discount = (one - self.slippage) * (one - self.fee);
        let premium = (one + self.slippage) * (one + self.fee);
        let ratio = match position {
            Position::Long => discount / premium - one,
            Position::Short => (discount - premium) / discount,
        };
        ratio * Decimal::from(100)
    }
}
