use rust_decimal::Decimal;

use super::{RiskCheckContext, RiskPredicate};

/// Caps the number of concurrent active positions across all strategies —
/// the teacher's `RiskManager` hardcodes this as `max_open_positions`.
pub struct MaxConcurrentPositions {
    pub max: usize,
}

impl RiskPredicate for MaxConcurrentPositions {
    fn name(&self) -> &str {
        "max_concurrent_positions"
    }

    fn check(&self, ctx: &RiskCheckContext) -> Result<(), String> {
        if ctx.active_position_count() >= self.max {
            Err(format!("already at max concurrent positions ({})", self.max))
        } else {
            Ok(())
        }
    }
}

/// Rejects a proposal for a symbol that already has an active position,
/// regardless of which strategy owns it — the teacher's per-symbol
/// exclusivity check.
pub struct SymbolExclusivity;

impl RiskPredicate for SymbolExclusivity {
    fn name(&self) -> &str {
        "symbol_exclusivity"
    }

    fn check(&self, ctx: &RiskCheckContext) -> Result<(), String> {
        if ctx.active_positions.iter().any(|p| p.signal.symbol == ctx.symbol) {
            Err(format!("{} already has an active position", ctx.symbol))
        } else {
            Ok(())
        }
    }
}

/// Rejects a proposal once the realized loss for the day exceeds a cap.
/// `realized_loss_today` is supplied by the host (the core does not track
/// account balance, §1 Non-goals) — this predicate only enforces the bound
/// once told what today's realized PNL is.
pub struct MaxDailyLoss {
    pub max_loss_pct: Decimal,
    pub realized_loss_today_pct: Decimal,
}

impl RiskPredicate for MaxDailyLoss {
    fn name(&self) -> &str {
        "max_daily_loss"
    }

    fn check(&self, _ctx: &RiskCheckContext) -> Result<(), String> {
        if self.realized_loss_today_pct >= self.max_loss_pct {
            Err(format!(
                "daily loss {}% has reached the cap of {}%",
                self.realized_loss_today_pct, self.max_loss_pct
            ))
        } else {
            Ok(())
        }
    }
}

/// Rejects a proposal whose strategy already owns an active position on any
/// symbol — prevents a single strategy from running more than one signal at
/// once even when `SymbolExclusivity` would otherwise allow it.
pub struct StrategyExclusivity;

impl RiskPredicate for StrategyExclusivity {
    fn name(&self) -> &str {
        "strategy_exclusivity"
    }

    fn check(&self, ctx: &RiskCheckContext) -> Result<(), String> {
        if ctx.active_positions.iter().any(|p| p.strategy_name == ctx.strategy_name) {
            Err(format!("strategy {} already has an active position", ctx.strategy_name))
        } else {
            Ok(())
        }
    }
}

/// Rejects a proposal whose reward/risk ratio — `|TP-open|/|SL-open|` —
/// falls below a floor, mirroring the teacher's `min_risk_reward_ratio`
/// check in `RiskManager::can_open_position`.
pub struct MinRewardRiskRatio {
    pub min_ratio: Decimal,
}

impl RiskPredicate for MinRewardRiskRatio {
    fn name(&self) -> &str {
        "min_reward_risk_ratio"
    }

    fn check(&self, ctx: &RiskCheckContext) -> Result<(), String> {
        let open = ctx.proposed.price_open.unwrap_or(ctx.current_price);
        let reward = (ctx.proposed.price_take_profit - open).abs();
        let risk = (ctx.proposed.price_stop_loss - open).abs();
        if risk.is_zero() {
            return Err("stop-loss distance is zero".to_string());
        }
        let ratio = reward / risk;
        if ratio < self.min_ratio {
            Err(format!("reward/risk ratio {} is below the floor of {}", ratio, self.min_ratio))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Position, ProposedSignal, RiskPosition, SignalRecord};
    use rust_decimal_macros::dec;

    fn proposal() -> ProposedSignal {
        ProposedSignal::long(dec!(102), dec!(99), 60)
    }

    fn active_position(symbol: &str, strategy: &str) -> RiskPosition {
        let proposed = ProposedSignal::long(dec!(101), dec!(99), 60);
        let record = SignalRecord::from_proposed(&proposed, symbol, strategy, "binance", dec!(100), 0);
        RiskPosition::new(record, strategy, "binance", 0)
    }

    #[test]
    fn max_concurrent_positions_rejects_at_cap() {
        let positions = vec![active_position("ETHUSDT", "trend")];
        let ctx = RiskCheckContext {
            symbol: "BTCUSDT",
            proposed: &proposal(),
            strategy_name: "trend",
            current_price: dec!(100),
            now_ms: 0,
            active_positions: &positions,
        };
        let predicate = MaxConcurrentPositions { max: 1 };
        assert!(predicate.check(&ctx).is_err());
    }

    #[test]
    fn symbol_exclusivity_rejects_duplicate_symbol() {
        let positions = vec![active_position("BTCUSDT", "mean_reversion")];
        let ctx = RiskCheckContext {
            symbol: "BTCUSDT",
            proposed: &proposal(),
            strategy_name: "trend",
            current_price: dec!(100),
            now_ms: 0,
            active_positions: &positions,
        };
        let predicate = SymbolExclusivity;
        assert!(predicate.check(&ctx).is_err());
    }

    #[test]
    fn min_reward_risk_ratio_rejects_below_floor() {
        let positions = Vec::new();
        let proposed = ProposedSignal::long(dec!(100.6), dec!(99), 60);
        let ctx = RiskCheckContext {
            symbol: "BTCUSDT",
            proposed: &proposed,
            strategy_name: "trend",
            current_price: dec!(100),
            now_ms: 0,
            active_positions: &positions,
        };
        let predicate = MinRewardRiskRatio { min_ratio: dec!(1.0) };
        assert!(predicate.check(&ctx).is_err());
    }

    #[test]
    fn min_reward_risk_ratio_allows_above_floor() {
        let positions = Vec::new();
        let proposed = ProposedSignal::long(dec!(103), dec!(99), 60);
        let ctx = RiskCheckContext {
            symbol: "BTCUSDT",
            proposed: &proposed,
            strategy_name: "trend",
            current_price: dec!(100),
            now_ms: 0,
            active_positions: &positions,
        };
        let predicate = MinRewardRiskRatio { min_ratio: dec!(0.5) };
        assert!(predicate.check(&ctx).is_ok());
    }
}
