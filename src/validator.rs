use std::sync::Arc;

use rust_decimal::Decimal;

use crate::config::RuntimeConfig;
use crate::types::{Position, ProposedSignal, SignalRecord};

/// Outcome of validating a proposed signal against a reference price.
#[derive(Debug)]
pub enum ValidationOutcome {
    Valid(SignalRecord),
    Rejected(String),
}

/// Stateless check of a proposed signal against the structural and economic
/// rules of §3. Carries only an immutable config snapshot, matching the
/// "each call closes over its own snapshot" requirement so two concurrent
/// validations against different snapshots never interleave inconsistently.
pub struct SignalValidator {
    config: Arc<RuntimeConfig>,
}

impl SignalValidator {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self { config }
    }

    pub fn validate(
        &self,
        proposed: &ProposedSignal,
        symbol: &str,
        strategy_name: &str,
        exchange_name: &str,
        current_price: Decimal,
        now_ms: i64,
    ) -> ValidationOutcome {
        if let Err(reason) = self.check(proposed, current_price) {
            return ValidationOutcome::Rejected(reason);
        }

        let price_open = proposed.price_open.unwrap_or(current_price);
        let record = SignalRecord::from_proposed(proposed, symbol, strategy_name, exchange_name, price_open, now_ms);
        ValidationOutcome::Valid(record)
    }

    fn check(&self, proposed: &ProposedSignal, current_price: Decimal) -> Result<(), String> {
        let v = &self.config.validation;

        let price_open = proposed.price_open.unwrap_or(current_price);
        let tp = proposed.price_take_profit;
        let sl = proposed.price_stop_loss;

        for (name, price) in [("priceOpen", price_open), ("priceTakeProfit", tp), ("priceStopLoss", sl)] {
            if price <= Decimal::ZERO {
                return Err(format!("{} must be finite and positive, got {}", name, price));
            }
        }

        match proposed.position {
            Position::Long => {
                if !(sl < price_open && price_open < tp) {
                    return Err(format!(
                        "long signal requires priceStopLoss < priceOpen < priceTakeProfit, got {} < {} < {}",
                        sl, price_open, tp
                    ));
                }
            }
            Position::Short => {
                if !(tp < price_open && price_open < sl) {
                    return Err(format!(
                        "short signal requires priceTakeProfit < priceOpen < priceStopLoss, got {} < {} < {}",
                        tp, price_open, sl
                    ));
                }
            }
        }

        let tp_distance = ((tp - price_open) / price_open).abs() * Decimal::from(100);
        if tp_distance < v.min_takeprofit_distance_percent {
            return Err(format!(
                "priceTakeProfit distance {}% is below CC_MIN_TAKEPROFIT_DISTANCE_PERCENT {}%",
                tp_distance, v.min_takeprofit_distance_percent
            ));
        }

        let sl_distance = ((sl - price_open) / price_open).abs() * Decimal::from(100);
        if sl_distance < v.min_stoploss_distance_percent || sl_distance > v.max_stoploss_distance_percent {
            return Err(format!(
                "priceStopLoss distance {}% is outside [{}%, {}%]",
                sl_distance, v.min_stoploss_distance_percent, v.max_stoploss_distance_percent
            ));
        }

        if proposed.minute_estimated_time <= 0 || proposed.minute_estimated_time > v.max_signal_lifetime_minutes {
            return Err(format!(
                "minuteEstimatedTime {} must be in (0, {}]",
                proposed.minute_estimated_time, v.max_signal_lifetime_minutes
            ));
        }

        // Immediate entry: the current price must strictly lie between SL and TP
        // in the direction of the position, or the signal would close on entry.
        if proposed.price_open.is_none() || proposed.price_open == Some(current_price) {
            let would_close = match proposed.position {
                Position::Long => current_price <= sl || current_price >= tp,
                Position::Short => current_price >= sl || current_price <= tp,
            };
            if would_close {
                return Err("immediate entry would close on entry".to_string());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn validator() -> SignalValidator {
        SignalValidator::new(Arc::new(RuntimeConfig::default()))
    }

    #[test]
    fn accepts_well_formed_immediate_long() {
        let proposed = ProposedSignal::long(dec!(101), dec!(99), 60);
        let outcome = validator().validate(&proposed, "BTCUSDT", "trend", "binance", dec!(100), 0);
        assert!(matches!(outcome, ValidationOutcome::Valid(_)));
    }

    #[test]
    fn rejects_inverted_long_ordering() {
        let proposed = ProposedSignal::long(dec!(99), dec!(101), 60);
        let outcome = validator().validate(&proposed, "BTCUSDT", "trend", "binance", dec!(100), 0);
        assert!(matches!(outcome, ValidationOutcome::Rejected(_)));
    }

    #[test]
    fn rejects_tp_distance_below_minimum() {
        let proposed = ProposedSignal::long(dec!(100.1), dec!(99), 60);
        let outcome = validator().validate(&proposed, "BTCUSDT", "trend", "binance", dec!(100), 0);
        match outcome {
            ValidationOutcome::Rejected(reason) => assert!(reason.contains("priceTakeProfit")),
            _ => panic!("expected rejection"),
        }
    }

    #[test]
    fn rejects_stoploss_distance_above_maximum() {
        let proposed = ProposedSignal::long(dec!(110), dec!(85), 60);
        let outcome = validator().validate(&proposed, "BTCUSDT", "trend", "binance", dec!(100), 0);
        match outcome {
            ValidationOutcome::Rejected(reason) => assert!(reason.contains("priceStopLoss")),
            _ => panic!("expected rejection"),
        }
    }

    #[test]
    fn rejects_lifetime_beyond_bound() {
        let proposed = ProposedSignal::long(dec!(101), dec!(99), 100_000);
        let outcome = validator().validate(&proposed, "BTCUSDT", "trend", "binance", dec!(100), 0);
        match outcome {
            ValidationOutcome::Rejected(reason) => assert!(reason.contains("minuteEstimatedTime")),
            _ => panic!("expected rejection"),
        }
    }

    #[test]
    fn rejects_immediate_entry_that_would_close_on_entry() {
        let proposed = ProposedSignal::long(dec!(101), dec!(99), 60);
        let outcome = validator().validate(&proposed, "BTCUSDT", "trend", "binance", dec!(99.5), 0);
        match outcome {
            ValidationOutcome::Rejected(reason) => assert!(reason.contains("would close on entry")),
            _ => panic!("expected rejection"),
        }
    }

    #[test]
    fn accepts_scheduled_entry_even_if_current_price_outside_band() {
        let proposed = ProposedSignal::long(dec!(101), dec!(99), 60).with_price_open(dec!(100));
        let outcome = validator().validate(&proposed, "BTCUSDT", "trend", "binance", dec!(99.5), 0);
        assert!(matches!(outcome, ValidationOutcome::Valid(_)));
    }

    #[test]
    fn short_signal_ordering_and_distances() {
        let proposed = ProposedSignal::short(dec!(99), dec!(101), 60);
        let outcome = validator().validate(&proposed, "BTCUSDT", "trend", "binance", dec!(100), 0);
        assert!(matches!(outcome, ValidationOutcome::Valid(_)));
    }
}
