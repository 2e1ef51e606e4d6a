use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Every `CC_*` key recognized by the core (§6), plus a non-normative
/// `general` section. Constructed once and handed to engines as an
/// `Arc<RuntimeConfig>` snapshot (§9 "No global singletons at the core") so
/// backtests stay reproducible even if a host's live config later changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub validation: ValidationSettings,
    pub scheduling: SchedulingSettings,
    pub pnl: PnlSettings,
    pub oracle: OracleSettings,
    pub general: GeneralSettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            validation: ValidationSettings::default(),
            scheduling: SchedulingSettings::default(),
            pnl: PnlSettings::default(),
            oracle: OracleSettings::default(),
            general: GeneralSettings::default(),
        }
    }
}

impl RuntimeConfig {
    /// Accumulates every violation rather than failing fast, the same shape
    /// as the teacher's `RuntimeConfig::validate`.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let v = &self.validation;

        if v.min_takeprofit_distance_percent <= Decimal::ZERO {
            errors.push("CC_MIN_TAKEPROFIT_DISTANCE_PERCENT must be > 0".to_string());
        }
        if v.min_stoploss_distance_percent <= Decimal::ZERO {
            errors.push("CC_MIN_STOPLOSS_DISTANCE_PERCENT must be > 0".to_string());
        }
        if v.max_stoploss_distance_percent <= v.min_stoploss_distance_percent {
            errors.push("CC_MAX_STOPLOSS_DISTANCE_PERCENT must be > CC_MIN_STOPLOSS_DISTANCE_PERCENT".to_string());
        }
        if v.max_signal_lifetime_minutes <= 0 {
            errors.push("CC_MAX_SIGNAL_LIFETIME_MINUTES must be > 0".to_string());
        }
        if self.scheduling.schedule_await_minutes <= 0 {
            errors.push("CC_SCHEDULE_AWAIT_MINUTES must be > 0".to_string());
        }
        if self.scheduling.max_signal_generation_seconds <= 0 {
            errors.push("CC_MAX_SIGNAL_GENERATION_SECONDS must be > 0".to_string());
        }
        if self.pnl.percent_slippage < Decimal::ZERO {
            errors.push("CC_PERCENT_SLIPPAGE must be >= 0".to_string());
        }
        if self.pnl.percent_fee < Decimal::ZERO {
            errors.push("CC_PERCENT_FEE must be >= 0".to_string());
        }
        if self.oracle.avg_price_candles_count == 0 {
            errors.push("CC_AVG_PRICE_CANDLES_COUNT must be > 0".to_string());
        }
        if self.oracle.min_candles_for_median == 0 {
            errors.push("CC_GET_CANDLES_MIN_CANDLES_FOR_MEDIAN must be > 0".to_string());
        }
        if self.oracle.price_anomaly_threshold_factor <= Decimal::ONE {
            errors.push("CC_GET_CANDLES_PRICE_ANOMALY_THRESHOLD_FACTOR must be > 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSettings {
    pub min_takeprofit_distance_percent: Decimal,
    pub min_stoploss_distance_percent: Decimal,
    pub max_stoploss_distance_percent: Decimal,
    pub max_signal_lifetime_minutes: i64,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            min_takeprofit_distance_percent: dec!(0.5),
            min_stoploss_distance_percent: dec!(0.25),
            max_stoploss_distance_percent: dec!(10),
            max_signal_lifetime_minutes: 1440,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingSettings {
    pub schedule_await_minutes: i64,
    pub max_signal_generation_seconds: i64,
}

impl Default for SchedulingSettings {
    fn default() -> Self {
        Self {
            schedule_await_minutes: 120,
            max_signal_generation_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PnlSettings {
    pub percent_slippage: Decimal,
    pub percent_fee: Decimal,
}

impl Default for PnlSettings {
    fn default() -> Self {
        Self {
            percent_slippage: dec!(0.1),
            percent_fee: dec!(0.1),
        }
    }
}

impl PnlSettings {
    pub fn slippage_fraction(&self) -> Decimal {
        self.percent_slippage / Decimal::from(100)
    }

    pub fn fee_fraction(&self) -> Decimal {
        self.percent_fee / Decimal::from(100)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleSettings {
    pub avg_price_candles_count: usize,
    pub get_candles_retry_count: u32,
    pub get_candles_retry_delay_ms: u64,
    pub price_anomaly_threshold_factor: Decimal,
    pub min_candles_for_median: usize,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            avg_price_candles_count: 5,
            get_candles_retry_count: 3,
            get_candles_retry_delay_ms: 250,
            price_anomaly_threshold_factor: dec!(3.0),
            min_candles_for_median: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    pub persistence_root: String,
    pub tick_ttl_ms: i64,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            persistence_root: "./logs/data".to_string(),
            tick_ttl_ms: 60_000,
        }
    }
}
