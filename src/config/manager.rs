use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::info;

use super::runtime::RuntimeConfig;

/// Loads a `RuntimeConfig` from an optional TOML file (via the `config`
/// crate) layered under the `CC_*` environment variables from §6 (loaded via
/// `dotenvy` first, so a `.env` file works the same as exported shell vars).
///
/// Environment overrides are applied after the file layer so that `CC_*` vars
/// always win — matching the usual 12-factor precedence the teacher's
/// declared-but-unused `config`/`dotenvy` dependencies were clearly staged for.
pub fn load(config_path: Option<&str>) -> Result<RuntimeConfig> {
    dotenvy::dotenv().ok();

    let mut builder = config::Config::builder().add_source(config::Config::try_from(&RuntimeConfig::default())?);
    if let Some(path) = config_path {
        if Path::new(path).exists() {
            info!("loading base config from {}", path);
            builder = builder.add_source(config::File::with_name(path));
        }
    }
    let loaded: RuntimeConfig = builder.build()?.try_deserialize()?;
    Ok(apply_cc_env_overrides(loaded))
}

fn env_decimal(key: &str, current: &mut Decimal) {
    if let Ok(value) = std::env::var(key) {
        if let Ok(parsed) = Decimal::from_str(value.trim()) {
            *current = parsed;
        }
    }
}

fn env_i64(key: &str, current: &mut i64) {
    if let Ok(value) = std::env::var(key) {
        if let Ok(parsed) = value.trim().parse() {
            *current = parsed;
        }
    }
}

fn env_u64(key: &str, current: &mut u64) {
    if let Ok(value) = std::env::var(key) {
        if let Ok(parsed) = value.trim().parse() {
            *current = parsed;
        }
    }
}

fn env_u32(key: &str, current: &mut u32) {
    if let Ok(value) = std::env::var(key) {
        if let Ok(parsed) = value.trim().parse() {
            *current = parsed;
        }
    }
}

fn env_usize(key: &str, current: &mut usize) {
    if let Ok(value) = std::env::var(key) {
        if let Ok(parsed) = value.trim().parse() {
            *current = parsed;
        }
    }
}

fn apply_cc_env_overrides(mut config: RuntimeConfig) -> RuntimeConfig {
    env_decimal("CC_MIN_TAKEPROFIT_DISTANCE_PERCENT", &mut config.validation.min_takeprofit_distance_percent);
    env_decimal("CC_MIN_STOPLOSS_DISTANCE_PERCENT", &mut config.validation.min_stoploss_distance_percent);
    env_decimal("CC_MAX_STOPLOSS_DISTANCE_PERCENT", &mut config.validation.max_stoploss_distance_percent);
    env_i64("CC_MAX_SIGNAL_LIFETIME_MINUTES", &mut config.validation.max_signal_lifetime_minutes);

    env_i64("CC_SCHEDULE_AWAIT_MINUTES", &mut config.scheduling.schedule_await_minutes);
    env_i64("CC_MAX_SIGNAL_GENERATION_SECONDS", &mut config.scheduling.max_signal_generation_seconds);

    env_decimal("CC_PERCENT_SLIPPAGE", &mut config.pnl.percent_slippage);
    env_decimal("CC_PERCENT_FEE", &mut config.pnl.percent_fee);

    env_usize("CC_AVG_PRICE_CANDLES_COUNT", &mut config.oracle.avg_price_candles_count);
    env_u32("CC_GET_CANDLES_RETRY_COUNT", &mut config.oracle.get_candles_retry_count);
    env_u64("CC_GET_CANDLES_RETRY_DELAY_MS", &mut config.oracle.get_candles_retry_delay_ms);
    env_decimal("CC_GET_CANDLES_PRICE_ANOMALY_THRESHOLD_FACTOR", &mut config.oracle.price_anomaly_threshold_factor);
    env_usize("CC_GET_CANDLES_MIN_CANDLES_FOR_MEDIAN", &mut config.oracle.min_candles_for_median);

    config
}

#[derive(Debug, Clone, Serialize)]
pub enum ConfigChangeEvent {
    Updated,
}

/// Holds the live, hot-reloadable `RuntimeConfig` behind an `Arc<RwLock<_>>`
/// with a broadcast change channel, the same shape as the teacher's
/// `RuntimeConfigManager`. Engines are constructed with an immutable
/// `Arc<RuntimeConfig>` *snapshot* taken from this manager — they do not hold
/// the manager itself, so an in-flight backtest never observes a live config
/// change mid-run (§9 "No global singletons at the core").
pub struct RuntimeConfigManager {
    config: Arc<RwLock<RuntimeConfig>>,
    change_tx: broadcast::Sender<ConfigChangeEvent>,
}

impl RuntimeConfigManager {
    pub fn new(initial: RuntimeConfig) -> Self {
        let (change_tx, _) = broadcast::channel(32);
        Self {
            config: Arc::new(RwLock::new(initial)),
            change_tx,
        }
    }

    pub async fn snapshot(&self) -> Arc<RuntimeConfig> {
        Arc::new(self.config.read().await.clone())
    }

    pub async fn update(&self, new_config: RuntimeConfig) -> Result<(), Vec<String>> {
        new_config.validate()?;
        let mut config = self.config.write().await;
        *config = new_config;
        info!("runtime configuration updated");
        let _ = self.change_tx.send(ConfigChangeEvent::Updated);
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        self.change_tx.subscribe()
    }
}

impl Clone for RuntimeConfigManager {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            change_tx: self.change_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_reflects_initial_config() {
        let manager = RuntimeConfigManager::new(RuntimeConfig::default());
        let snap = manager.snapshot().await;
        assert_eq!(snap.oracle.avg_price_candles_count, 5);
    }

    #[tokio::test]
    async fn update_rejects_invalid_config_and_keeps_old_snapshot() {
        let manager = RuntimeConfigManager::new(RuntimeConfig::default());
        let mut bad = RuntimeConfig::default();
        bad.validation.max_signal_lifetime_minutes = 0;
        let result = manager.update(bad).await;
        assert!(result.is_err());
        let snap = manager.snapshot().await;
        assert_eq!(snap.validation.max_signal_lifetime_minutes, 1440);
    }

    #[test]
    fn env_override_wins_over_default() {
        std::env::set_var("CC_PERCENT_FEE_TEST_MARKER", "unused");
        let mut config = RuntimeConfig::default();
        std::env::set_var("CC_PERCENT_FEE", "0.25");
        config = apply_cc_env_overrides(config);
        assert_eq!(config.pnl.percent_fee, Decimal::from_str("0.25").unwrap());
        std::env::remove_var("CC_PERCENT_FEE");
    }
}
