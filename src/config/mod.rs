pub mod manager;
pub mod runtime;

pub use manager::{load, ConfigChangeEvent, RuntimeConfigManager};
pub use runtime::{GeneralSettings, OracleSettings, PnlSettings, RuntimeConfig, SchedulingSettings, ValidationSettings};
