pub mod backtest;
pub mod live;

pub use backtest::BacktestDriver;
pub use live::LiveDriver;
