pub mod candle;
pub mod frame;
pub mod risk_position;
pub mod signal;
pub mod state;

pub use candle::{Candle, CandleBuffer};
pub use frame::{Frame, Interval};
pub use risk_position::RiskPosition;
pub use signal::{Position, ProposedSignal, SignalRecord};
pub use state::{CancelReason, CloseReason, SignalState};
