use thiserror::Error;

/// The error taxonomy used throughout the engine.
///
/// Validation, risk, exchange and strategy errors are always recoverable at the
/// tick that produced them — the engine logs them, emits them on the event bus,
/// and returns the slot to `idle`. Only `Persistence`/`Fatal` can end a `run()`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation rejected: {0}")]
    Validation(String),

    #[error("risk gate rejected: {0}")]
    RiskRejection(String),

    #[error("exchange transient error: {0}")]
    ExchangeTransient(String),

    #[error("strategy error: {0}")]
    Strategy(String),

    #[error("persistence entry {namespace}/{id} is corrupt: {reason}")]
    PersistenceCorruption {
        namespace: String,
        id: String,
        reason: String,
    },

    #[error("fatal error: {0}")]
    Fatal(String),
}

impl EngineError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Fatal(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
