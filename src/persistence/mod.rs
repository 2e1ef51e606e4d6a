pub mod file_store;
pub mod sled_store;

pub use file_store::FileStore;
pub use sled_store::SledStore;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::EngineError;

/// Outcome of a `Persistence::read`.
#[derive(Debug)]
pub enum ReadOutcome<T> {
    Found(T),
    NotFound,
    Corrupt(String),
}

/// A crash-safe key/value contract scoped to one namespace (§4.4). A
/// namespace is a directory-style prefix (`signal/{strategyName}/{symbol}`,
/// `risk/{riskName}/positions`); entity ids are opaque strings within it.
#[async_trait]
pub trait Persistence<T>: Send + Sync
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    async fn read(&self, entity_id: &str) -> ReadOutcome<T>;

    /// Atomic: a concurrent reader observes either the previous value or the
    /// new one, never a partial write, never absence.
    async fn write(&self, entity_id: &str, value: &T) -> Result<(), EngineError>;

    async fn remove(&self, entity_id: &str) -> Result<(), EngineError>;

    async fn list(&self) -> Result<Vec<String>, EngineError>;

    /// Scans the namespace; any entry that fails to deserialize is logged
    /// and removed with bounded retry. Returns the surviving entries.
    async fn init(&self) -> Result<Vec<(String, T)>, EngineError>;
}
