use std::marker::PhantomData;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, warn};

use crate::error::EngineError;

use super::{Persistence, ReadOutcome};

/// Alternate realization of `Persistence` on top of the embedded `sled`
/// database — one `sled::Tree` per namespace, keys are entity ids, values
/// are JSON-encoded. Atomicity comes from `sled`'s own write-ahead log
/// rather than temp-file-and-rename, but the contract observed by callers is
/// identical to `FileStore`.
pub struct SledStore<T> {
    tree: sled::Tree,
    _marker: PhantomData<T>,
}

impl<T> SledStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn open(db: &sled::Db, namespace: &str) -> Result<Self, EngineError> {
        let tree = db
            .open_tree(namespace)
            .map_err(|e| EngineError::Fatal(format!("cannot open sled tree {}: {}", namespace, e)))?;
        Ok(Self { tree, _marker: PhantomData })
    }
}

#[async_trait]
impl<T> Persistence<T> for SledStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    async fn read(&self, entity_id: &str) -> ReadOutcome<T> {
        match self.tree.get(entity_id) {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => ReadOutcome::Found(value),
                Err(e) => ReadOutcome::Corrupt(e.to_string()),
            },
            Ok(None) => ReadOutcome::NotFound,
            Err(e) => ReadOutcome::Corrupt(e.to_string()),
        }
    }

    async fn write(&self, entity_id: &str, value: &T) -> Result<(), EngineError> {
        let json = serde_json::to_vec(value).map_err(|e| EngineError::Fatal(format!("serialize failed: {}", e)))?;
        self.tree
            .insert(entity_id, json)
            .map_err(|e| EngineError::Fatal(format!("sled insert failed: {}", e)))?;
        self.tree.flush_async().await.map_err(|e| EngineError::Fatal(format!("sled flush failed: {}", e)))?;
        Ok(())
    }

    async fn remove(&self, entity_id: &str) -> Result<(), EngineError> {
        self.tree
            .remove(entity_id)
            .map_err(|e| EngineError::Fatal(format!("sled remove failed: {}", e)))?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, EngineError> {
        let mut ids = Vec::new();
        for entry in self.tree.iter() {
            let (key, _) = entry.map_err(|e| EngineError::Fatal(format!("sled iter failed: {}", e)))?;
            ids.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(ids)
    }

    async fn init(&self) -> Result<Vec<(String, T)>, EngineError> {
        let mut survivors = Vec::new();
        for id in self.list().await? {
            match self.read(&id).await {
                ReadOutcome::Found(value) => survivors.push((id, value)),
                ReadOutcome::NotFound => {}
                ReadOutcome::Corrupt(reason) => {
                    error!(entity_id = %id, reason = %reason, "persisted sled entry is corrupt, removing");
                    if let Err(e) = self.remove(&id).await {
                        warn!(entity_id = %id, error = %e, "failed to remove corrupt sled entry");
                    }
                }
            }
        }
        Ok(survivors)
    }
}
