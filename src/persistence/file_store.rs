use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;
use tracing::{error, warn};

use crate::error::EngineError;

use super::{Persistence, ReadOutcome};

/// Default realization of `Persistence`: one JSON file per entity under
/// `{root}/{namespace}/{entityId}.json`. Writes go through a temp file in the
/// same directory, fsynced, then renamed over the target — the POSIX atomic
/// write pattern (§4.4) — so a concurrent reader never observes a partial
/// write.
pub struct FileStore<T> {
    dir: PathBuf,
    _marker: PhantomData<T>,
}

impl<T> FileStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(root: impl AsRef<Path>, namespace: &str) -> Result<Self, EngineError> {
        let dir = root.as_ref().join(namespace);
        fs::create_dir_all(&dir).map_err(|e| EngineError::Fatal(format!("cannot create persistence dir {}: {}", dir.display(), e)))?;
        Ok(Self { dir, _marker: PhantomData })
    }

    fn path_for(&self, entity_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", entity_id))
    }
}

#[async_trait]
impl<T> Persistence<T> for FileStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    async fn read(&self, entity_id: &str) -> ReadOutcome<T> {
        let path = self.path_for(entity_id);
        let raw = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ReadOutcome::NotFound,
            Err(e) => return ReadOutcome::Corrupt(e.to_string()),
        };
        match serde_json::from_slice(&raw) {
            Ok(value) => ReadOutcome::Found(value),
            Err(e) => ReadOutcome::Corrupt(e.to_string()),
        }
    }

    async fn write(&self, entity_id: &str, value: &T) -> Result<(), EngineError> {
        let path = self.path_for(entity_id);
        let json = serde_json::to_vec_pretty(value).map_err(|e| EngineError::Fatal(format!("serialize failed: {}", e)))?;

        let mut tmp = NamedTempFile::new_in(&self.dir)
            .map_err(|e| EngineError::Fatal(format!("cannot create temp file in {}: {}", self.dir.display(), e)))?;
        use std::io::Write as _;
        tmp.write_all(&json).map_err(|e| EngineError::Fatal(format!("temp file write failed: {}", e)))?;
        tmp.as_file().sync_all().map_err(|e| EngineError::Fatal(format!("fsync failed: {}", e)))?;
        tmp.persist(&path).map_err(|e| EngineError::Fatal(format!("rename into place failed: {}", e)))?;
        Ok(())
    }

    async fn remove(&self, entity_id: &str) -> Result<(), EngineError> {
        let path = self.path_for(entity_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::Fatal(format!("cannot remove {}: {}", path.display(), e))),
        }
    }

    async fn list(&self) -> Result<Vec<String>, EngineError> {
        let mut ids = Vec::new();
        let entries = fs::read_dir(&self.dir).map_err(|e| EngineError::Fatal(format!("cannot list {}: {}", self.dir.display(), e)))?;
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::Fatal(e.to_string()))?;
            if let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) {
                ids.push(name.to_string());
            }
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
                    error!(entity_id = %id, reason = %reason, "persisted entry is corrupt, removing");
                    if let Err(e) = self.remove(&id).await {
                        warn!(entity_id = %id, error = %e, "failed to remove corrupt entry");
                    }
                }
            }
        }
        Ok(survivors)
    }
}
