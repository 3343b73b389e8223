//! Memory persistence backends
//!
//! The vector memory persists its full state as a single JSON blob in a
//! string-keyed slot. The slot is abstracted behind `MemoryBackend` so the
//! engine runs against a file, a database row, or nothing at all (tests).

use async_trait::async_trait;
use sdk::errors::EngineError;
use std::path::PathBuf;
use std::sync::Mutex;

/// A single-slot blob store for the memory state
///
/// `load` returns `None` when the slot has never been written; readers must
/// treat that as empty state. `save` overwrites the slot wholesale.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Read the persisted blob, if any
    async fn load(&self) -> Result<Option<String>, EngineError>;

    /// Overwrite the persisted blob
    async fn save(&self, blob: &str) -> Result<(), EngineError>;
}

/// File-backed slot (one JSON file under the data directory)
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MemoryBackend for FileStore {
    async fn load(&self) -> Result<Option<String>, EngineError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::Storage(format!(
                "cannot read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn save(&self, blob: &str) -> Result<(), EngineError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                EngineError::Storage(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(&self.path, blob).await.map_err(|e| {
            EngineError::Storage(format!("cannot write {}: {}", self.path.display(), e))
        })
    }
}

/// Ephemeral slot held in process memory
///
/// Used by tests and by hosts that do not want durability.
#[derive(Default)]
pub struct InMemoryStore {
    slot: Mutex<Option<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryBackend for InMemoryStore {
    async fn load(&self) -> Result<Option<String>, EngineError> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| EngineError::Storage("memory slot poisoned".to_string()))?;
        Ok(slot.clone())
    }

    async fn save(&self, blob: &str) -> Result<(), EngineError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| EngineError::Storage("memory slot poisoned".to_string()))?;
        *slot = Some(blob.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_missing_slot() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("memory.json"));
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested").join("memory.json"));

        store.save("{\"memories\":[]}").await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.as_deref(), Some("{\"memories\":[]}"));
    }

    #[tokio::test]
    async fn test_in_memory_store_roundtrip() {
        let store = InMemoryStore::new();
        assert_eq!(store.load().await.unwrap(), None);

        store.save("blob").await.unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("blob"));

        store.save("blob2").await.unwrap();
        assert_eq!(store.load().await.unwrap().as_deref(), Some("blob2"));
    }
}
