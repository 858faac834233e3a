//! Durable storage for the scheduler: pending deadlines and archived records.

use super::schedule::Deadline;
use crate::vote::VoteId;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const PENDING_FILE: &str = "pending.json";
const ARCHIVE_FILE: &str = "archive.json";

/// Result type for scheduler operations
pub type PraetorResult<T> = Result<T, PraetorError>;

#[derive(Debug, thiserror::Error)]
pub enum PraetorError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Deadline handler failed for #{id}: {reason}")]
    Handler { id: VoteId, reason: String },
}

/// Where the scheduler keeps its state between runs.
#[async_trait]
pub trait PraetorStore: Send + Sync {
    async fn load_pending(&self) -> PraetorResult<Vec<Deadline>>;

    /// Replace the persisted pending list.
    async fn save_pending(&self, pending: &[Deadline]) -> PraetorResult<()>;

    /// Add or replace archived records.
    async fn store_records(&self, records: &[(VoteId, Value)]) -> PraetorResult<()>;

    async fn record(&self, id: VoteId) -> PraetorResult<Option<Value>>;

    /// Every archived record, ordered by id.
    async fn records(&self) -> PraetorResult<BTreeMap<VoteId, Value>>;

    async fn archived_ids(&self) -> PraetorResult<Vec<VoteId>> {
        Ok(self.records().await?.into_keys().collect())
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    pending: Vec<Deadline>,
    archive: BTreeMap<VoteId, Value>,
    pending_writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the pending list has been persisted.
    pub fn pending_writes(&self) -> usize {
        self.lock().pending_writes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PraetorStore for MemoryStore {
    async fn load_pending(&self) -> PraetorResult<Vec<Deadline>> {
        Ok(self.lock().pending.clone())
    }

    async fn save_pending(&self, pending: &[Deadline]) -> PraetorResult<()> {
        let mut inner = self.lock();
        inner.pending = pending.to_vec();
        inner.pending_writes += 1;
        Ok(())
    }

    async fn store_records(&self, records: &[(VoteId, Value)]) -> PraetorResult<()> {
        let mut inner = self.lock();
        for (id, record) in records {
            inner.archive.insert(*id, record.clone());
        }
        Ok(())
    }

    async fn record(&self, id: VoteId) -> PraetorResult<Option<Value>> {
        Ok(self.lock().archive.get(&id).cloned())
    }

    async fn records(&self) -> PraetorResult<BTreeMap<VoteId, Value>> {
        Ok(self.lock().archive.clone())
    }
}

/// Store backed by `pending.json` and `archive.json` in one directory.
pub struct JsonFileStore {
    dir: PathBuf,
    /// Serializes read-modify-write cycles on the archive.
    lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn open(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read<T: DeserializeOwned + Default>(&self, name: &str) -> PraetorResult<T> {
        let path = self.dir.join(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Ok(T::default()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                PraetorError::Store(format!("Failed to parse '{}': {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> PraetorResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.dir.join(name);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl PraetorStore for JsonFileStore {
    async fn load_pending(&self) -> PraetorResult<Vec<Deadline>> {
        let _guard = self.lock.lock().await;
        self.read(PENDING_FILE).await
    }

    async fn save_pending(&self, pending: &[Deadline]) -> PraetorResult<()> {
        let _guard = self.lock.lock().await;
        self.write(PENDING_FILE, pending).await
    }

    async fn store_records(&self, records: &[(VoteId, Value)]) -> PraetorResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        let mut archive: BTreeMap<VoteId, Value> = self.read(ARCHIVE_FILE).await?;
        for (id, record) in records {
            archive.insert(*id, record.clone());
        }
        self.write(ARCHIVE_FILE, &archive).await
    }

    async fn record(&self, id: VoteId) -> PraetorResult<Option<Value>> {
        Ok(self.records().await?.remove(&id))
    }

    async fn records(&self) -> PraetorResult<BTreeMap<VoteId, Value>> {
        let _guard = self.lock.lock().await;
        self.read(ARCHIVE_FILE).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_store_starts_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path());

        assert!(store.load_pending().await.unwrap().is_empty());
        assert!(store.archived_ids().await.unwrap().is_empty());
        assert_eq!(store.record(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = JsonFileStore::open(dir.path());
            store
                .save_pending(&[Deadline { id: 4, at: 1000 }])
                .await
                .unwrap();
            store
                .store_records(&[(4, json!({"outcome": "passed"}))])
                .await
                .unwrap();
            store
                .store_records(&[(9, json!({"outcome": "canceled"}))])
                .await
                .unwrap();
        }

        let store = JsonFileStore::open(dir.path());
        assert_eq!(
            store.load_pending().await.unwrap(),
            vec![Deadline { id: 4, at: 1000 }]
        );
        assert_eq!(store.archived_ids().await.unwrap(), vec![4, 9]);
        assert_eq!(
            store.record(9).await.unwrap(),
            Some(json!({"outcome": "canceled"}))
        );
        assert!(dir.path().join(PENDING_FILE).exists());
        assert!(dir.path().join(ARCHIVE_FILE).exists());
    }

    #[tokio::test]
    async fn test_corrupt_archive_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(ARCHIVE_FILE), b"{not json").unwrap();
        let store = JsonFileStore::open(dir.path());

        assert!(matches!(
            store.archived_ids().await,
            Err(PraetorError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_store_counts_pending_writes() {
        let store = MemoryStore::new();
        store.save_pending(&[]).await.unwrap();
        store.save_pending(&[Deadline { id: 1, at: 5 }]).await.unwrap();

        assert_eq!(store.pending_writes(), 2);
        assert_eq!(store.load_pending().await.unwrap().len(), 1);
    }
}
