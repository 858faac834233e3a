//! File-backed document store.
//!
//! All documents live in one JSON file (`documents.json`) inside the database
//! directory, keyed by lower-cased channel or account name. Writes go to a
//! temporary file first and are renamed into place.

use super::traits::{ChatError, ChatResult, ConfigStore};
use crate::config::ConfigDoc;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const DOCUMENTS_FILE: &str = "documents.json";

/// JSON file document store.
pub struct JsonDocStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles on the file.
    lock: Mutex<()>,
}

impl JsonDocStore {
    /// Open (or lazily create) the store inside `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(DOCUMENTS_FILE),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored document, ordered by key.
    pub async fn all(&self) -> ChatResult<BTreeMap<String, ConfigDoc>> {
        let _guard = self.lock.lock().await;
        self.read_all().await
    }

    pub async fn exists(&self, key: &str) -> ChatResult<bool> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.contains_key(&normalize(key)))
    }

    async fn read_all(&self) -> ChatResult<BTreeMap<String, ConfigDoc>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                ChatError::DocStore(format!(
                    "Failed to parse '{}': {}",
                    self.path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(ChatError::DocStore(format!(
                "Failed to read '{}': {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn write_all(&self, docs: &BTreeMap<String, ConfigDoc>) -> ChatResult<()> {
        let bytes = serde_json::to_vec_pretty(docs)
            .map_err(|e| ChatError::DocStore(format!("Serialization failed: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ChatError::DocStore(format!("Failed to create directory: {}", e)))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| ChatError::DocStore(format!("Failed to write '{}': {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| ChatError::DocStore(format!("Failed to replace documents file: {}", e)))
    }
}

fn normalize(key: &str) -> String {
    key.to_lowercase()
}

#[async_trait]
impl ConfigStore for JsonDocStore {
    async fn load(&self, key: &str) -> ChatResult<ConfigDoc> {
        let _guard = self.lock.lock().await;
        Ok(self
            .read_all()
            .await?
            .remove(&normalize(key))
            .unwrap_or_default())
    }

    async fn save(&self, key: &str, doc: &ConfigDoc) -> ChatResult<()> {
        let _guard = self.lock.lock().await;
        let mut docs = self.read_all().await?;
        docs.insert(normalize(key), doc.clone());
        self.write_all(&docs).await
    }
}
