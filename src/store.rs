//! File-backed document store for the CLI.
//!
//! Each database is held in memory and written out as a JSON snapshot to
//! `<prefix>/<db>.json` after every batch that changed something.

use async_trait::async_trait;
use docgate_core::store::ChangeBatch;
use docgate_core::{
    BulkOptions, BulkWrite, Document, DocumentStore, MemoryStore, Snapshot, StoreError, StoreInfo,
    WriteResult,
};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub struct SnapshotStore {
    path: PathBuf,
    inner: MemoryStore,
    // Serializes write + persist so snapshots land in write order.
    write_lock: Mutex<()>,
}

impl SnapshotStore {
    /// Opens the snapshot at `path`, starting empty if it does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let inner = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let snapshot: Snapshot = serde_json::from_str(&contents).map_err(|e| {
                    StoreError::Persistence(format!("{}: {}", path.display(), e))
                })?;
                MemoryStore::from_snapshot(snapshot)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MemoryStore::new(),
            Err(e) => {
                return Err(StoreError::Persistence(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            }
        };

        tracing::debug!("Opened snapshot store at {}", path.display());
        Ok(Self {
            path,
            inner,
            write_lock: Mutex::new(()),
        })
    }

    /// Opens the store for database `db` under `prefix`.
    pub async fn open_in(prefix: &Path, db: &str) -> Result<Self, StoreError> {
        Self::open(snapshot_path(prefix, db)).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let snapshot = self.inner.snapshot().await;
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| StoreError::Persistence(e.to_string()))?;
        let io_err = |e: std::io::Error| StoreError::Persistence(format!("{}: {}", self.path.display(), e));

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        Ok(())
    }
}

/// Location of a database snapshot under a storage prefix.
pub fn snapshot_path(prefix: &Path, db: &str) -> PathBuf {
    prefix.join(format!("{}.json", db))
}

#[async_trait]
impl BulkWrite for SnapshotStore {
    async fn bulk_write(
        &self,
        docs: Vec<Document>,
        options: BulkOptions,
    ) -> Result<Vec<WriteResult>, StoreError> {
        let _guard = self.write_lock.lock().await;
        let results = self.inner.bulk_write(docs, options).await?;
        if results.iter().any(WriteResult::is_ok) {
            self.persist().await?;
        }
        Ok(results)
    }
}

#[async_trait]
impl DocumentStore for SnapshotStore {
    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        self.inner.get(id).await
    }

    async fn changes(&self, since: u64, limit: usize) -> Result<ChangeBatch, StoreError> {
        self.inner.changes(since, limit).await
    }

    async fn info(&self) -> Result<StoreInfo, StoreError> {
        self.inner.info().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let temp_dir = tempdir().unwrap();
        let store = SnapshotStore::open_in(temp_dir.path(), "notes").await.unwrap();

        assert_eq!(store.info().await.unwrap().doc_count, 0);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_writes_survive_reopen() {
        let temp_dir = tempdir().unwrap();
        let prefix = temp_dir.path().join("nested");

        let store = SnapshotStore::open_in(&prefix, "notes").await.unwrap();
        let results = store
            .bulk_write(vec![doc(json!({"_id": "a", "n": 1}))], BulkOptions::default())
            .await
            .unwrap();
        assert!(results[0].is_ok());
        assert!(snapshot_path(&prefix, "notes").exists());

        let reopened = SnapshotStore::open_in(&prefix, "notes").await.unwrap();
        let stored = reopened.get("a").await.unwrap().unwrap();
        assert_eq!(stored.get("n"), Some(&json!(1)));
        assert_eq!(reopened.info().await.unwrap().update_seq, 1);
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_persist() {
        let temp_dir = tempdir().unwrap();
        let store = SnapshotStore::open_in(temp_dir.path(), "notes").await.unwrap();

        let results = store
            .bulk_write(
                vec![doc(json!({"_id": "a", "_rev": "3-abc"}))],
                BulkOptions::default(),
            )
            .await
            .unwrap();
        assert!(!results[0].is_ok());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_an_error() {
        let temp_dir = tempdir().unwrap();
        let path = snapshot_path(temp_dir.path(), "notes");
        std::fs::write(&path, "not json").unwrap();

        let result = SnapshotStore::open(&path).await;
        assert!(matches!(result, Err(StoreError::Persistence(_))));
    }
}
