//! Database handles.
//!
//! A [`Database`] ties together a store, the validated bulk write path, the
//! database's design documents, and (optionally) a replication session with
//! a remote.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, Mutex};

use crate::bulk::{BulkOptions, BulkWriteError, ResultSlot, ValidatedWriter};
use crate::design::{seed_design_docs, DesignError};
use crate::document::Document;
use crate::replication::{
    Notification, Notifier, Replicator, SessionState, SyncCoordinator, SyncSettings,
};
use crate::store::{DocumentStore, StoreError, StoreInfo};
use crate::validation::{RegistryError, Validator, ValidatorRegistry};

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Must provide a database name")]
    InvalidName,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Failed to prepare design documents: {0}")]
    Design(#[from] DesignError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Replication setup for a database.
#[derive(Clone)]
pub struct SyncSetup {
    pub replicator: Arc<dyn Replicator>,
    pub settings: SyncSettings,
}

/// Options for opening a database.
#[derive(Clone, Default)]
pub struct DatabaseOptions {
    /// Storage prefix; scopes validator registration.
    pub prefix: String,
    pub validator: Option<Validator>,
    pub design_docs: Vec<Document>,
    pub sync: Option<SyncSetup>,
}

impl DatabaseOptions {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_design_docs(mut self, ddocs: Vec<Document>) -> Self {
        self.design_docs = ddocs;
        self
    }

    pub fn with_sync(mut self, replicator: Arc<dyn Replicator>, settings: SyncSettings) -> Self {
        self.sync = Some(SyncSetup {
            replicator,
            settings,
        });
        self
    }
}

/// An open database.
pub struct Database {
    name: String,
    prefix: String,
    store: Arc<dyn DocumentStore>,
    writer: ValidatedWriter<dyn DocumentStore>,
    notifier: Notifier,
    sync: Option<SyncCoordinator>,
}

impl Database {
    /// Opens a database on top of `store`.
    ///
    /// The validator is resolved through `registry`, design documents are
    /// seeded, and replication starts unless the sync settings say offline.
    pub async fn open(
        name: &str,
        store: Arc<dyn DocumentStore>,
        options: DatabaseOptions,
        registry: &ValidatorRegistry,
    ) -> Result<Self, DatabaseError> {
        if name.is_empty() {
            return Err(DatabaseError::InvalidName);
        }

        let validator = registry.resolve(&options.prefix, name, options.validator)?;
        if validator.is_none() {
            tracing::warn!("DB {} has no validation function; be careful!", name);
        }

        tracing::debug!("Get DB: {} (prefix {})", name, options.prefix);
        seed_design_docs(store.as_ref(), name, &options.design_docs).await?;

        let notifier = Notifier::new();
        let sync = options.sync.map(|setup| {
            let coordinator = SyncCoordinator::new(setup.replicator, setup.settings, notifier.clone());
            coordinator.start();
            coordinator
        });

        Ok(Self {
            name: name.to_string(),
            prefix: options.prefix,
            writer: ValidatedWriter::new(store.clone(), validator),
            store,
            notifier,
            sync,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn validator(&self) -> Option<&Validator> {
        self.writer.gate().validator()
    }

    /// Writes a batch, returning one result per document in batch order.
    pub async fn bulk_write(
        &self,
        docs: Vec<Document>,
        options: BulkOptions,
    ) -> Result<Vec<ResultSlot>, BulkWriteError> {
        self.writer.bulk_write(docs, options).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        self.store.get(id).await
    }

    pub async fn info(&self) -> Result<StoreInfo, StoreError> {
        self.store.info().await
    }

    /// Starts (or restarts) replication. Does nothing without sync settings.
    pub fn go_online(&self) {
        match &self.sync {
            Some(sync) => sync.go_online(),
            None => tracing::debug!("DB {} has no remote; staying local", self.name),
        }
    }

    /// Stops replication. Does nothing without sync settings.
    pub fn go_offline(&self) {
        if let Some(sync) = &self.sync {
            sync.go_offline();
        }
    }

    /// Replication state; `None` when the database has no remote.
    pub fn state(&self) -> Option<SessionState> {
        self.sync.as_ref().and_then(SyncCoordinator::state)
    }

    /// Subscribes to replication errors, warnings and sync signals.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }
}

/// Open database handles keyed by prefix and name.
///
/// Constructed once and shared by everything that opens databases. It also
/// owns the validator registry, so validators follow the same keys.
#[derive(Default)]
pub struct DatabaseCache {
    validators: ValidatorRegistry,
    handles: Mutex<HashMap<String, Arc<Database>>>,
}

impl DatabaseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validators(&self) -> &ValidatorRegistry {
        &self.validators
    }

    /// Returns the open handle for `name`, opening it on `store` first if
    /// needed.
    ///
    /// For an already open handle `store` is ignored, and a provided
    /// validator must be the one the handle was opened with.
    pub async fn open(
        &self,
        name: &str,
        store: Arc<dyn DocumentStore>,
        options: DatabaseOptions,
    ) -> Result<Arc<Database>, DatabaseError> {
        let key = format!("{}:{}", options.prefix, name);
        let mut handles = self.handles.lock().await;

        if let Some(db) = handles.get(&key) {
            self.validators.resolve(&options.prefix, name, options.validator)?;
            return Ok(db.clone());
        }

        let db = Arc::new(Database::open(name, store, options, &self.validators).await?);
        handles.insert(key, db.clone());
        Ok(db)
    }

    pub async fn get(&self, prefix: &str, name: &str) -> Option<Arc<Database>> {
        let key = format!("{}:{}", prefix, name);
        self.handles.lock().await.get(&key).cloned()
    }

    /// Forgets a handle. Replication stops once the last clone is dropped.
    pub async fn close(&self, prefix: &str, name: &str) -> bool {
        let key = format!("{}:{}", prefix, name);
        self.handles.lock().await.remove(&key).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::{
        Direction, ReplicationError, ReplicationEvent, ReplicationFault, ReplicationOptions,
        StoreReplicator, StreamHandle,
    };
    use crate::store::MemoryStore;
    use crate::validation::{require_fields, ValidationError};
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_open_requires_name() {
        let registry = ValidatorRegistry::new();
        let result = Database::open(
            "",
            Arc::new(MemoryStore::new()),
            DatabaseOptions::new("/data"),
            &registry,
        )
        .await;
        assert!(matches!(result, Err(DatabaseError::InvalidName)));
    }

    #[tokio::test]
    async fn test_bulk_write_validates() {
        let registry = ValidatorRegistry::new();
        let options = DatabaseOptions::new("/data").with_validator(require_fields(["type"]));
        let db = Database::open("notes", Arc::new(MemoryStore::new()), options, &registry)
            .await
            .unwrap();

        let slots = db
            .bulk_write(
                vec![doc(json!({"_id": "a", "type": "note"})), doc(json!({"_id": "b"}))],
                BulkOptions::default(),
            )
            .await
            .unwrap();

        assert!(!slots[0].is_rejected());
        assert!(slots[1].is_rejected());
        assert!(db.get("a").await.unwrap().is_some());
        assert!(db.get("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reopen_keeps_validator() {
        let registry = ValidatorRegistry::new();
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let validator = Validator::new(|_| Err(ValidationError::new("read only")));

        Database::open(
            "notes",
            store.clone(),
            DatabaseOptions::new("/data").with_validator(validator.clone()),
            &registry,
        )
        .await
        .unwrap();

        let reopened = Database::open("notes", store, DatabaseOptions::new("/data"), &registry)
            .await
            .unwrap();
        assert!(reopened.validator().unwrap().same_as(&validator));
    }

    #[tokio::test]
    async fn test_reopen_with_other_validator_fails() {
        let registry = ValidatorRegistry::new();
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());

        Database::open(
            "notes",
            store.clone(),
            DatabaseOptions::new("/data").with_validator(require_fields(["a"])),
            &registry,
        )
        .await
        .unwrap();

        let result = Database::open(
            "notes",
            store,
            DatabaseOptions::new("/data").with_validator(require_fields(["a"])),
            &registry,
        )
        .await;
        assert!(matches!(
            result,
            Err(DatabaseError::Registry(RegistryError::ValidatorConflict(_)))
        ));
    }

    #[tokio::test]
    async fn test_open_seeds_design_documents() {
        let registry = ValidatorRegistry::new();
        let options = DatabaseOptions::new("/data")
            .with_design_docs(vec![doc(json!({"_id": "_design/app", "views": {}}))]);
        let db = Database::open("notes", Arc::new(MemoryStore::new()), options, &registry)
            .await
            .unwrap();
        assert!(db.get("_design/app").await.unwrap().is_some());
    }

    /// Log sink shared between the subscriber and the test.
    #[derive(Clone, Default)]
    struct CapturedLog(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_missing_validator_warns_once() {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        Database::open(
            "notes",
            Arc::new(MemoryStore::new()),
            DatabaseOptions::new("/data"),
            &ValidatorRegistry::new(),
        )
        .await
        .unwrap();

        let output = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        assert_eq!(output.matches("validation function").count(), 1);
        assert!(output.contains("DB notes has no validation function; be careful!"));
    }

    #[tokio::test]
    async fn test_without_remote_state_is_unset() {
        let registry = ValidatorRegistry::new();
        let db = Database::open(
            "notes",
            Arc::new(MemoryStore::new()),
            DatabaseOptions::new("/data"),
            &registry,
        )
        .await
        .unwrap();

        db.go_online();
        db.go_offline();
        assert_eq!(db.state(), None);
    }

    #[tokio::test]
    async fn test_sync_starts_per_settings() {
        let registry = ValidatorRegistry::new();
        let local: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let remote: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let replicator = Arc::new(StoreReplicator::new(local.clone(), remote));

        let online = Database::open(
            "online",
            local.clone(),
            DatabaseOptions::new("/data")
                .with_sync(replicator.clone(), SyncSettings::new("memory://remote")),
            &registry,
        )
        .await
        .unwrap();
        assert_eq!(online.state(), Some(SessionState::Online));

        let settings = SyncSettings {
            initial_state: Some(SessionState::Offline),
            ..SyncSettings::new("memory://remote")
        };
        let offline = Database::open(
            "offline",
            local,
            DatabaseOptions::new("/data").with_sync(replicator, settings),
            &registry,
        )
        .await
        .unwrap();
        assert_eq!(offline.state(), Some(SessionState::Offline));

        offline.go_online();
        assert_eq!(offline.state(), Some(SessionState::Online));
    }

    /// Streams that are refused before the database handle is returned.
    struct RefusingReplicator;

    impl Replicator for RefusingReplicator {
        fn replicate(
            &self,
            _direction: Direction,
            _endpoint: &str,
            _options: ReplicationOptions,
        ) -> StreamHandle {
            let (tx, stream) = StreamHandle::channel();
            let fault = ReplicationFault::new("unauthorized", "bad credentials").with_status(401);
            tx.send(ReplicationEvent::Denied(fault)).unwrap();
            stream
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_errors_before_subscribe_are_kept() {
        for _ in 0..20 {
            let registry = ValidatorRegistry::new();
            let db = Database::open(
                "notes",
                Arc::new(MemoryStore::new()),
                DatabaseOptions::new("/data")
                    .with_sync(Arc::new(RefusingReplicator), SyncSettings::new("memory://remote")),
                &registry,
            )
            .await
            .unwrap();

            // Let both directions fail before anyone listens.
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            let mut rx = db.subscribe();

            for _ in 0..2 {
                let notification =
                    tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
                        .await
                        .expect("denial notification lost")
                        .unwrap();
                assert!(matches!(
                    notification,
                    Notification::Error(ReplicationError::Denied { .. })
                ));
            }
        }
    }

    #[tokio::test]
    async fn test_cache_returns_same_handle() {
        let cache = DatabaseCache::new();
        let validator = require_fields(["type"]);

        let first = cache
            .open(
                "notes",
                Arc::new(MemoryStore::new()),
                DatabaseOptions::new("/data").with_validator(validator.clone()),
            )
            .await
            .unwrap();
        let second = cache
            .open("notes", Arc::new(MemoryStore::new()), DatabaseOptions::new("/data"))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let same_validator = cache
            .open(
                "notes",
                Arc::new(MemoryStore::new()),
                DatabaseOptions::new("/data").with_validator(validator),
            )
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &same_validator));

        let other_prefix = cache
            .open("notes", Arc::new(MemoryStore::new()), DatabaseOptions::new("/other"))
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &other_prefix));
    }

    #[tokio::test]
    async fn test_cache_rejects_other_validator() {
        let cache = DatabaseCache::new();
        cache
            .open(
                "notes",
                Arc::new(MemoryStore::new()),
                DatabaseOptions::new("/data").with_validator(require_fields(["a"])),
            )
            .await
            .unwrap();

        let result = cache
            .open(
                "notes",
                Arc::new(MemoryStore::new()),
                DatabaseOptions::new("/data").with_validator(require_fields(["a"])),
            )
            .await;
        assert!(matches!(
            result,
            Err(DatabaseError::Registry(RegistryError::ValidatorConflict(_)))
        ));
    }

    #[tokio::test]
    async fn test_cache_close() {
        let cache = DatabaseCache::new();
        cache
            .open("notes", Arc::new(MemoryStore::new()), DatabaseOptions::new("/data"))
            .await
            .unwrap();

        assert!(cache.get("/data", "notes").await.is_some());
        assert!(cache.close("/data", "notes").await);
        assert!(!cache.close("/data", "notes").await);
        assert!(cache.get("/data", "notes").await.is_none());
    }
}
