//! Record store adapter.
//!
//! One reactive "live collection of records" over exactly one of two
//! backends, picked once when the store is opened:
//! - [`CloudBackend`] over a remote document collection, used when cloud
//!   credentials are configured and the client can be built;
//! - [`LocalBackend`] over a single key in a local `SQLite` file otherwise.
//!
//! Callers hold a [`RecordStore`] and never branch on which backend is active.

pub mod cloud;
pub mod firestore;
pub mod local;
pub mod schema;
pub mod signal;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{info, warn};

pub use cloud::{CloudBackend, DocumentCollection};
pub use firestore::FirestoreCollection;
pub use local::LocalBackend;
pub use signal::LocalSignal;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::seed;
use crate::sequence;

/// Receives the full record set, newest-first, on every change.
pub type SnapshotCallback = Arc<dyn Fn(Vec<Record>) + Send + Sync>;

/// Handle returned by `subscribe`.
///
/// Dropping it, or calling [`Subscription::unsubscribe`], detaches every
/// listener registered by that `subscribe` call.
#[must_use = "dropping a Subscription detaches it immediately"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wrap the teardown of one subscription.
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// Detach now.
    pub fn unsubscribe(mut self) {
        self.run_detach();
    }

    fn run_detach(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_detach();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

/// The capability every backend provides.
#[async_trait]
pub trait RecordBackend: Send + Sync + fmt::Debug {
    /// Short backend name for logs and status output.
    fn name(&self) -> &'static str;

    /// Whether this is the cloud backend.
    fn is_live(&self) -> bool;

    /// Register `callback` for full snapshots.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial registration fails.
    fn subscribe(&self, callback: SnapshotCallback) -> Result<Subscription>;

    /// Persist one complete record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects or fails the write.
    async fn add(&self, record: Record) -> Result<()>;

    /// Remove the record with the given id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails the delete.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// The store handle held by the composition root.
#[derive(Debug, Clone)]
pub struct RecordStore {
    backend: Arc<dyn RecordBackend>,
}

impl RecordStore {
    /// Open the store described by `config`.
    ///
    /// Uses the cloud backend if credentials are present and the client can be
    /// constructed. A construction failure is logged and the local backend is
    /// used instead for the lifetime of the returned handle.
    ///
    /// # Errors
    ///
    /// Returns an error only if the local backend cannot be opened.
    pub fn open(config: &Config) -> Result<Self> {
        if config.cloud.is_configured() {
            match FirestoreCollection::new(&config.cloud) {
                Ok(collection) => {
                    info!(
                        project = %config.cloud.project_id,
                        collection = %config.cloud.collection,
                        "Using cloud record store"
                    );
                    return Ok(Self::from_backend(CloudBackend::new(
                        collection,
                        config.cloud.poll_interval(),
                    )));
                }
                Err(e) => {
                    warn!(error = %e, "Cloud store unavailable, falling back to local storage");
                }
            }
        }

        let local = LocalBackend::open(
            config.database_path(),
            config.storage.storage_key.clone(),
            seed::initial_records(),
            config.watch_interval(),
        )?;
        Ok(Self::from_backend(local))
    }

    /// Wrap an already constructed backend.
    #[must_use]
    pub fn from_backend(backend: impl RecordBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Subscribe to full snapshots. See [`RecordBackend::subscribe`].
    ///
    /// # Errors
    ///
    /// Returns an error if the initial registration fails.
    pub fn subscribe<F>(&self, callback: F) -> Result<Subscription>
    where
        F: Fn(Vec<Record>) + Send + Sync + 'static,
    {
        self.backend.subscribe(Arc::new(callback))
    }

    /// Persist one record.
    ///
    /// # Errors
    ///
    /// Propagates backend failures unchanged.
    pub async fn add(&self, record: Record) -> Result<()> {
        self.backend.add(record).await
    }

    /// Remove a record by id.
    ///
    /// # Errors
    ///
    /// Propagates backend failures unchanged.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.backend.delete(id).await
    }

    /// Wait for the first snapshot, then detach.
    ///
    /// # Errors
    ///
    /// Returns an error if registration fails or the subscription ends before
    /// delivering anything.
    pub async fn snapshot(&self) -> Result<Vec<Record>> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let subscription = self.subscribe(move |records| {
            let sender = tx.lock().unwrap_or_else(PoisonError::into_inner).take();
            if let Some(sender) = sender {
                let _ = sender.send(records);
            }
        })?;
        let records = rx
            .await
            .map_err(|_| Error::internal("subscription closed before first snapshot"))?;
        subscription.unsubscribe();
        Ok(records)
    }

    /// Next display number for the given snapshot.
    #[must_use]
    pub fn next_sequence(records: &[Record]) -> i64 {
        sequence::next_sequence(records)
    }

    /// Whether the cloud backend is active.
    #[must_use]
    pub fn is_live_mode(&self) -> bool {
        self.backend.is_live()
    }

    /// Name of the active backend.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::SnapshotCallback;
    use crate::record::Record;

    /// A scratch directory removed on drop.
    pub struct TempDb {
        dir: PathBuf,
    }

    impl TempDb {
        pub fn new(name: &str) -> Self {
            static COUNTER: AtomicU64 = AtomicU64::new(0);
            let dir = std::env::temp_dir().join(format!(
                "hopelink-{name}-{}-{}",
                std::process::id(),
                COUNTER.fetch_add(1, Ordering::SeqCst)
            ));
            std::fs::create_dir_all(&dir).expect("create temp dir");
            Self { dir }
        }

        pub fn dir(&self) -> &Path {
            &self.dir
        }

        pub fn path(&self) -> PathBuf {
            self.dir.join("hopelink.db")
        }
    }

    impl Drop for TempDb {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.dir);
        }
    }

    /// A callback that forwards every snapshot into a channel.
    pub fn collector() -> (SnapshotCallback, mpsc::UnboundedReceiver<Vec<Record>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: SnapshotCallback = Arc::new(move |records| {
            let _ = tx.send(records);
        });
        (callback, rx)
    }

    /// Wait (bounded) for the next snapshot.
    pub async fn next_snapshot(rx: &mut mpsc::UnboundedReceiver<Vec<Record>>) -> Vec<Record> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for snapshot")
            .expect("subscription channel closed")
    }
}

#[cfg(test)]
mod tests {
    use super::testing::TempDb;
    use super::*;
    use crate::record::SEQUENCE_NUMBER;
    use rusqlite::Connection;
    use serde_json::Value;

    fn local_config(db: &TempDb) -> Config {
        let mut config = Config::default();
        config.storage.database_path = Some(db.path());
        config.storage.watch_interval_ms = 20;
        config
    }

    fn stored_records(db: &TempDb, key: &str) -> Vec<Record> {
        let conn = Connection::open(db.path()).unwrap();
        let raw: String = conn
            .query_row(schema::SELECT_VALUE, [key], |row| row.get(0))
            .unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_unconfigured_cloud_uses_local() {
        let db = TempDb::new("unconfigured");
        let store = RecordStore::open(&local_config(&db)).unwrap();

        assert!(!store.is_live_mode());
        assert_eq!(store.backend_name(), "local");
    }

    #[tokio::test]
    async fn test_cloud_init_failure_falls_back_to_local() {
        let db = TempDb::new("fallback");
        let mut config = local_config(&db);
        config.cloud.api_key = "AIza-test".to_string();
        config.cloud.project_id = "gps-registration".to_string();
        config.cloud.base_url = "not a url".to_string();

        let store = RecordStore::open(&config).unwrap();
        assert!(!store.is_live_mode());

        store
            .add(Record::new("1700000000001").with_field("name", "fallback"))
            .await
            .unwrap();

        let stored = stored_records(&db, "hopeLinkData");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, "1700000000001");
    }

    #[tokio::test]
    async fn test_configured_cloud_is_live() {
        let db = TempDb::new("live");
        let mut config = local_config(&db);
        config.cloud.api_key = "AIza-test".to_string();
        config.cloud.project_id = "gps-registration".to_string();

        let store = RecordStore::open(&config).unwrap();
        assert!(store.is_live_mode());
        assert_eq!(store.backend_name(), "cloud");
        assert!(!db.path().exists());
    }

    #[tokio::test]
    async fn test_first_subscribe_delivers_seed_and_persists_it() {
        let db = TempDb::new("seed");
        let store = RecordStore::open(&local_config(&db)).unwrap();

        let records = store.snapshot().await.unwrap();
        assert_eq!(records, seed::initial_records());
        assert_eq!(stored_records(&db, "hopeLinkData"), seed::initial_records());
    }

    #[tokio::test]
    async fn test_sequential_adds_newest_first() {
        let db = TempDb::new("order");
        let store = RecordStore::open(&local_config(&db)).unwrap();

        store.add(Record::new("1")).await.unwrap();
        store.add(Record::new("2")).await.unwrap();

        let records = store.snapshot().await.unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
    }

    #[tokio::test]
    async fn test_undefined_sequence_numbers_yield_one() {
        let db = TempDb::new("undefined-seq");
        let store = RecordStore::open(&local_config(&db)).unwrap();

        store.add(Record::new("1")).await.unwrap();
        store
            .add(Record::new("2").with_field(SEQUENCE_NUMBER, Value::Null))
            .await
            .unwrap();

        let records = store.snapshot().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(RecordStore::next_sequence(&records), 1);
    }

    #[tokio::test]
    async fn test_add_then_delete_is_observed_by_every_subscriber() {
        let db = TempDb::new("observe");
        let store = RecordStore::open(&local_config(&db)).unwrap();

        let (cb_a, mut rx_a) = testing::collector();
        let (cb_b, mut rx_b) = testing::collector();
        let _a = store.subscribe(move |r| cb_a(r)).unwrap();
        let _b = store.subscribe(move |r| cb_b(r)).unwrap();
        rx_a.try_recv().unwrap();
        rx_b.try_recv().unwrap();

        let record = Record::new("new-1").with_field("name", "이순신");
        store.add(record.clone()).await.unwrap();
        for rx in [&mut rx_a, &mut rx_b] {
            let snapshot = rx.try_recv().unwrap();
            assert_eq!(snapshot.first(), Some(&record));
        }

        store.delete("new-1").await.unwrap();
        for rx in [&mut rx_a, &mut rx_b] {
            let snapshot = rx.try_recv().unwrap();
            assert!(snapshot.iter().all(|r| r.id != "new-1"));
        }
    }

    #[test]
    fn test_subscription_detaches_once() {
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let sub = Subscription::new(move || {
            inner.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        sub.unsubscribe();
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
