//! Local backend: a JSON record array under one key of a `SQLite` file.
//!
//! Each open [`LocalBackend`] owns one connection and plays the role of one
//! browser tab. Writes from the same backend reach subscribers through the
//! in-process [`LocalSignal`]; writes from other connections are picked up by a
//! per-subscription watcher polling `PRAGMA data_version`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::schema::{SCHEMA_STATEMENTS, SELECT_VALUE, UPSERT_VALUE};
use super::signal::LocalSignal;
use super::{RecordBackend, SnapshotCallback, Subscription};
use crate::error::{Error, Result};
use crate::record::Record;

/// Local key/value record storage.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    inner: Arc<LocalInner>,
}

#[derive(Debug)]
struct LocalInner {
    path: PathBuf,
    key: String,
    conn: Mutex<Connection>,
    seed: Vec<Record>,
    signal: LocalSignal,
    watch_interval: Duration,
}

impl LocalBackend {
    /// Open or create the database at `path`.
    ///
    /// `seed` is written under `key` the first time a subscriber finds the
    /// key absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema cannot
    /// be created.
    pub fn open(
        path: impl AsRef<Path>,
        key: impl Into<String>,
        seed: Vec<Record>,
        watch_interval: Duration,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening local store at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        Self::from_connection(path, conn, key.into(), seed, watch_interval)
    }

    /// Create an in-memory store, visible to this handle only.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory(key: impl Into<String>, seed: Vec<Record>) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Self::from_connection(
            PathBuf::from(":memory:"),
            conn,
            key.into(),
            seed,
            Duration::from_millis(500),
        )
    }

    fn from_connection(
        path: PathBuf,
        conn: Connection,
        key: String,
        seed: Vec<Record>,
        watch_interval: Duration,
    ) -> Result<Self> {
        for statement in SCHEMA_STATEMENTS {
            conn.execute(statement, [])?;
        }

        info!("Local store ready at {} (key {key})", path.display());
        Ok(Self {
            inner: Arc::new(LocalInner {
                path,
                key,
                conn: Mutex::new(conn),
                seed,
                signal: LocalSignal::new(),
                watch_interval,
            }),
        })
    }

    /// Path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// The key holding the record array.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Raw JSON currently stored under the key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database read fails.
    pub fn raw_value(&self) -> Result<Option<String>> {
        self.inner.read_raw()
    }

    /// The same-process signal raised after every write.
    #[must_use]
    pub fn signal(&self) -> &LocalSignal {
        &self.inner.signal
    }
}

impl LocalInner {
    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("local store connection lock poisoned"))
    }

    fn read_raw(&self) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(SELECT_VALUE, [&self.key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn write_all(&self, records: &[Record]) -> Result<()> {
        let json = serde_json::to_string(records)?;
        let conn = self.lock()?;
        conn.execute(UPSERT_VALUE, (&self.key, json))?;
        Ok(())
    }

    /// Current records, or an empty set if the key is absent.
    fn read_current(&self) -> Result<Vec<Record>> {
        match self.read_raw()? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// Raw value under the key, seeding it first if it is absent.
    fn load_raw(&self) -> Result<String> {
        if let Some(raw) = self.read_raw()? {
            return Ok(raw);
        }
        info!("Storage key {} empty, writing {} seed records", self.key, self.seed.len());
        let raw = serde_json::to_string(&self.seed)?;
        let conn = self.lock()?;
        conn.execute(UPSERT_VALUE, (&self.key, &raw))?;
        Ok(raw)
    }

    /// Counter that moves only when another connection commits.
    fn data_version(&self) -> Result<i64> {
        let conn = self.lock()?;
        Ok(conn.query_row("PRAGMA data_version", [], |row| row.get(0))?)
    }
}

/// Hands snapshots to one subscriber and remembers the last one handed over.
struct Delivery {
    inner: Arc<LocalInner>,
    callback: SnapshotCallback,
    last_digest: Mutex<Option<blake3::Hash>>,
}

impl Delivery {
    fn new(inner: Arc<LocalInner>, callback: SnapshotCallback) -> Self {
        Self {
            inner,
            callback,
            last_digest: Mutex::new(None),
        }
    }

    /// Read the key and deliver it. With `only_if_changed`, a value whose
    /// digest matches the last delivery is skipped.
    ///
    /// The digest lock is held across read and callback so deliveries for
    /// one subscriber never overtake each other.
    fn deliver(&self, only_if_changed: bool) -> Result<bool> {
        let mut last = self
            .last_digest
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let raw = self.inner.load_raw()?;
        let digest = blake3::hash(raw.as_bytes());
        if only_if_changed && *last == Some(digest) {
            return Ok(false);
        }

        let records: Vec<Record> = serde_json::from_str(&raw)?;
        *last = Some(digest);
        (self.callback)(records);
        Ok(true)
    }
}

/// Poll for commits made through other connections to the same file.
///
/// `last_version` must be read before the initial delivery.
async fn watch_other_connections(delivery: Arc<Delivery>, mut last_version: i64) {
    let inner = Arc::clone(&delivery.inner);
    let mut ticker = tokio::time::interval(inner.watch_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let version = match inner.data_version() {
            Ok(version) => version,
            Err(e) => {
                warn!(error = %e, "failed to read data_version");
                continue;
            }
        };
        if version == last_version {
            continue;
        }
        last_version = version;

        // Unchanged digest means some other key changed
        match delivery.deliver(true) {
            Ok(true) => debug!(key = %inner.key, "storage key changed by another connection"),
            Ok(false) => {}
            Err(e) => error!(error = %e, key = %inner.key, "failed to reload local records"),
        }
    }
}

#[async_trait]
impl RecordBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn is_live(&self) -> bool {
        false
    }

    fn subscribe(&self, callback: SnapshotCallback) -> Result<Subscription> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::internal("subscribe must be called within a Tokio runtime"))?;

        let version = self.inner.data_version()?;
        let delivery = Arc::new(Delivery::new(Arc::clone(&self.inner), callback));

        let listener = {
            let delivery = Arc::clone(&delivery);
            Arc::new(move || {
                if let Err(e) = delivery.deliver(false) {
                    error!(error = %e, key = %delivery.inner.key, "failed to reload local records");
                }
            })
        };
        let listener_id = self.inner.signal.listen(listener);

        if let Err(e) = delivery.deliver(false) {
            self.inner.signal.remove(listener_id);
            return Err(e);
        }

        let watcher = runtime.spawn(watch_other_connections(delivery, version));

        let signal = self.inner.signal.clone();
        Ok(Subscription::new(move || {
            signal.remove(listener_id);
            watcher.abort();
        }))
    }

    async fn add(&self, record: Record) -> Result<()> {
        let mut records = self.inner.read_current()?;
        debug!(id = %record.id, "adding record to local store");
        records.insert(0, record);
        self.inner.write_all(&records)?;
        self.inner.signal.emit();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut records = self.inner.read_current()?;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            debug!(id, "delete of unknown id, nothing removed");
        }
        self.inner.write_all(&records)?;
        self.inner.signal.emit();
        Ok(())
    }
}
