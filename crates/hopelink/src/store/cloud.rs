//! Cloud backend over a remote document collection.
//!
//! The collection itself ([`DocumentCollection`]) only knows how to list,
//! create and delete documents. This module turns that into live snapshots:
//! every subscription owns one listener task that re-lists the collection on
//! a poll interval, and right away after any write made through this backend,
//! and delivers the result whenever its digest changed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{RecordBackend, SnapshotCallback, Subscription};
use crate::error::{Error, Result};
use crate::record::{Record, CREATED_AT};

/// A remote collection of documents ordered by server creation time.
#[async_trait]
pub trait DocumentCollection: Send + Sync + fmt::Debug + 'static {
    /// All documents, newest-first by server creation time.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing request fails.
    async fn list_newest_first(&self) -> Result<Vec<Record>>;

    /// Create a document; the store stamps the creation time. Returns the
    /// new document id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    async fn create(&self, fields: Map<String, Value>) -> Result<String>;

    /// Delete a document by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the delete.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Record backend on top of a [`DocumentCollection`].
#[derive(Debug)]
pub struct CloudBackend<C> {
    collection: Arc<C>,
    poll_interval: Duration,
    writes: watch::Sender<u64>,
}

impl<C: DocumentCollection> CloudBackend<C> {
    /// Create a backend polling `collection` every `poll_interval`.
    #[must_use]
    pub fn new(collection: C, poll_interval: Duration) -> Self {
        let (writes, _) = watch::channel(0);
        Self {
            collection: Arc::new(collection),
            poll_interval,
            writes,
        }
    }

    /// The underlying collection.
    #[must_use]
    pub fn collection(&self) -> &C {
        &self.collection
    }

    fn wrote(&self) {
        self.writes.send_modify(|n| *n = n.wrapping_add(1));
    }
}

fn snapshot_digest(records: &[Record]) -> Option<blake3::Hash> {
    serde_json::to_vec(records)
        .ok()
        .map(|bytes| blake3::hash(&bytes))
}

async fn listen<C: DocumentCollection>(
    collection: Arc<C>,
    callback: SnapshotCallback,
    mut writes: watch::Receiver<u64>,
    poll_interval: Duration,
) {
    let mut delivered: Option<Option<blake3::Hash>> = None;

    loop {
        match collection.list_newest_first().await {
            Ok(records) => {
                let digest = snapshot_digest(&records);
                // An undigestable snapshot is always delivered
                if digest.is_none() || delivered != Some(digest) {
                    delivered = Some(digest);
                    debug!(count = records.len(), "delivering cloud snapshot");
                    callback(records);
                }
            }
            Err(e) => warn!(error = %e, "cloud snapshot refresh failed"),
        }

        tokio::select! {
            () = tokio::time::sleep(poll_interval) => {}
            changed = writes.changed() => {
                if changed.is_err() {
                    debug!("cloud backend dropped, stopping listener");
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl<C: DocumentCollection> RecordBackend for CloudBackend<C> {
    fn name(&self) -> &'static str {
        "cloud"
    }

    fn is_live(&self) -> bool {
        true
    }

    fn subscribe(&self, callback: SnapshotCallback) -> Result<Subscription> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| Error::internal("subscribe must be called within a Tokio runtime"))?;

        let writes = self.writes.subscribe();
        let task = runtime.spawn(listen(
            Arc::clone(&self.collection),
            callback,
            writes,
            self.poll_interval,
        ));

        Ok(Subscription::new(move || task.abort()))
    }

    async fn add(&self, record: Record) -> Result<()> {
        let Record { id: _, mut fields } = record;
        fields.remove(CREATED_AT);

        let id = self.collection.create(fields).await?;
        debug!(%id, "record created in cloud collection");
        self.wrote();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.collection.delete(id).await?;
        debug!(id, "record deleted from cloud collection");
        self.wrote();
        Ok(())
    }
}
