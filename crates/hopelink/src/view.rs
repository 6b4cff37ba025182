//! Session, screen and record-set state of one interactive client.
//!
//! [`ViewState`] is the composition root of the application: it owns the
//! store handle and the single subscription, keeps the latest snapshot and
//! derives the visible set from the logged-in session on every read.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::auth::{Authenticator, LoginRequest, Session};
use crate::error::{Error, Result};
use crate::form::FormAssembler;
use crate::record::Record;
use crate::sequence;
use crate::store::{RecordStore, Subscription};

/// The screen being shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Screen {
    /// Aggregate figures.
    #[default]
    Dashboard,
    /// New registration form.
    Register,
    /// Searchable table.
    List,
}

type Snapshot = Arc<Mutex<Option<Vec<Record>>>>;

/// Client state on top of a [`RecordStore`].
#[derive(Debug)]
pub struct ViewState {
    store: RecordStore,
    auth: Authenticator,
    session: Option<Session>,
    screen: Screen,
    records: Snapshot,
    updates: Arc<watch::Sender<u64>>,
    subscription: Option<Subscription>,
}

impl ViewState {
    /// Create the state; nothing is subscribed until [`ViewState::attach`].
    #[must_use]
    pub fn new(store: RecordStore, auth: Authenticator) -> Self {
        let (updates, _) = watch::channel(0);
        Self {
            store,
            auth,
            session: None,
            screen: Screen::Dashboard,
            records: Arc::new(Mutex::new(None)),
            updates: Arc::new(updates),
            subscription: None,
        }
    }

    /// Subscribe to the store. Calling it again while attached does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the subscription.
    pub fn attach(&mut self) -> Result<()> {
        if self.subscription.is_some() {
            return Ok(());
        }

        let records = Arc::clone(&self.records);
        let updates = Arc::clone(&self.updates);
        let subscription = self.store.subscribe(move |snapshot| {
            debug!(count = snapshot.len(), "snapshot received");
            *records.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
            updates.send_modify(|n| *n = n.wrapping_add(1));
        })?;
        self.subscription = Some(subscription);
        Ok(())
    }

    /// Drop the subscription. The last snapshot is kept.
    pub fn detach(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    /// Wait until at least one snapshot has arrived.
    ///
    /// # Errors
    ///
    /// Returns an error if the state is not attached.
    pub async fn ready(&self) -> Result<()> {
        if self.subscription.is_none() {
            return Err(Error::internal("view state is not attached to the store"));
        }
        let mut updates = self.updates.subscribe();
        updates
            .wait_for(|n| *n > 0)
            .await
            .map_err(|_| Error::internal("update channel closed"))?;
        Ok(())
    }

    /// A receiver bumped on every delivered snapshot.
    #[must_use]
    pub fn updates(&self) -> watch::Receiver<u64> {
        self.updates.subscribe()
    }

    /// Log in and return to the dashboard.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] on bad credentials; any previous
    /// session is kept in that case.
    pub fn login(&mut self, request: &LoginRequest) -> Result<&Session> {
        let session = self.auth.login(request)?;
        info!(user = %session.name, "session started");
        self.screen = Screen::Dashboard;
        Ok(&*self.session.insert(session))
    }

    /// Clear the session.
    pub fn logout(&mut self) {
        if let Some(session) = self.session.take() {
            info!(user = %session.name, "session ended");
        }
    }

    /// The current session.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// The screen being shown.
    #[must_use]
    pub fn screen(&self) -> Screen {
        self.screen
    }

    /// Switch screens.
    pub fn select_screen(&mut self, screen: Screen) {
        self.screen = screen;
    }

    /// Latest snapshot, unfiltered.
    #[must_use]
    pub fn all_records(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_default()
    }

    /// Latest snapshot filtered by the session. Empty without a session.
    #[must_use]
    pub fn visible_records(&self) -> Vec<Record> {
        let Some(session) = &self.session else {
            return Vec::new();
        };
        let mut records = self.all_records();
        records.retain(|r| session.can_see(r));
        records
    }

    /// Next sequence number within the visible set.
    #[must_use]
    pub fn next_sequence(&self) -> i64 {
        sequence::next_sequence(&self.visible_records())
    }

    /// Whether the store is the cloud backend.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.store.is_live_mode()
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Center names available at login and registration.
    #[must_use]
    pub fn centers(&self) -> Vec<String> {
        self.auth.centers().map(str::to_string).collect()
    }

    /// An assembler for the current session and visible set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSession`] if nobody is logged in.
    pub fn form_assembler(&self) -> Result<FormAssembler> {
        let session = self.session.as_ref().ok_or(Error::NoSession)?;
        Ok(FormAssembler::new(
            session,
            self.centers(),
            self.next_sequence(),
        ))
    }

    /// Persist a record and switch to the list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSession`] if nobody is logged in, or the store's
    /// error if the write fails; the screen is unchanged on failure.
    pub async fn add_record(&mut self, record: Record) -> Result<()> {
        if self.session.is_none() {
            return Err(Error::NoSession);
        }
        self.store.add(record).await?;
        self.screen = Screen::List;
        Ok(())
    }

    /// Delete a record by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSession`] if nobody is logged in, or the store's
    /// error if the delete fails.
    pub async fn delete_record(&self, id: &str) -> Result<()> {
        if self.session.is_none() {
            return Err(Error::NoSession);
        }
        self.store.delete(id).await
    }
}

impl Drop for ViewState {
    fn drop(&mut self) {
        self.detach();
    }
}
