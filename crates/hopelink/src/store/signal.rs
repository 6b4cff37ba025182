//! In-process change notification for the local backend.
//!
//! The cross-connection watcher never fires for writes made through the same
//! connection, so every local write also raises this signal synchronously.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// A registered listener.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Identifies one registration so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Listener)>,
}

/// Observer list shared by all clones of a local backend handle.
#[derive(Clone, Default)]
pub struct LocalSignal {
    inner: Arc<Mutex<Listeners>>,
}

impl LocalSignal {
    /// Create a signal with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn listen(&self, listener: Listener) -> ListenerId {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = ListenerId(guard.next_id);
        guard.next_id += 1;
        guard.entries.push((id, listener));
        id
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = guard.entries.len();
        guard.entries.retain(|(entry_id, _)| *entry_id != id);
        guard.entries.len() != before
    }

    /// Invoke every listener in registration order.
    ///
    /// The list is copied out first, so listeners may register or remove
    /// listeners themselves. Returns how many were called.
    pub fn emit(&self) -> usize {
        let listeners: Vec<Listener> = {
            let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            guard.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in &listeners {
            listener();
        }
        listeners.len()
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }
}

impl fmt::Debug for LocalSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSignal")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, Listener) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (
            count,
            Arc::new(move || {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_emit_reaches_all_listeners() {
        let signal = LocalSignal::new();
        let (a, la) = counter();
        let (b, lb) = counter();
        signal.listen(la);
        signal.listen(lb);

        assert_eq!(signal.emit(), 2);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_detaches_only_that_listener() {
        let signal = LocalSignal::new();
        let (a, la) = counter();
        let (b, lb) = counter();
        let id_a = signal.listen(la);
        signal.listen(lb);

        assert!(signal.remove(id_a));
        assert!(!signal.remove(id_a));
        signal.emit();

        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);
        assert_eq!(signal.listener_count(), 1);
    }

    #[test]
    fn test_listener_may_remove_itself() {
        let signal = LocalSignal::new();
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let inner_signal = signal.clone();
        let inner_slot = Arc::clone(&slot);
        let id = signal.listen(Arc::new(move || {
            if let Some(id) = inner_slot.lock().unwrap().take() {
                inner_signal.remove(id);
            }
        }));
        *slot.lock().unwrap() = Some(id);

        assert_eq!(signal.emit(), 1);
        assert_eq!(signal.listener_count(), 0);
    }
}
