//! Listener registry with copy-on-write snapshots.
//!
//! Mutations replace the whole listener list; a dispatch pass clones the
//! current `Arc` and iterates that, so listeners may add or remove entries
//! (themselves included) from inside a callback without disturbing the pass
//! in progress. Changes made during a pass take effect on the next one.

use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::error;

/// Receives every non-empty read from the receive loop.
///
/// `bytes` borrows the loop's receive buffer and is only valid for the
/// duration of the call; copy what you need to keep. Callbacks run on the
/// receive thread, so a slow listener delays the next read.
pub trait ByteListener: Send + Sync {
    fn on_bytes(&self, bytes: &[u8]);
}

/// Identifies a registration, for [`ListenerRegistry::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

type Entry = (ListenerId, Arc<dyn ByteListener>);

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Listeners whose callback returned normally.
    pub notified: usize,
    /// Listeners whose callback panicked.
    pub panicked: usize,
}

#[derive(Default)]
struct RegistryInner {
    entries: RwLock<Arc<Vec<Entry>>>,
    next_id: AtomicU64,
}

/// Shared, thread-safe set of listeners.
///
/// Cloning yields another handle to the same set, which is how a listener
/// can hold on to the registry in order to unregister itself.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<RegistryInner>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener.
    pub fn add<L: ByteListener + 'static>(&self, listener: L) -> ListenerId {
        self.add_shared(Arc::new(listener))
    }

    /// Register a listener that the caller keeps a reference to.
    pub fn add_shared(&self, listener: Arc<dyn ByteListener>) -> ListenerId {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let mut entries = self.inner.entries.write();
        let mut next = Vec::with_capacity(entries.len() + 1);
        next.extend(entries.iter().cloned());
        next.push((id, listener));
        *entries = Arc::new(next);
        id
    }

    /// Unregister a listener. Returns `false` if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.inner.entries.write();
        if !entries.iter().any(|(entry_id, _)| *entry_id == id) {
            return false;
        }
        let next: Vec<Entry> = entries
            .iter()
            .filter(|(entry_id, _)| *entry_id != id)
            .cloned()
            .collect();
        *entries = Arc::new(next);
        true
    }

    /// Unregister every listener.
    pub fn clear(&self) {
        *self.inner.entries.write() = Arc::new(Vec::new());
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.inner
            .entries
            .read()
            .iter()
            .any(|(entry_id, _)| *entry_id == id)
    }

    fn snapshot(&self) -> Arc<Vec<Entry>> {
        Arc::clone(&self.inner.entries.read())
    }

    /// Notify every listener registered when the pass starts.
    ///
    /// A panicking listener is logged and skipped; the rest of the pass
    /// still runs.
    pub fn dispatch(&self, bytes: &[u8]) -> DispatchOutcome {
        let snapshot = self.snapshot();
        let mut outcome = DispatchOutcome::default();

        for (id, listener) in snapshot.iter() {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_bytes(bytes))) {
                Ok(()) => outcome.notified += 1,
                Err(payload) => {
                    outcome.panicked += 1;
                    error!(
                        listener = %id,
                        reason = panic_message(payload.as_ref()),
                        "listener panicked, continuing dispatch"
                    );
                }
            }
        }

        outcome
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}
