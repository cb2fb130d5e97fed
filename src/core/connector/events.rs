//! Observer registration for connector events.
//!
//! Subscribers register explicitly and get a [`Subscription`] handle back;
//! zero subscribers is a defined no-op, not an error. Emission iterates a
//! snapshot of the registry, so a handler may unsubscribe (itself or others)
//! without deadlocking.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Which event a [`Subscription`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventKind {
    Message,
    Close,
}

/// Handle returned by `on_message`/`on_close`; pass to `unsubscribe` to stop
/// receiving the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub(crate) id: u64,
    pub(crate) kind: EventKind,
}

/// A set of subscribed handlers of one callback signature.
pub(crate) struct Handlers<F: ?Sized> {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Arc<F>)>>,
}

impl<F: ?Sized> Handlers<F> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self, handler: Arc<F>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, handler));
        id
    }

    /// Returns true if the id was still registered.
    pub(crate) fn unsubscribe(&self, id: u64) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Snapshot of the current handlers, in subscription order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<F>> {
        self.entries
            .lock()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect()
    }
}
