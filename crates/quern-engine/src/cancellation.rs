//! Cancellation fan-out
//!
//! Child-producing operations register a callback before starting work and
//! deregister when done; cancelling the registry invokes every callback, so
//! a parent cancellation reaches live subprocesses and detached task
//! contexts alike. Registrations made after cancellation fire immediately.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use uuid::Uuid;

type Callback = Box<dyn Fn() + Send + Sync>;

/// Uuid-keyed registry of cancellation callbacks.
#[derive(Default)]
pub struct CancellationRegistry {
    callbacks: Mutex<HashMap<Uuid, Callback>>,
    cancelled: AtomicBool,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback, returning its token. If the registry is already
    /// cancelled the callback runs immediately and is not retained.
    pub fn register(&self, callback: impl Fn() + Send + Sync + 'static) -> Uuid {
        let id = Uuid::new_v4();
        if self.cancelled.load(Ordering::SeqCst) {
            callback();
            return id;
        }
        self.callbacks.lock().insert(id, Box::new(callback));
        // A cancel may have raced the insert; sweep if so.
        if self.cancelled.load(Ordering::SeqCst) {
            self.cancel_all();
        }
        id
    }

    /// Remove a callback without invoking it.
    pub fn deregister(&self, id: Uuid) {
        self.callbacks.lock().remove(&id);
    }

    /// Invoke and remove a single callback.
    pub fn cancel(&self, id: Uuid) {
        let callback = self.callbacks.lock().remove(&id);
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Invoke and remove every callback; the registry stays cancelled.
    pub fn cancel_all(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // Invoke outside the lock; callbacks may take their time.
        let drained: Vec<Callback> = {
            let mut callbacks = self.callbacks.lock();
            callbacks.drain().map(|(_, cb)| cb).collect()
        };
        for callback in drained {
            callback();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.lock().is_empty()
    }
}
