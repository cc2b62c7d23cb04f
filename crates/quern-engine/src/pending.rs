//! Per-process request deduplication
//!
//! The first request for a fingerprint installs a shared future; concurrent
//! duplicates await the same future, so a key's compute runs at most once
//! per process no matter how many callers race on it. Completed entries are
//! retained (later callers reuse the result without re-entering the
//! evaluator) unless an expiration interval is configured, in which case
//! each entry is evicted that long after it completes.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::error::Result;
use crate::fingerprint::Fingerprint;

/// Type-erased evaluation result shared between awaiters.
pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;

type PendingFuture = Shared<BoxFuture<'static, Result<ErasedValue>>>;

pub(crate) struct PendingResults {
    entries: Arc<Mutex<HashMap<Fingerprint, PendingFuture>>>,
    expiration: Option<Duration>,
}

impl PendingResults {
    pub fn new(expiration: Option<Duration>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            expiration,
        }
    }

    /// Return the future for `fingerprint`, installing one from `factory`
    /// if none is in flight. Install-or-reuse is atomic; the factory future
    /// is driven by whichever awaiter polls first.
    pub fn value_for<F>(&self, fingerprint: Fingerprint, factory: F) -> PendingFuture
    where
        F: FnOnce() -> BoxFuture<'static, Result<ErasedValue>>,
    {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&fingerprint) {
            return existing.clone();
        }

        let shared = factory().shared();
        entries.insert(fingerprint, shared.clone());

        if let Some(ttl) = self.expiration {
            let entries = Arc::clone(&self.entries);
            let watched = shared.clone();
            tokio::spawn(async move {
                let _ = watched.await;
                tokio::time::sleep(ttl).await;
                entries.lock().remove(&fingerprint);
            });
        }

        shared
    }

    /// Number of retained entries (in flight or completed).
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
