//! Pluggable function-result cache
//!
//! Maps a key's fingerprint to the store id of its serialized value. The
//! default is an in-process map; deployments may shard by cache path, park
//! volatile keys separately, refuse writes, or expire entries. A `get`
//! returning `None` and a stale id pointing at a vanished store object are
//! treated identically by the engine: recompute.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use quern_cas::DataId;

use crate::context::Context;
use crate::error::Result;
use crate::fingerprint::Fingerprint;

/// Key properties exposed to cache implementations for partitioning.
#[derive(Debug, Clone)]
pub struct CacheProps {
    pub cache_path: String,
    pub volatile: bool,
}

/// Contract for function-result caches.
#[async_trait]
pub trait FunctionCache: Send + Sync {
    /// Look up the stored value id for a fingerprint.
    async fn get(
        &self,
        fingerprint: Fingerprint,
        props: &CacheProps,
        ctx: &Context,
    ) -> Result<Option<DataId>>;

    /// Record the stored value id for a fingerprint.
    async fn update(
        &self,
        fingerprint: Fingerprint,
        props: &CacheProps,
        value_id: DataId,
        ctx: &Context,
    ) -> Result<()>;
}

/// Default in-process cache: a mutex-guarded map.
#[derive(Default)]
pub struct InMemoryFunctionCache {
    entries: Mutex<HashMap<Fingerprint, DataId>>,
}

impl InMemoryFunctionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl FunctionCache for InMemoryFunctionCache {
    async fn get(
        &self,
        fingerprint: Fingerprint,
        _props: &CacheProps,
        _ctx: &Context,
    ) -> Result<Option<DataId>> {
        Ok(self.entries.lock().get(&fingerprint).cloned())
    }

    async fn update(
        &self,
        fingerprint: Fingerprint,
        props: &CacheProps,
        value_id: DataId,
        _ctx: &Context,
    ) -> Result<()> {
        log::trace!("function cache update: {} -> {}", props.cache_path, value_id);
        self.entries.lock().insert(fingerprint, value_id);
        Ok(())
    }
}
