//! The handle given to a running compute
//!
//! A `FunctionInterface` is scoped to exactly one key evaluation. It
//! mediates child requests (enforcing the declared-dependency discipline
//! and the cycle-rejecting graph), action dispatch, and entitled resource
//! lookups, while recording every cache path the computation consulted.

use std::collections::BTreeSet;

use parking_lot::Mutex;

use crate::action::{Action, ActionResult};
use crate::context::Context;
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::events::EngineEvent;
use crate::fingerprint::Fingerprint;
use crate::function_cache::CacheProps;
use crate::graph::KeyHandle;
use crate::key::{BuildKey, KeyDescriptor};
use crate::resource::{Resource, ResourceKey};

/// Mediates everything a compute may ask of the engine.
pub struct FunctionInterface {
    engine: Engine,
    origin: Fingerprint,
    origin_handle: KeyHandle,
    origin_name: &'static str,
    allowed_children: BTreeSet<&'static str>,
    allowed_actions: BTreeSet<&'static str>,
    entitlements: Vec<ResourceKey>,
    requested: Mutex<BTreeSet<String>>,
}

impl FunctionInterface {
    pub(crate) fn for_key<K: BuildKey>(
        engine: Engine,
        origin: Fingerprint,
        origin_handle: KeyHandle,
    ) -> Self {
        Self {
            engine,
            origin,
            origin_handle,
            origin_name: K::name(),
            allowed_children: KeyDescriptor::of::<K>().permitted_request_names(),
            allowed_actions: K::action_dependencies().into_iter().collect(),
            entitlements: K::resource_entitlements(),
            requested: Mutex::new(BTreeSet::new()),
        }
    }

    /// Evaluate a child key and return its value.
    ///
    /// The child's type must be declared in the origin's version
    /// dependencies (or be the origin's own type). The dependency edge is
    /// registered before dispatch and released after the child resolves,
    /// win or lose.
    pub async fn request<C: BuildKey>(&self, child: C, ctx: &Context) -> Result<C::Value> {
        self.request_with(child, ctx, false).await
    }

    /// Like [`request`](Self::request), but fails instead of computing when
    /// the child has no function-cache entry.
    pub async fn request_cached<C: BuildKey>(&self, child: C, ctx: &Context) -> Result<C::Value> {
        self.request_with(child, ctx, true).await
    }

    async fn request_with<C: BuildKey>(
        &self,
        child: C,
        ctx: &Context,
        require_cache_hit: bool,
    ) -> Result<C::Value> {
        if !self.allowed_children.contains(C::name()) {
            return Err(EngineError::UnexpressedKeyDependency {
                from: self.origin_name.to_string(),
                to: C::name().to_string(),
            });
        }

        let path = self.engine.cache_path(&child, ctx)?;
        self.requested.lock().insert(path.path.clone());

        if require_cache_hit {
            let props = CacheProps {
                cache_path: path.path.clone(),
                volatile: C::volatile(),
            };
            let cached = self
                .engine
                .inner
                .function_cache
                .get(path.fingerprint, &props, ctx)
                .await?;
            if cached.is_none() {
                return Err(EngineError::MissingRequiredCacheEntry(path.path));
            }
        }

        let child_fp = path.fingerprint;
        let child_handle = KeyHandle::new(C::name(), path.path.clone());
        self.engine.inner.graph.add_edge(
            self.origin,
            self.origin_handle.clone(),
            child_fp,
            child_handle,
        )?;

        let result = self.engine.build_at_path(child, path, ctx).await;
        self.engine.inner.graph.remove_edge(self.origin, child_fp);
        result
    }

    /// Dispatch an action through the engine's executor.
    ///
    /// The action's type must be declared in the origin's action
    /// dependencies.
    pub async fn spawn(&self, action: &Action, ctx: &Context) -> Result<ActionResult> {
        if !self.allowed_actions.contains(action.action_type.as_str()) {
            return Err(EngineError::UnexpressedKeyDependency {
                from: self.origin_name.to_string(),
                to: action.action_type.clone(),
            });
        }
        self.engine.emit(EngineEvent::ActionSpawned {
            action_type: action.action_type.clone(),
        });
        let result = self.engine.inner.executor.perform(action, ctx).await;
        self.engine.emit(EngineEvent::ActionFinished {
            action_type: action.action_type.clone(),
            exit_code: result.as_ref().ok().map(|r| r.exit_code),
        });
        result
    }

    /// Look up an entitled resource.
    pub fn resource(&self, key: &ResourceKey) -> Result<Resource> {
        if !self.entitlements.contains(key) {
            return Err(EngineError::ResourceNotFound(key.to_string()));
        }
        self.engine
            .inner
            .resources
            .get(key)
            .ok_or_else(|| EngineError::ResourceNotFound(key.to_string()))
    }

    /// Sorted snapshot of every cache path this computation requested.
    pub fn requested_cache_key_paths(&self) -> Vec<String> {
        self.requested.lock().iter().cloned().collect()
    }
}
