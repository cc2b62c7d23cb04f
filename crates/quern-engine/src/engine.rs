//! Top-level evaluation coordinator
//!
//! The engine owns the store client, the function cache, the in-flight
//! deduplicator, the dependency graph, the action executor, and the
//! resource table, and exposes one operation: `build(key) → value`. It is a
//! cheap handle; clones share all state, and every evaluation spawned from
//! a `compute` recurses through the same engine.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::FutureExt;
use quern_cas::{CasClient, InMemoryCas};
use uuid::Uuid;

use crate::action::{ActionExecutor, UnconfiguredExecutor};
use crate::context::Context;
use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventSink, NullEventSink};
use crate::fingerprint::{self, CachePath};
use crate::function;
use crate::function_cache::{FunctionCache, InMemoryFunctionCache};
use crate::graph::KeyDependencyGraph;
use crate::key::BuildKey;
use crate::pending::{ErasedValue, PendingResults};
use crate::resource::ResourceRegistry;

pub(crate) struct EngineInner {
    pub(crate) cas: Arc<dyn CasClient>,
    pub(crate) function_cache: Arc<dyn FunctionCache>,
    pub(crate) pending: PendingResults,
    pub(crate) graph: KeyDependencyGraph,
    pub(crate) executor: Arc<dyn ActionExecutor>,
    pub(crate) resources: Arc<ResourceRegistry>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) build_id: Uuid,
    pub(crate) request_only_caching: bool,
}

/// The evaluation engine. Clones share all state.
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Arc<EngineInner>,
}

impl Engine {
    /// Start building an engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Unique id of this engine instance; stamped into every context and,
    /// under request-only caching, into every cache path.
    pub fn build_id(&self) -> Uuid {
        self.inner.build_id
    }

    /// The store client this engine reads and writes.
    pub fn cas(&self) -> Arc<dyn CasClient> {
        Arc::clone(&self.inner.cas)
    }

    /// The function cache this engine consults.
    pub fn function_cache(&self) -> Arc<dyn FunctionCache> {
        Arc::clone(&self.inner.function_cache)
    }

    /// The resource table backing entitlement lookups and fingerprints.
    pub fn resources(&self) -> Arc<ResourceRegistry> {
        Arc::clone(&self.inner.resources)
    }

    /// Cache path and fingerprint for a key under this engine's settings.
    pub fn cache_path<K: BuildKey>(&self, key: &K, ctx: &Context) -> Result<CachePath> {
        let scope = self
            .inner
            .request_only_caching
            .then_some(self.inner.build_id);
        fingerprint::cache_path_for_key(key, ctx, &self.inner.resources, scope)
    }

    /// Evaluate a key to its value.
    ///
    /// Concurrent builds of fingerprint-equal keys coalesce onto one
    /// evaluation; completed results are served without re-entering the
    /// evaluator.
    pub async fn build<K: BuildKey>(&self, key: K, ctx: &Context) -> Result<K::Value> {
        let ctx = ctx.for_build(self.inner.build_id);
        let path = self.cache_path(&key, &ctx)?;
        self.build_at_path(key, path, &ctx).await
    }

    pub(crate) async fn build_at_path<K: BuildKey>(
        &self,
        key: K,
        path: CachePath,
        ctx: &Context,
    ) -> Result<K::Value> {
        self.emit(EngineEvent::BuildStarted {
            cache_path: path.path.clone(),
            build_id: self.inner.build_id.to_string(),
        });

        let display_path = path.path.clone();
        let fingerprint = path.fingerprint;
        let engine = self.clone();
        let key = Arc::new(key);
        let eval_ctx = ctx.clone();

        let shared = self.inner.pending.value_for(fingerprint, move || {
            async move {
                function::evaluate::<K>(engine, key, path, eval_ctx)
                    .await
                    .map(|value| Arc::new(value) as ErasedValue)
            }
            .boxed()
        });

        match shared.await {
            Ok(erased) => {
                let value = erased
                    .downcast::<K::Value>()
                    .map_err(|_| EngineError::InvalidValueType(K::name().to_string()))?;
                self.emit(EngineEvent::BuildFinished {
                    cache_path: display_path,
                });
                Ok(value.as_ref().clone())
            }
            Err(err) => {
                self.emit(EngineEvent::BuildFailed {
                    cache_path: display_path,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        if let Err(err) = self.inner.events.send(event) {
            log::warn!("dropping engine event: {}", err);
        }
    }
}

/// Fluent construction for [`Engine`].
///
/// Defaults: in-memory store and function cache, no action executor, no
/// event sink, a fresh resource table, cross-build caching, and unbounded
/// retention of completed deduplication entries.
pub struct EngineBuilder {
    cas: Option<Arc<dyn CasClient>>,
    function_cache: Option<Arc<dyn FunctionCache>>,
    executor: Option<Arc<dyn ActionExecutor>>,
    events: Option<Arc<dyn EventSink>>,
    resources: Option<Arc<ResourceRegistry>>,
    request_only_caching: bool,
    partial_result_expiration: Option<Duration>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            cas: None,
            function_cache: None,
            executor: None,
            events: None,
            resources: None,
            request_only_caching: false,
            partial_result_expiration: None,
        }
    }

    pub fn with_cas(mut self, cas: Arc<dyn CasClient>) -> Self {
        self.cas = Some(cas);
        self
    }

    pub fn with_function_cache(mut self, cache: Arc<dyn FunctionCache>) -> Self {
        self.function_cache = Some(cache);
        self
    }

    pub fn with_action_executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_resources(mut self, resources: Arc<ResourceRegistry>) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Scope every cache path to this engine's build id. Entries written
    /// under one top-level build then never satisfy another.
    pub fn request_only_caching(mut self, enabled: bool) -> Self {
        self.request_only_caching = enabled;
        self
    }

    /// Evict completed deduplication entries this long after they resolve.
    pub fn partial_result_expiration(mut self, interval: Duration) -> Self {
        self.partial_result_expiration = Some(interval);
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            inner: Arc::new(EngineInner {
                cas: self.cas.unwrap_or_else(|| Arc::new(InMemoryCas::new())),
                function_cache: self
                    .function_cache
                    .unwrap_or_else(|| Arc::new(InMemoryFunctionCache::new())),
                pending: PendingResults::new(self.partial_result_expiration),
                graph: KeyDependencyGraph::new(),
                executor: self
                    .executor
                    .unwrap_or_else(|| Arc::new(UnconfiguredExecutor)),
                events: self.events.unwrap_or_else(|| Arc::new(NullEventSink)),
                resources: self
                    .resources
                    .unwrap_or_else(|| Arc::new(ResourceRegistry::new())),
                build_id: Uuid::new_v4(),
                request_only_caching: self.request_only_caching,
            }),
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
