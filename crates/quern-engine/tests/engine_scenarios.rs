//! End-to-end evaluation scenarios against in-memory stores.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use quern_engine::{
    encode_value, BuildKey, BuildValue, CacheProps, CasClient, CasObject, ConfigPattern, Context,
    DataId, Engine, EngineError, EngineEvent, Extensions, Fingerprint, FunctionCache,
    FunctionInterface, InMemoryCas, InMemoryFunctionCache, KeyDescriptor, Resource, ResourceKey,
    ResourceLifetime, ResourceRegistry, Result, VecEventSink,
};

// ---------------------------------------------------------------------------
// Test plumbing
// ---------------------------------------------------------------------------

/// Counts compute invocations per key type, injected through the context.
#[derive(Default)]
struct ComputeProbe {
    counts: Mutex<HashMap<String, usize>>,
}

impl ComputeProbe {
    fn bump(&self, name: &str) {
        *self.counts.lock().entry(name.to_string()).or_insert(0) += 1;
    }

    fn count(&self, name: &str) -> usize {
        self.counts.lock().get(name).copied().unwrap_or(0)
    }
}

fn probe_context(probe: &Arc<ComputeProbe>) -> Context {
    let mut extensions = Extensions::new();
    extensions.set("compute_probe", Arc::clone(probe));
    Context::new().with_extensions(extensions)
}

fn bump(ctx: &Context, name: &str) {
    if let Some(probe) = ctx.extension::<Arc<ComputeProbe>>("compute_probe") {
        probe.bump(name);
    }
}

/// Store wrapper that counts writes.
struct CountingCas {
    inner: InMemoryCas,
    puts: AtomicUsize,
}

impl CountingCas {
    fn new() -> Self {
        Self {
            inner: InMemoryCas::new(),
            puts: AtomicUsize::new(0),
        }
    }

    fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CasClient for CountingCas {
    async fn put(&self, object: CasObject) -> quern_cas::Result<DataId> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(object).await
    }

    async fn get(&self, id: &DataId) -> quern_cas::Result<Option<CasObject>> {
        self.inner.get(id).await
    }
}

/// Function-cache wrapper that counts updates.
struct CountingFunctionCache {
    inner: InMemoryFunctionCache,
    updates: AtomicUsize,
}

impl CountingFunctionCache {
    fn new() -> Self {
        Self {
            inner: InMemoryFunctionCache::new(),
            updates: AtomicUsize::new(0),
        }
    }

    fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FunctionCache for CountingFunctionCache {
    async fn get(
        &self,
        fingerprint: Fingerprint,
        props: &CacheProps,
        ctx: &Context,
    ) -> Result<Option<DataId>> {
        self.inner.get(fingerprint, props, ctx).await
    }

    async fn update(
        &self,
        fingerprint: Fingerprint,
        props: &CacheProps,
        value_id: DataId,
        ctx: &Context,
    ) -> Result<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(fingerprint, props, value_id, ctx).await
    }
}

// ---------------------------------------------------------------------------
// Test keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TextValue {
    text: String,
}

impl BuildValue for TextValue {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct NumberValue {
    value: i64,
}

impl BuildValue for NumberValue {}

#[derive(Serialize, Deserialize)]
struct IdentityKey {
    payload: String,
}

#[async_trait]
impl BuildKey for IdentityKey {
    type Value = TextValue;

    fn name() -> &'static str {
        "identity"
    }

    async fn compute(&self, _fi: &FunctionInterface, ctx: &Context) -> Result<TextValue> {
        bump(ctx, Self::name());
        Ok(TextValue {
            text: self.payload.clone(),
        })
    }
}

#[derive(Serialize, Deserialize)]
struct SumKey {
    a: i64,
    b: i64,
}

#[async_trait]
impl BuildKey for SumKey {
    type Value = NumberValue;

    fn name() -> &'static str {
        "sum"
    }

    async fn compute(&self, _fi: &FunctionInterface, ctx: &Context) -> Result<NumberValue> {
        bump(ctx, Self::name());
        Ok(NumberValue {
            value: self.a + self.b,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct DoubleKey {
    a: i64,
    b: i64,
}

#[async_trait]
impl BuildKey for DoubleKey {
    type Value = NumberValue;

    fn name() -> &'static str {
        "double"
    }

    fn version_dependencies() -> Vec<KeyDescriptor> {
        vec![KeyDescriptor::of::<SumKey>()]
    }

    async fn compute(&self, fi: &FunctionInterface, ctx: &Context) -> Result<NumberValue> {
        bump(ctx, Self::name());
        let sum = fi.request(SumKey { a: self.a, b: self.b }, ctx).await?;
        Ok(NumberValue {
            value: sum.value * 2,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct CycleAKey;

#[derive(Serialize, Deserialize)]
struct CycleBKey;

#[async_trait]
impl BuildKey for CycleAKey {
    type Value = TextValue;

    fn name() -> &'static str {
        "cycle-a"
    }

    fn version_dependencies() -> Vec<KeyDescriptor> {
        vec![KeyDescriptor::of::<CycleBKey>()]
    }

    async fn compute(&self, fi: &FunctionInterface, ctx: &Context) -> Result<TextValue> {
        fi.request(CycleBKey, ctx).await
    }
}

#[async_trait]
impl BuildKey for CycleBKey {
    type Value = TextValue;

    fn name() -> &'static str {
        "cycle-b"
    }

    fn version_dependencies() -> Vec<KeyDescriptor> {
        vec![KeyDescriptor::of::<CycleAKey>()]
    }

    async fn compute(&self, fi: &FunctionInterface, ctx: &Context) -> Result<TextValue> {
        fi.request(CycleAKey, ctx).await
    }
}

#[derive(Serialize, Deserialize)]
struct CompileKey {
    src: String,
}

#[async_trait]
impl BuildKey for CompileKey {
    type Value = TextValue;

    fn name() -> &'static str {
        "compile"
    }

    fn configuration_keys() -> Vec<ConfigPattern> {
        vec![ConfigPattern::literal("opt")]
    }

    async fn compute(&self, _fi: &FunctionInterface, ctx: &Context) -> Result<TextValue> {
        bump(ctx, Self::name());
        let opt = ctx
            .config_value("opt")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        Ok(TextValue {
            text: format!("{}@O{}", self.src, opt),
        })
    }
}

#[derive(Serialize, Deserialize)]
struct SlowKey {
    tag: String,
}

#[async_trait]
impl BuildKey for SlowKey {
    type Value = TextValue;

    fn name() -> &'static str {
        "slow"
    }

    async fn compute(&self, _fi: &FunctionInterface, ctx: &Context) -> Result<TextValue> {
        bump(ctx, Self::name());
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(TextValue {
            text: self.tag.clone(),
        })
    }
}

/// Requests a child it never declared.
#[derive(Serialize, Deserialize)]
struct OrphanKey;

#[async_trait]
impl BuildKey for OrphanKey {
    type Value = NumberValue;

    fn name() -> &'static str {
        "orphan"
    }

    async fn compute(&self, fi: &FunctionInterface, ctx: &Context) -> Result<NumberValue> {
        fi.request(SumKey { a: 1, b: 1 }, ctx).await
    }
}

/// Requires its child to already be cached.
#[derive(Serialize, Deserialize)]
struct PinnedKey {
    a: i64,
    b: i64,
}

#[async_trait]
impl BuildKey for PinnedKey {
    type Value = NumberValue;

    fn name() -> &'static str {
        "pinned"
    }

    fn version_dependencies() -> Vec<KeyDescriptor> {
        vec![KeyDescriptor::of::<SumKey>()]
    }

    async fn compute(&self, fi: &FunctionInterface, ctx: &Context) -> Result<NumberValue> {
        fi.request_cached(SumKey { a: self.a, b: self.b }, ctx).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FormatValue {
    format: u32,
}

impl BuildValue for FormatValue {}

/// Repairs stale cached values in place.
#[derive(Serialize, Deserialize)]
struct FixingKey;

#[async_trait]
impl BuildKey for FixingKey {
    type Value = FormatValue;

    fn name() -> &'static str {
        "fixing"
    }

    async fn compute(&self, _fi: &FunctionInterface, ctx: &Context) -> Result<FormatValue> {
        bump(ctx, Self::name());
        Ok(FormatValue { format: 2 })
    }

    fn validate_cached(&self, value: &FormatValue) -> bool {
        value.format == 2
    }

    async fn fix_cached(
        &self,
        value: FormatValue,
        _fi: &FunctionInterface,
        _ctx: &Context,
    ) -> Result<Option<FormatValue>> {
        Ok(Some(FormatValue {
            format: value.format.max(2),
        }))
    }
}

/// Rejects stale cached values and refuses to surface them.
#[derive(Serialize, Deserialize)]
struct StrictKey;

#[async_trait]
impl BuildKey for StrictKey {
    type Value = FormatValue;

    fn name() -> &'static str {
        "strict"
    }

    async fn compute(&self, _fi: &FunctionInterface, ctx: &Context) -> Result<FormatValue> {
        bump(ctx, Self::name());
        Ok(FormatValue { format: 2 })
    }

    fn validate_cached(&self, value: &FormatValue) -> bool {
        value.format == 2
    }
}

/// Recomputes whenever the cached entry is unusable.
#[derive(Serialize, Deserialize)]
struct RetryingKey;

#[async_trait]
impl BuildKey for RetryingKey {
    type Value = FormatValue;

    fn name() -> &'static str {
        "retrying"
    }

    fn recompute_on_cache_failure() -> bool {
        true
    }

    async fn compute(&self, _fi: &FunctionInterface, ctx: &Context) -> Result<FormatValue> {
        bump(ctx, Self::name());
        Ok(FormatValue { format: 2 })
    }

    fn validate_cached(&self, value: &FormatValue) -> bool {
        value.format == 2
    }
}

#[derive(Serialize, Deserialize)]
struct ToolchainKey;

#[async_trait]
impl BuildKey for ToolchainKey {
    type Value = NumberValue;

    fn name() -> &'static str {
        "toolchain-probe"
    }

    fn resource_entitlements() -> Vec<ResourceKey> {
        vec![ResourceKey::external("toolchain")]
    }

    async fn compute(&self, fi: &FunctionInterface, _ctx: &Context) -> Result<NumberValue> {
        let toolchain = fi.resource(&ResourceKey::external("toolchain"))?;
        // Reaching for an unentitled resource must fail.
        assert!(fi.resource(&ResourceKey::external("gpu")).is_err());
        Ok(NumberValue {
            value: toolchain.version.unwrap_or(-1),
        })
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_identity_compute_and_cache_round_trip() {
    let cas = Arc::new(CountingCas::new());
    let cache = Arc::new(CountingFunctionCache::new());
    let probe = Arc::new(ComputeProbe::default());
    let ctx = probe_context(&probe);

    let engine = Engine::builder()
        .with_cas(cas.clone())
        .with_function_cache(cache.clone())
        .build();
    let value = engine
        .build(IdentityKey { payload: "hello".into() }, &ctx)
        .await
        .unwrap();
    assert_eq!(value.text, "hello");
    assert_eq!(cas.put_count(), 1);
    assert_eq!(cache.update_count(), 1);
    assert_eq!(probe.count("identity"), 1);

    // A second engine over the same stores serves the value without
    // computing or writing anything.
    let second = Engine::builder()
        .with_cas(cas.clone())
        .with_function_cache(cache.clone())
        .build();
    let cached = second
        .build(IdentityKey { payload: "hello".into() }, &ctx)
        .await
        .unwrap();
    assert_eq!(cached, value);
    assert_eq!(cas.put_count(), 1);
    assert_eq!(cache.update_count(), 1);
    assert_eq!(probe.count("identity"), 1);
}

#[tokio::test]
async fn test_sum_and_double_share_the_cache() {
    let cas = Arc::new(InMemoryCas::new());
    let cache = Arc::new(InMemoryFunctionCache::new());
    let probe = Arc::new(ComputeProbe::default());
    let ctx = probe_context(&probe);

    let engine = Engine::builder()
        .with_cas(cas.clone())
        .with_function_cache(cache.clone())
        .build();
    let value = engine.build(DoubleKey { a: 2, b: 3 }, &ctx).await.unwrap();
    assert_eq!(value.value, 10);
    assert_eq!(probe.count("sum"), 1);
    assert_eq!(probe.count("double"), 1);

    let second = Engine::builder()
        .with_cas(cas)
        .with_function_cache(cache)
        .build();
    let cached = second.build(DoubleKey { a: 2, b: 3 }, &ctx).await.unwrap();
    assert_eq!(cached.value, 10);
    assert_eq!(probe.count("sum"), 1);
    assert_eq!(probe.count("double"), 1);
}

#[tokio::test]
async fn test_cycle_is_detected_and_reported() {
    let engine = Engine::builder().build();
    let err = engine.build(CycleAKey, &Context::new()).await.unwrap_err();
    let EngineError::CycleDetected(path) = err.root_cause() else {
        panic!("expected a cycle, got {err}");
    };
    assert!(path.iter().any(|p| p.contains("cycle-a")));
    assert!(path.iter().any(|p| p.contains("cycle-b")));
}

#[tokio::test]
async fn test_configuration_scoping_drives_cache_identity() {
    let cache = Arc::new(CountingFunctionCache::new());
    let probe = Arc::new(ComputeProbe::default());
    let engine = Engine::builder().with_function_cache(cache.clone()).build();

    let key = || CompileKey { src: "x".into() };
    let ctx0 = probe_context(&probe).with_configuration_input("opt", serde_json::json!(0));
    let ctx1 = probe_context(&probe).with_configuration_input("opt", serde_json::json!(1));

    let at0 = engine.build(key(), &ctx0).await.unwrap();
    let at1 = engine.build(key(), &ctx1).await.unwrap();
    assert_eq!(at0.text, "x@O0");
    assert_eq!(at1.text, "x@O1");
    assert_eq!(probe.count("compile"), 2);
    assert_eq!(cache.update_count(), 2);

    // An unrelated input reuses the opt=0 entry.
    let noisy = ctx0
        .clone()
        .with_configuration_input("unrelated", serde_json::json!(99));
    let reused = engine.build(key(), &noisy).await.unwrap();
    assert_eq!(reused.text, "x@O0");
    assert_eq!(probe.count("compile"), 2);
    assert_eq!(cache.update_count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hundred_concurrent_builds_compute_once() {
    let probe = Arc::new(ComputeProbe::default());
    let ctx = probe_context(&probe);
    let engine = Engine::builder().build();

    let mut handles = Vec::new();
    for _ in 0..100 {
        let engine = engine.clone();
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            engine.build(SlowKey { tag: "shared".into() }, &ctx).await
        }));
    }

    for handle in handles {
        let value = handle.await.unwrap().unwrap();
        assert_eq!(value.text, "shared");
    }
    assert_eq!(probe.count("slow"), 1);
}

#[tokio::test]
async fn test_missing_store_object_falls_through_to_recompute() {
    let cache = Arc::new(CountingFunctionCache::new());
    let probe = Arc::new(ComputeProbe::default());
    let ctx = probe_context(&probe);

    let first = Engine::builder().with_function_cache(cache.clone()).build();
    first
        .build(IdentityKey { payload: "v".into() }, &ctx)
        .await
        .unwrap();
    assert_eq!(probe.count("identity"), 1);

    // Same function cache, empty store: the recorded id points at nothing.
    let second = Engine::builder()
        .with_cas(Arc::new(InMemoryCas::new()))
        .with_function_cache(cache.clone())
        .build();
    let value = second
        .build(IdentityKey { payload: "v".into() }, &ctx)
        .await
        .unwrap();
    assert_eq!(value.text, "v");
    assert_eq!(probe.count("identity"), 2);
    assert_eq!(cache.update_count(), 2);
}

#[tokio::test]
async fn test_undeclared_child_request_is_rejected() {
    let probe = Arc::new(ComputeProbe::default());
    let engine = Engine::builder().build();
    let err = engine
        .build(OrphanKey, &probe_context(&probe))
        .await
        .unwrap_err();
    let EngineError::UnexpressedKeyDependency { from, to } = err.root_cause() else {
        panic!("expected an unexpressed dependency, got {err}");
    };
    assert_eq!(from, "orphan");
    assert_eq!(to, "sum");
    // The rejected child never computed.
    assert_eq!(probe.count("sum"), 0);
}

#[tokio::test]
async fn test_request_cached_requires_a_cache_entry() {
    let probe = Arc::new(ComputeProbe::default());
    let ctx = probe_context(&probe);
    let engine = Engine::builder().build();

    let err = engine
        .build(PinnedKey { a: 2, b: 3 }, &ctx)
        .await
        .unwrap_err();
    assert!(matches!(
        err.root_cause(),
        EngineError::MissingRequiredCacheEntry(path) if path.starts_with("sum/")
    ));

    // Populate the child, then the pinned parent goes through.
    engine.build(SumKey { a: 2, b: 3 }, &ctx).await.unwrap();
    let value = engine
        .build(PinnedKey { a: 2, b: 3 }, &ctx)
        .await
        .unwrap();
    assert_eq!(value.value, 5);
}

/// Plant a cached envelope for `key` with the given payload.
async fn plant_cached_payload<K: BuildKey>(
    engine: &Engine,
    key: &K,
    ctx: &Context,
    payload: &impl BuildValue,
) {
    let path = engine.cache_path(key, ctx).unwrap();
    let object = encode_value(payload, Vec::new()).unwrap();
    let id = engine.cas().put(object).await.unwrap();
    let props = CacheProps {
        cache_path: path.path.clone(),
        volatile: false,
    };
    engine
        .function_cache()
        .update(path.fingerprint, &props, id, ctx)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_stale_cached_value_is_repaired_in_place() {
    let probe = Arc::new(ComputeProbe::default());
    let ctx = probe_context(&probe);
    let engine = Engine::builder().build();

    plant_cached_payload(&engine, &FixingKey, &ctx, &FormatValue { format: 1 }).await;

    let value = engine.build(FixingKey, &ctx).await.unwrap();
    assert_eq!(value.format, 2);
    // Repair, not recompute.
    assert_eq!(probe.count("fixing"), 0);
}

#[tokio::test]
async fn test_unrepairable_stale_value_is_fatal_without_opt_in() {
    let ctx = Context::new();
    let engine = Engine::builder().build();

    plant_cached_payload(&engine, &StrictKey, &ctx, &FormatValue { format: 1 }).await;

    let err = engine.build(StrictKey, &ctx).await.unwrap_err();
    assert!(matches!(err, EngineError::InconsistentValue(_)));
}

#[tokio::test]
async fn test_unusable_cache_entry_recomputes_with_opt_in() {
    let probe = Arc::new(ComputeProbe::default());
    let ctx = probe_context(&probe);
    let engine = Engine::builder().build();

    plant_cached_payload(&engine, &RetryingKey, &ctx, &FormatValue { format: 1 }).await;

    let value = engine.build(RetryingKey, &ctx).await.unwrap();
    assert_eq!(value.format, 2);
    assert_eq!(probe.count("retrying"), 1);
}

#[tokio::test]
async fn test_undecodable_cache_entry_recomputes_with_opt_in() {
    let probe = Arc::new(ComputeProbe::default());
    let ctx = probe_context(&probe);
    let engine = Engine::builder().build();

    // Not an envelope at all.
    let path = engine.cache_path(&RetryingKey, &ctx).unwrap();
    let id = engine
        .cas()
        .put(CasObject::leaf(b"definitely not json".to_vec()))
        .await
        .unwrap();
    let props = CacheProps {
        cache_path: path.path.clone(),
        volatile: false,
    };
    engine
        .function_cache()
        .update(path.fingerprint, &props, id, &ctx)
        .await
        .unwrap();

    let value = engine.build(RetryingKey, &ctx).await.unwrap();
    assert_eq!(value.format, 2);
    assert_eq!(probe.count("retrying"), 1);
}

#[tokio::test]
async fn test_undecodable_cache_entry_is_fatal_without_opt_in() {
    let ctx = Context::new();
    let engine = Engine::builder().build();

    let path = engine.cache_path(&StrictKey, &ctx).unwrap();
    let id = engine
        .cas()
        .put(CasObject::leaf(b"garbage".to_vec()))
        .await
        .unwrap();
    let props = CacheProps {
        cache_path: path.path.clone(),
        volatile: false,
    };
    engine
        .function_cache()
        .update(path.fingerprint, &props, id, &ctx)
        .await
        .unwrap();

    let err = engine.build(StrictKey, &ctx).await.unwrap_err();
    assert!(matches!(err, EngineError::Serialization(_)));
}

#[tokio::test]
async fn test_request_only_caching_scopes_entries_to_one_build() {
    let cas = Arc::new(InMemoryCas::new());
    let cache = Arc::new(InMemoryFunctionCache::new());
    let probe = Arc::new(ComputeProbe::default());
    let ctx = probe_context(&probe);

    for _ in 0..2 {
        let engine = Engine::builder()
            .with_cas(cas.clone())
            .with_function_cache(cache.clone())
            .request_only_caching(true)
            .build();
        let value = engine
            .build(IdentityKey { payload: "scoped".into() }, &ctx)
            .await
            .unwrap();
        assert_eq!(value.text, "scoped");
    }
    // No cross-build reuse.
    assert_eq!(probe.count("identity"), 2);
}

#[tokio::test]
async fn test_entitled_resource_lookup() {
    let resources = Arc::new(ResourceRegistry::new());
    resources
        .register(Resource {
            name: "toolchain".into(),
            version: Some(7),
            lifetime: ResourceLifetime::Versioned,
        })
        .unwrap();
    resources
        .register(Resource {
            name: "gpu".into(),
            version: None,
            lifetime: ResourceLifetime::Idempotent,
        })
        .unwrap();

    let engine = Engine::builder().with_resources(resources).build();
    let value = engine.build(ToolchainKey, &Context::new()).await.unwrap();
    assert_eq!(value.value, 7);
}

#[tokio::test]
async fn test_engine_events_trace_cache_traffic() {
    let events = Arc::new(VecEventSink::new());
    let cas = Arc::new(InMemoryCas::new());
    let cache = Arc::new(InMemoryFunctionCache::new());
    let ctx = Context::new();

    let engine = Engine::builder()
        .with_cas(cas.clone())
        .with_function_cache(cache.clone())
        .with_event_sink(events.clone())
        .build();
    engine
        .build(IdentityKey { payload: "e".into() }, &ctx)
        .await
        .unwrap();
    assert_eq!(
        events.count(|e| matches!(e, EngineEvent::ComputeStarted { .. })),
        1
    );
    assert_eq!(
        events.count(|e| matches!(e, EngineEvent::CacheHit { .. })),
        0
    );

    let second = Engine::builder()
        .with_cas(cas)
        .with_function_cache(cache)
        .with_event_sink(events.clone())
        .build();
    second
        .build(IdentityKey { payload: "e".into() }, &ctx)
        .await
        .unwrap();
    assert_eq!(
        events.count(|e| matches!(e, EngineEvent::CacheHit { .. })),
        1
    );
    assert_eq!(
        events.count(|e| matches!(e, EngineEvent::ComputeStarted { .. })),
        1
    );
}

#[tokio::test]
async fn test_compute_errors_wrap_the_failing_key() {
    #[derive(Serialize, Deserialize)]
    struct FailingKey;

    #[async_trait]
    impl BuildKey for FailingKey {
        type Value = TextValue;

        fn name() -> &'static str {
            "failing"
        }

        async fn compute(&self, _fi: &FunctionInterface, _ctx: &Context) -> Result<TextValue> {
            Err(EngineError::failed("deliberate"))
        }
    }

    let engine = Engine::builder().build();
    let err = engine.build(FailingKey, &Context::new()).await.unwrap_err();
    let EngineError::ValueComputationError { key_prefix, .. } = &err else {
        panic!("expected a wrapped compute failure, got {err}");
    };
    assert_eq!(key_prefix, "failing");
    assert!(matches!(
        err.root_cause(),
        EngineError::ExecutionFailed(msg) if msg == "deliberate"
    ));
}
