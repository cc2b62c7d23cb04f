//! The caching evaluator
//!
//! One evaluation pass for a typed key: probe the function cache, load and
//! validate a hit, repair or recompute as its type allows, and publish the
//! fresh result. This is the only place the engine ever re-runs anything,
//! and only on the single controlled path: a cached entry that fails to
//! decode or validate for a type that opted into recomputation.

use std::sync::Arc;

use quern_cas::to_canonical_string;

use crate::config;
use crate::context::Context;
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::events::EngineEvent;
use crate::fingerprint::CachePath;
use crate::function_cache::CacheProps;
use crate::graph::KeyHandle;
use crate::interface::FunctionInterface;
use crate::key::BuildKey;
use crate::value::{decode_value, encode_value};

enum CacheOutcome<V> {
    Hit(V),
    Recompute,
}

pub(crate) async fn evaluate<K: BuildKey>(
    engine: Engine,
    key: Arc<K>,
    path: CachePath,
    ctx: Context,
) -> Result<K::Value> {
    let props = CacheProps {
        cache_path: path.path.clone(),
        volatile: K::volatile(),
    };

    // Compute (and fix) run with config reads restricted to the key's own
    // declared selection.
    let scoped_ctx = ctx.scoped_to(config::select_names(
        &K::configuration_keys(),
        ctx.configuration_inputs(),
    ));

    match probe_cache(&engine, &*key, &path, &props, &ctx, &scoped_ctx).await? {
        CacheOutcome::Hit(value) => Ok(value),
        CacheOutcome::Recompute => {
            compute_fresh(&engine, &*key, &path, &props, &ctx, &scoped_ctx).await
        }
    }
}

/// Probe the cache and decide between a (possibly repaired) hit and a
/// recompute. Decode and validation failures fall through to recompute only
/// when the key type opted in.
async fn probe_cache<K: BuildKey>(
    engine: &Engine,
    key: &K,
    path: &CachePath,
    props: &CacheProps,
    ctx: &Context,
    scoped_ctx: &Context,
) -> Result<CacheOutcome<K::Value>> {
    let Some(value_id) = engine
        .inner
        .function_cache
        .get(path.fingerprint, props, ctx)
        .await?
    else {
        return Ok(CacheOutcome::Recompute);
    };

    // A cache hit whose object vanished from the store is just a miss; the
    // two lookups are not transactional.
    let Some(object) = engine.inner.cas.get(&value_id).await.map_err(EngineError::from)? else {
        log::debug!("cache entry for {} points at a missing object", path.path);
        return Ok(CacheOutcome::Recompute);
    };

    let stored = match decode_value::<K::Value>(&object) {
        Ok(stored) => stored,
        Err(err) => {
            if K::recompute_on_cache_failure() {
                log::debug!("cached value for {} failed to decode: {}", path.path, err);
                return Ok(CacheOutcome::Recompute);
            }
            return Err(err);
        }
    };

    if key.validate_cached(&stored.value) {
        engine.emit(EngineEvent::CacheHit {
            cache_path: path.path.clone(),
        });
        return Ok(CacheOutcome::Hit(stored.value));
    }

    // Give the key a chance to repair the stale value in place.
    let interface = FunctionInterface::for_key::<K>(
        engine.clone(),
        path.fingerprint,
        KeyHandle::new(K::name(), path.path.clone()),
    );
    match key.fix_cached(stored.value, &interface, scoped_ctx).await? {
        Some(fixed) => {
            store_value(
                engine,
                &fixed,
                interface.requested_cache_key_paths(),
                path,
                props,
                ctx,
            )
            .await?;
            log::debug!("repaired cached value for {}", path.path);
            Ok(CacheOutcome::Hit(fixed))
        }
        None => {
            if K::recompute_on_cache_failure() {
                Ok(CacheOutcome::Recompute)
            } else {
                Err(EngineError::InconsistentValue(format!(
                    "cached value for {} failed validation and could not be repaired",
                    path.path
                )))
            }
        }
    }
}

async fn compute_fresh<K: BuildKey>(
    engine: &Engine,
    key: &K,
    path: &CachePath,
    props: &CacheProps,
    ctx: &Context,
    scoped_ctx: &Context,
) -> Result<K::Value> {
    engine.emit(EngineEvent::ComputeStarted {
        cache_path: path.path.clone(),
    });
    log::debug!(
        "compute start: {} (build {})",
        path.path,
        ctx.build_id().map(|id| id.to_string()).unwrap_or_default()
    );

    let interface = FunctionInterface::for_key::<K>(
        engine.clone(),
        path.fingerprint,
        KeyHandle::new(K::name(), path.path.clone()),
    );

    let value = match key.compute(&interface, scoped_ctx).await {
        Ok(value) => value,
        Err(underlying) => {
            let requested = interface.requested_cache_key_paths();
            return Err(wrap_compute_error::<K>(key, underlying, requested));
        }
    };

    // A freshly computed value the key itself rejects is fatal; there is
    // nothing left to fall back to.
    if !key.validate_cached(&value) {
        return Err(EngineError::InconsistentValue(format!(
            "freshly computed value for {} failed validation",
            path.path
        )));
    }

    store_value(
        engine,
        &value,
        interface.requested_cache_key_paths(),
        path,
        props,
        ctx,
    )
    .await?;

    engine.emit(EngineEvent::ComputeFinished {
        cache_path: path.path.clone(),
    });
    log::debug!("compute done: {}", path.path);
    Ok(value)
}

async fn store_value<V: crate::value::BuildValue>(
    engine: &Engine,
    value: &V,
    requested_cache_key_paths: Vec<String>,
    path: &CachePath,
    props: &CacheProps,
    ctx: &Context,
) -> Result<()> {
    let object = encode_value(value, requested_cache_key_paths)?;
    let value_id = engine.inner.cas.put(object).await.map_err(EngineError::from)?;
    engine
        .inner
        .function_cache
        .update(path.fingerprint, props, value_id, ctx)
        .await
}

fn wrap_compute_error<K: BuildKey>(
    key: &K,
    underlying: EngineError,
    requested_cache_key_paths: Vec<String>,
) -> EngineError {
    match to_canonical_string(key) {
        Ok(encoded) => EngineError::ValueComputationError {
            key_prefix: K::name().to_string(),
            key: encoded,
            underlying: Arc::new(underlying),
            requested_cache_key_paths,
        },
        Err(encoding) => EngineError::KeyEncodingError {
            key_prefix: K::name().to_string(),
            encoding: encoding.to_string(),
            underlying: Arc::new(underlying),
        },
    }
}
