//! Quern Engine - content-addressed memoizing function evaluation
//!
//! This crate is the core of Quern: callers express work as typed keys,
//! the engine evaluates them to typed values, deduplicates in-flight
//! requests, caches results by stable fingerprint in a content-addressed
//! store, rejects cyclic dependencies, and reuses prior results across
//! process invocations.
//!
//! # Architecture
//!
//! - [`BuildKey`] / [`BuildValue`]: the typed request/result model; the key
//!   carries its own compute step
//! - [`Engine`]: the coordinator exposing `build(key) → value`
//! - [`FunctionInterface`]: the handle a running compute uses for child
//!   requests, action dispatch, and resource lookups
//! - [`KeyDependencyGraph`]: in-flight edge tracking with cycle rejection
//! - [`FunctionCache`]: pluggable fingerprint → stored-value-id map
//! - [`CachePath`] / [`Fingerprint`]: deterministic identity derived from a
//!   key's serialized form, version closure, configuration selection, and
//!   resource versions
//! - [`Ruleset`] / [`Service`]: name-indexed entrypoints, resources, and
//!   error classification
//!
//! # Example
//!
//! ```ignore
//! use quern_engine::{BuildKey, Context, Engine};
//!
//! let engine = Engine::builder().build();
//! let value = engine.build(MyKey { src: "main".into() }, &Context::new()).await?;
//! ```

pub mod action;
pub mod cancellation;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod events;
pub mod fingerprint;
mod function;
pub mod function_cache;
pub mod graph;
pub mod interface;
pub mod key;
mod pending;
pub mod registry;
pub mod resource;
pub mod value;

pub use action::{Action, ActionExecutor, ActionResult, Expr, Requirement, UnconfiguredExecutor};
pub use cancellation::CancellationRegistry;
pub use config::ConfigPattern;
pub use context::{Context, Extensions};
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, Result};
pub use events::{EngineEvent, EventError, EventSink, NullEventSink, VecEventSink};
pub use fingerprint::{CachePath, Fingerprint};
pub use function_cache::{CacheProps, FunctionCache, InMemoryFunctionCache};
pub use graph::{KeyDependencyGraph, KeyHandle};
pub use interface::FunctionInterface;
pub use key::{BuildKey, KeyDescriptor};
pub use registry::{
    ClassifiedError, ErrorClassifier, ErrorOrigin, ErrorStatus, Ruleset, Service,
};
pub use resource::{Resource, ResourceKey, ResourceLifetime, ResourceRegistry};
pub use value::{decode_value, encode_value, BuildValue, StoredValue};

// Re-export the store types consumers will need alongside the engine.
pub use quern_cas::{CasClient, CasObject, DataId, InMemoryCas};
