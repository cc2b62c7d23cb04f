//! Ruleset and service registry
//!
//! A ruleset bundles the entrypoint key types a package offers, together
//! with the action types and resource entitlements they aggregate. Each
//! entrypoint is a type-erased constructor: hand it a JSON-encoded key and
//! an engine and it returns the JSON-encoded value, so hosts can drive
//! builds by name without knowing the key types. The process-wide service
//! holds registered rulesets, the shared resource table, and a chain of
//! error classifiers.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;

use crate::context::Context;
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::key::BuildKey;
use crate::resource::{Resource, ResourceKey, ResourceRegistry};

type EntrypointFn = Arc<
    dyn Fn(Engine, serde_json::Value, Context) -> BoxFuture<'static, Result<serde_json::Value>>
        + Send
        + Sync,
>;

/// A named bundle of entrypoint key types.
pub struct Ruleset {
    name: String,
    entrypoints: HashMap<String, EntrypointFn>,
    action_dependencies: BTreeSet<String>,
    resource_entitlements: BTreeSet<ResourceKey>,
}

impl Ruleset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entrypoints: HashMap::new(),
            action_dependencies: BTreeSet::new(),
            resource_entitlements: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a key type as an entrypoint, aggregating its action and
    /// resource declarations into the ruleset.
    pub fn register_entrypoint<K: BuildKey>(&mut self) {
        self.action_dependencies
            .extend(K::action_dependencies().into_iter().map(String::from));
        self.resource_entitlements
            .extend(K::resource_entitlements());

        let constructor: EntrypointFn = Arc::new(|engine, encoded_key, ctx| {
            Box::pin(async move {
                let key: K = serde_json::from_value(encoded_key)?;
                let value = engine.build(key, &ctx).await?;
                Ok(serde_json::to_value(&value)?)
            })
        });
        self.entrypoints.insert(K::name().to_string(), constructor);
    }

    pub fn has_entrypoint(&self, name: &str) -> bool {
        self.entrypoints.contains_key(name)
    }

    /// Registered entrypoint names, sorted.
    pub fn entrypoint_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entrypoints.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Action types any entrypoint of this ruleset may spawn.
    pub fn action_dependencies(&self) -> &BTreeSet<String> {
        &self.action_dependencies
    }

    /// Resources any entrypoint of this ruleset may consult.
    pub fn resource_entitlements(&self) -> &BTreeSet<ResourceKey> {
        &self.resource_entitlements
    }

    /// Build a JSON-encoded key through the named entrypoint.
    pub async fn build_entrypoint(
        &self,
        name: &str,
        engine: &Engine,
        encoded_key: serde_json::Value,
        ctx: &Context,
    ) -> Result<serde_json::Value> {
        let constructor = self
            .entrypoints
            .get(name)
            .ok_or_else(|| EngineError::UnexpectedKeyType(name.to_string()))?;
        constructor(engine.clone(), encoded_key, ctx.clone()).await
    }
}

/// Severity of a classified failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorStatus {
    Warning,
    Failure,
    Custom(String),
}

/// Who a classified failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOrigin {
    User,
    Infrastructure,
}

/// A raw engine error mapped for reporting and retry policy.
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    pub status: ErrorStatus,
    pub origin: ErrorOrigin,
    pub details: String,
}

/// Maps raw errors to classifications. Classifiers run in registration
/// order; the first `Some` wins.
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &EngineError) -> Option<ClassifiedError>;
}

/// Process-wide registry of rulesets, resources, and error classifiers.
pub struct Service {
    rulesets: Mutex<HashMap<String, Arc<Ruleset>>>,
    resources: Arc<ResourceRegistry>,
    classifiers: Mutex<Vec<Arc<dyn ErrorClassifier>>>,
}

impl Service {
    pub fn new() -> Self {
        Self::with_resources(Arc::new(ResourceRegistry::new()))
    }

    /// Create a service sharing an existing resource table (typically the
    /// engine's).
    pub fn with_resources(resources: Arc<ResourceRegistry>) -> Self {
        Self {
            rulesets: Mutex::new(HashMap::new()),
            resources,
            classifiers: Mutex::new(Vec::new()),
        }
    }

    /// Register a ruleset; re-registering a name replaces the previous one.
    pub fn register_ruleset(&self, ruleset: Ruleset) {
        self.rulesets
            .lock()
            .insert(ruleset.name().to_string(), Arc::new(ruleset));
    }

    pub fn ruleset(&self, name: &str) -> Option<Arc<Ruleset>> {
        self.rulesets.lock().get(name).cloned()
    }

    /// Register an external resource in the shared table.
    pub fn register_resource(&self, resource: Resource) -> Result<()> {
        self.resources.register(resource)
    }

    pub fn resources(&self) -> Arc<ResourceRegistry> {
        Arc::clone(&self.resources)
    }

    /// Append a classifier to the chain.
    pub fn register_classifier(&self, classifier: Arc<dyn ErrorClassifier>) {
        self.classifiers.lock().push(classifier);
    }

    /// Classify an error through the chain, falling back to a default that
    /// attributes compute-originated failures to the user and everything
    /// else to infrastructure.
    pub fn classify(&self, error: &EngineError) -> ClassifiedError {
        for classifier in self.classifiers.lock().iter() {
            if let Some(classified) = classifier.classify(error) {
                return classified;
            }
        }
        let origin = match error.root_cause() {
            EngineError::ExecutionFailed(_)
            | EngineError::InconsistentValue(_)
            | EngineError::CycleDetected(_)
            | EngineError::UnexpressedKeyDependency { .. } => ErrorOrigin::User,
            _ => ErrorOrigin::Infrastructure,
        };
        ClassifiedError {
            status: ErrorStatus::Failure,
            origin,
            details: error.to_string(),
        }
    }
}

impl Default for Service {
    fn default() -> Self {
        Self::new()
    }
}
