//! The typed key model
//!
//! A key is a serializable description of a unit of computation; its type
//! declares the metadata the engine needs to fingerprint and schedule it.
//! The key itself carries the compute step, so resolving "which function
//! evaluates this request" is a method call, never a lookup.

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::ConfigPattern;
use crate::context::Context;
use crate::error::Result;
use crate::interface::FunctionInterface;
use crate::resource::ResourceKey;
use crate::value::BuildValue;

/// A typed, serializable unit of computation.
///
/// Implementations declare their identity (name, version, dependency
/// types, configuration selection, resource entitlements) through the
/// static methods; the engine derives cache paths and the permitted-request
/// discipline from those declarations. `compute` runs on a cache miss with
/// an interface for child requests and the ambient context.
#[async_trait]
pub trait BuildKey: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The result type this key evaluates to.
    type Value: BuildValue;

    /// Stable type identifier; leads every cache path for this key type.
    fn name() -> &'static str;

    /// Version of this key type's compute logic. Bumping it orphans every
    /// cached entry for the type and, transitively, for its dependents.
    fn version() -> i64 {
        0
    }

    /// Key types this type may `request` and whose versions feed this
    /// type's aggregated version.
    fn version_dependencies() -> Vec<KeyDescriptor> {
        Vec::new()
    }

    /// Ambient configuration entries this type consumes.
    fn configuration_keys() -> Vec<ConfigPattern> {
        Vec::new()
    }

    /// External resources this type may consult.
    fn resource_entitlements() -> Vec<ResourceKey> {
        Vec::new()
    }

    /// Action types this type may `spawn`.
    fn action_dependencies() -> Vec<&'static str> {
        Vec::new()
    }

    /// Volatile keys are exposed to the function cache as such so
    /// implementations can partition or expire them separately.
    fn volatile() -> bool {
        false
    }

    /// When true, a cached entry that fails to decode or validate is
    /// recomputed instead of surfacing the failure.
    fn recompute_on_cache_failure() -> bool {
        false
    }

    /// Optional human-readable summary used in cache paths when the
    /// serialized key is too long to appear literally.
    fn hint(&self) -> Option<String> {
        None
    }

    /// Produce this key's value. Runs only on a cache miss.
    async fn compute(&self, interface: &FunctionInterface, ctx: &Context) -> Result<Self::Value>;

    /// Whether a value (cached or freshly computed) is acceptable.
    fn validate_cached(&self, _value: &Self::Value) -> bool {
        true
    }

    /// Attempt to repair a cached value that failed validation. Returning
    /// `None` means the value is beyond repair.
    async fn fix_cached(
        &self,
        _value: Self::Value,
        _interface: &FunctionInterface,
        _ctx: &Context,
    ) -> Result<Option<Self::Value>> {
        Ok(None)
    }
}

/// Type-level metadata for a key type, usable without an instance.
///
/// Carried as plain data (name, version, and accessors to the next ring of
/// declarations) so the version and configuration closures can be walked
/// for fingerprinting.
#[derive(Clone)]
pub struct KeyDescriptor {
    name: &'static str,
    version: i64,
    version_dependencies: fn() -> Vec<KeyDescriptor>,
    configuration_keys: fn() -> Vec<ConfigPattern>,
}

impl KeyDescriptor {
    /// Descriptor for a key type.
    pub fn of<K: BuildKey>() -> Self {
        Self {
            name: K::name(),
            version: K::version(),
            version_dependencies: K::version_dependencies,
            configuration_keys: K::configuration_keys,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    /// Direct version dependencies.
    pub fn version_dependencies(&self) -> Vec<KeyDescriptor> {
        (self.version_dependencies)()
    }

    /// The type's own configuration selection.
    pub fn configuration_keys(&self) -> Vec<ConfigPattern> {
        (self.configuration_keys)()
    }

    /// Sum of `version` over the transitive dependency closure, self
    /// included. A visited set keeps (erroneous) cyclic declarations from
    /// recursing forever; each type still counts once.
    pub fn aggregated_version(&self) -> i64 {
        let mut visited = HashSet::new();
        let mut stack = vec![self.clone()];
        let mut total = 0i64;
        while let Some(descriptor) = stack.pop() {
            if !visited.insert(descriptor.name) {
                continue;
            }
            total += descriptor.version;
            stack.extend(descriptor.version_dependencies());
        }
        total
    }

    /// Union of configuration selections over the transitive dependency
    /// closure, self included. This is the fingerprint scope: a dependency
    /// newly consuming a configuration entry widens every dependent's
    /// selection.
    pub fn aggregated_config_patterns(&self) -> Vec<ConfigPattern> {
        let mut visited = HashSet::new();
        let mut stack = vec![self.clone()];
        let mut patterns = Vec::new();
        while let Some(descriptor) = stack.pop() {
            if !visited.insert(descriptor.name) {
                continue;
            }
            patterns.extend(descriptor.configuration_keys());
            stack.extend(descriptor.version_dependencies());
        }
        patterns
    }

    /// Names of the types a key of this type may `request`: its direct
    /// version dependencies plus itself.
    pub fn permitted_request_names(&self) -> BTreeSet<&'static str> {
        let mut names: BTreeSet<&'static str> = self
            .version_dependencies()
            .iter()
            .map(|d| d.name)
            .collect();
        names.insert(self.name);
        names
    }
}

impl std::fmt::Debug for KeyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyDescriptor")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish()
    }
}
