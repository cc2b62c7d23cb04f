//! Ambient evaluation context
//!
//! Everything a computation may consult beyond its own key travels here
//! explicitly: configuration inputs, the deadline, the build id, the
//! cancellation registry, and a typed extension map for runtime objects
//! that cannot be serialized (diagnostics gatherers, streaming log
//! handlers, tree transfer overrides). There are no hidden globals; every
//! suspendable operation takes the context by reference.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use crate::cancellation::CancellationRegistry;

/// Typed extension map for non-serializable dependency injection.
///
/// Holds arbitrary `Send + Sync` values behind `dyn Any`, keyed by string.
/// Built up-front and frozen into the context.
#[derive(Default)]
pub struct Extensions {
    inner: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a typed value under the given key, replacing any previous one.
    pub fn set<T: Send + Sync + 'static>(&mut self, key: &str, value: T) {
        self.inner.insert(key.to_string(), Box::new(value));
    }

    /// Get a reference to a typed value; `None` on missing key or type
    /// mismatch.
    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.inner.get(key).and_then(|v| v.downcast_ref())
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }
}

/// Ambient state threaded through every evaluation.
#[derive(Clone)]
pub struct Context {
    configuration_inputs: Arc<BTreeMap<String, serde_json::Value>>,
    deadline: Option<Instant>,
    build_id: Option<Uuid>,
    cancellation: Arc<CancellationRegistry>,
    extensions: Arc<Extensions>,
    /// While a compute runs, the configuration names its key may read.
    /// `None` outside compute (unrestricted).
    visible_config: Option<Arc<BTreeSet<String>>>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            configuration_inputs: Arc::new(BTreeMap::new()),
            deadline: None,
            build_id: None,
            cancellation: Arc::new(CancellationRegistry::new()),
            extensions: Arc::new(Extensions::new()),
            visible_config: None,
        }
    }

    /// Replace the configuration input map.
    pub fn with_configuration(
        mut self,
        inputs: BTreeMap<String, serde_json::Value>,
    ) -> Self {
        self.configuration_inputs = Arc::new(inputs);
        self
    }

    /// Add one configuration input.
    pub fn with_configuration_input(
        mut self,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        Arc::make_mut(&mut self.configuration_inputs).insert(name.into(), value);
        self
    }

    /// Freeze an extension map into the context.
    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = Arc::new(extensions);
        self
    }

    /// Install an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Install a deadline `timeout` from now, never extending an existing
    /// one.
    pub fn with_reduced_deadline(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let mut next = self.clone();
        next.deadline = Some(match self.deadline {
            Some(existing) => existing.min(candidate),
            None => candidate,
        });
        next
    }

    /// Share a cancellation registry with this context.
    pub fn with_cancellation(mut self, registry: Arc<CancellationRegistry>) -> Self {
        self.cancellation = registry;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn build_id(&self) -> Option<Uuid> {
        self.build_id
    }

    pub fn cancellation(&self) -> &Arc<CancellationRegistry> {
        &self.cancellation
    }

    /// Read a configuration input. While a compute runs, only the names the
    /// running key declared are visible.
    pub fn config_value(&self, name: &str) -> Option<&serde_json::Value> {
        if let Some(visible) = &self.visible_config {
            if !visible.contains(name) {
                return None;
            }
        }
        self.configuration_inputs.get(name)
    }

    /// Typed extension lookup.
    pub fn extension<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.extensions.get(key)
    }

    /// The raw input map, unrestricted. Fingerprinting uses this so a
    /// compute-time scope never changes what a child's path hashes over.
    pub(crate) fn configuration_inputs(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.configuration_inputs
    }

    /// Stamp the engine's build id.
    pub(crate) fn for_build(&self, build_id: Uuid) -> Self {
        let mut next = self.clone();
        next.build_id = Some(build_id);
        next
    }

    /// Restrict config reads to `visible` for the duration of a compute.
    pub(crate) fn scoped_to(&self, visible: BTreeSet<String>) -> Self {
        let mut next = self.clone();
        next.visible_config = Some(Arc::new(visible));
        next
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_visible_by_default() {
        let ctx = Context::new().with_configuration_input("opt", serde_json::json!(3));
        assert_eq!(ctx.config_value("opt"), Some(&serde_json::json!(3)));
        assert_eq!(ctx.config_value("absent"), None);
    }

    #[test]
    fn test_scoped_context_hides_undeclared_names() {
        let ctx = Context::new()
            .with_configuration_input("opt", serde_json::json!(1))
            .with_configuration_input("secret", serde_json::json!(2));
        let scoped = ctx.scoped_to(["opt".to_string()].into_iter().collect());
        assert_eq!(scoped.config_value("opt"), Some(&serde_json::json!(1)));
        assert_eq!(scoped.config_value("secret"), None);
        // The raw map is untouched for fingerprinting.
        assert_eq!(scoped.configuration_inputs().len(), 2);
    }

    #[test]
    fn test_reduced_deadline_never_extends() {
        let ctx = Context::new().with_reduced_deadline(Duration::from_secs(1));
        let tightened = ctx.with_reduced_deadline(Duration::from_millis(10));
        assert!(tightened.deadline().unwrap() < ctx.deadline().unwrap());

        let loosened = tightened.with_reduced_deadline(Duration::from_secs(60));
        assert_eq!(loosened.deadline(), tightened.deadline());
    }

    #[test]
    fn test_extensions_round_trip() {
        let mut extensions = Extensions::new();
        extensions.set("counter", 42u64);
        let ctx = Context::new().with_extensions(extensions);
        assert_eq!(ctx.extension::<u64>("counter"), Some(&42));
        assert_eq!(ctx.extension::<String>("counter"), None);
    }
}
