//! External resource registration and lookup
//!
//! Resources are named capabilities a key may consult during compute
//! (toolchains, device tables, license servers). Keys declare entitlements;
//! the registry is the process-wide table behind them. A `Versioned`
//! resource with a known version participates in the fingerprints of every
//! key entitled to it.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Identifies a registered resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum ResourceKey {
    /// A resource external to the engine, looked up by name.
    External(String),
}

impl ResourceKey {
    pub fn external(name: impl Into<String>) -> Self {
        Self::External(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            Self::External(name) => name,
        }
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::External(name) => write!(f, "external:{}", name),
        }
    }
}

/// How long a resource's observations stay meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceLifetime {
    /// Reads never change; the resource leaves fingerprints alone.
    Idempotent,
    /// Reads change when the version changes; the version is fingerprinted.
    Versioned,
    /// Reads are only meaningful within one top-level build.
    RequestOnly,
}

/// A registered resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub version: Option<i64>,
    pub lifetime: ResourceLifetime,
}

/// Process-wide resource table.
#[derive(Default)]
pub struct ResourceRegistry {
    resources: Mutex<HashMap<String, Resource>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource; name collisions are an error.
    pub fn register(&self, resource: Resource) -> Result<()> {
        let mut resources = self.resources.lock();
        if resources.contains_key(&resource.name) {
            return Err(EngineError::DuplicateResource(resource.name));
        }
        resources.insert(resource.name.clone(), resource);
        Ok(())
    }

    /// Look up a resource by key.
    pub fn get(&self, key: &ResourceKey) -> Option<Resource> {
        self.resources.lock().get(key.name()).cloned()
    }

    /// Versions of the entitled resources that are `Versioned` with a known
    /// version, in name order. Feeds fingerprinting.
    pub fn versioned_versions(&self, entitlements: &[ResourceKey]) -> BTreeMap<String, i64> {
        let resources = self.resources.lock();
        entitlements
            .iter()
            .filter_map(|key| resources.get(key.name()))
            .filter(|resource| resource.lifetime == ResourceLifetime::Versioned)
            .filter_map(|resource| {
                resource
                    .version
                    .map(|version| (resource.name.clone(), version))
            })
            .collect()
    }
}
