//! Store client contract and the default in-memory implementation

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::id::DataId;

/// An immutable stored object: an ordered list of references to child
/// objects plus an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasObject {
    /// Child objects this object points at, in producer order.
    pub refs: Vec<DataId>,
    /// Payload bytes.
    pub data: Vec<u8>,
}

impl CasObject {
    /// Create an object with no child references.
    pub fn leaf(data: impl Into<Vec<u8>>) -> Self {
        Self {
            refs: Vec::new(),
            data: data.into(),
        }
    }

    /// Create an object with child references.
    pub fn with_refs(refs: Vec<DataId>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            refs,
            data: data.into(),
        }
    }
}

/// Async client contract for a content-addressed store.
///
/// Implementations may be local, remote, or layered; the engine only relies
/// on `put` returning a stable identifier for identical objects and `get`
/// returning `None` for unknown identifiers. Both calls may suspend.
#[async_trait]
pub trait CasClient: Send + Sync {
    /// Store an object, returning its identifier.
    async fn put(&self, object: CasObject) -> Result<DataId>;

    /// Fetch an object, or `None` if the store does not hold it.
    async fn get(&self, id: &DataId) -> Result<Option<CasObject>>;
}

/// Default in-process store: a mutex-guarded map from id to object.
///
/// Identifiers are blake3 over a domain-separated encoding of the refs and
/// payload, so `{refs: [x], data: ""}` and `{refs: [], data: x}` get
/// distinct ids.
#[derive(Default)]
pub struct InMemoryCas {
    objects: Mutex<HashMap<DataId, CasObject>>,
}

impl InMemoryCas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }

    fn digest(object: &CasObject) -> DataId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(object.refs.len() as u64).to_le_bytes());
        for r in &object.refs {
            hasher.update(&(r.as_bytes().len() as u64).to_le_bytes());
            hasher.update(r.as_bytes());
        }
        hasher.update(&object.data);
        DataId::from_bytes(hasher.finalize().as_bytes().to_vec())
    }
}

#[async_trait]
impl CasClient for InMemoryCas {
    async fn put(&self, object: CasObject) -> Result<DataId> {
        let id = Self::digest(&object);
        self.objects.lock().insert(id.clone(), object);
        log::trace!("cas put {}", id);
        Ok(id)
    }

    async fn get(&self, id: &DataId) -> Result<Option<CasObject>> {
        Ok(self.objects.lock().get(id).cloned())
    }
}
