//! The typed value model and the stored envelope
//!
//! A value decomposes into an ordered list of store references and a codable
//! payload. What actually lands in the store is an envelope around the
//! payload carrying evaluation metadata: the cache paths the computation
//! requested and a creation timestamp. The envelope object's refs are the
//! user value's refs, so retention of a result keeps its children alive.

use quern_cas::{to_canonical_bytes, CasObject, DataId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A serializable evaluation result.
pub trait BuildValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Store objects this value points at. Defaults to none.
    fn refs(&self) -> Vec<DataId> {
        Vec::new()
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeMetadata {
    requested_cache_key_paths: Vec<String>,
    creation_date: Option<String>,
}

/// Wire form of a stored value: user payload plus evaluation metadata.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    value: serde_json::Value,
    metadata: EnvelopeMetadata,
}

/// A decoded envelope: the typed value plus its stored metadata.
pub struct StoredValue<V> {
    pub value: V,
    pub requested_cache_key_paths: Vec<String>,
    pub creation_date: Option<String>,
}

/// Encode a value and its requested-path set into a storable object.
///
/// `requested_cache_key_paths` is sorted before encoding so equal
/// computations produce byte-identical objects.
pub fn encode_value<V: BuildValue>(
    value: &V,
    mut requested_cache_key_paths: Vec<String>,
) -> Result<CasObject> {
    requested_cache_key_paths.sort();
    requested_cache_key_paths.dedup();
    let envelope = Envelope {
        value: serde_json::to_value(value)?,
        metadata: EnvelopeMetadata {
            requested_cache_key_paths,
            creation_date: Some(chrono::Utc::now().to_rfc3339()),
        },
    };
    let data = to_canonical_bytes(&envelope).map_err(crate::error::EngineError::from)?;
    Ok(CasObject::with_refs(value.refs(), data))
}

/// Decode a stored object back into a typed value and its metadata.
pub fn decode_value<V: BuildValue>(object: &CasObject) -> Result<StoredValue<V>> {
    let envelope: Envelope = serde_json::from_slice(&object.data)?;
    let value: V = serde_json::from_value(envelope.value)?;
    Ok(StoredValue {
        value,
        requested_cache_key_paths: envelope.metadata.requested_cache_key_paths,
        creation_date: envelope.metadata.creation_date,
    })
}
