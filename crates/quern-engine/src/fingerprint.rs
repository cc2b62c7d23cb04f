//! Cache paths and stable fingerprints
//!
//! A key's cache path is a deterministic, human-scannable string:
//!
//! ```text
//! <name>/<aggregated-version>/<key-body>[/<config-hash>][/<resource-versions-hash>]
//! ```
//!
//! The key body is the serialized key itself when short enough, otherwise a
//! truncated digest (prefixed with the key's hint when it has one). The
//! stable fingerprint is the blake3 digest of the whole path; it is the
//! in-process identity used for deduplication, dependency edges, and
//! function-cache lookups.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use quern_cas::{to_canonical_bytes, to_canonical_string};
use serde::Serialize;
use uuid::Uuid;

use crate::config;
use crate::context::Context;
use crate::error::Result;
use crate::key::{BuildKey, KeyDescriptor};
use crate::resource::ResourceRegistry;

/// Longest serialized key that may appear literally in a cache path.
const MAX_LITERAL_KEY_BODY: usize = 250;

/// Stable identity of a key within one process: blake3 of its cache path.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint a cache path.
    pub fn of_path(path: &str) -> Self {
        Self(*blake3::hash(path.as_bytes()).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First few bytes are plenty for log lines.
        write!(
            f,
            "Fingerprint({:02x}{:02x}{:02x}{:02x}..)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// A key's cache path together with its fingerprint.
#[derive(Debug, Clone)]
pub struct CachePath {
    pub path: String,
    pub fingerprint: Fingerprint,
}

impl CachePath {
    fn of(path: String) -> Self {
        Self {
            fingerprint: Fingerprint::of_path(&path),
            path,
        }
    }
}

/// Nine-byte truncated digest, starting at byte 1, base64-url encoded.
///
/// Used for every hashed path segment (long key bodies, configuration
/// selections, resource versions).
fn short_hash(bytes: &[u8]) -> String {
    let digest = blake3::hash(bytes);
    URL_SAFE_NO_PAD.encode(&digest.as_bytes()[1..10])
}

fn short_hash_of<T: Serialize>(value: &T) -> Result<String> {
    let bytes = to_canonical_bytes(value).map_err(crate::error::EngineError::from)?;
    Ok(short_hash(&bytes))
}

/// Flatten a serialized key into `--name=value` tokens.
///
/// Scalar fields render bare, nested structures as compact canonical JSON.
/// Non-record keys render as canonical JSON outright.
fn friendly_form(value: &serde_json::Value) -> Result<String> {
    let rendered = match value {
        serde_json::Value::Object(map) => {
            let mut tokens = Vec::with_capacity(map.len());
            for (name, field) in map {
                let field_text = match field {
                    serde_json::Value::String(text) => text.clone(),
                    serde_json::Value::Null => "null".to_string(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    serde_json::Value::Number(n) => n.to_string(),
                    nested => to_canonical_string(nested)
                        .map_err(crate::error::EngineError::from)?,
                };
                tokens.push(format!("--{}={}", name, field_text));
            }
            tokens.join(" ")
        }
        other => to_canonical_string(other).map_err(crate::error::EngineError::from)?,
    };
    Ok(rendered)
}

/// The `<key-body>` component of a cache path.
fn key_body(serialized: &serde_json::Value, hint: Option<String>) -> Result<String> {
    let friendly = friendly_form(serialized)?;
    if hint.is_none() && friendly.len() <= MAX_LITERAL_KEY_BODY {
        return Ok(friendly);
    }
    let json = to_canonical_string(serialized).map_err(crate::error::EngineError::from)?;
    if json.len() <= MAX_LITERAL_KEY_BODY {
        return Ok(json);
    }
    let digest = short_hash(json.as_bytes());
    Ok(match hint {
        Some(hint) => format!("{} {}", hint, digest),
        None => digest,
    })
}

/// Build the cache path and fingerprint for a key.
///
/// `scope` is the engine's build id when request-only caching is enabled;
/// scoped paths never collide across top-level builds.
pub fn cache_path_for_key<K: BuildKey>(
    key: &K,
    ctx: &Context,
    resources: &ResourceRegistry,
    scope: Option<Uuid>,
) -> Result<CachePath> {
    let descriptor = KeyDescriptor::of::<K>();
    let serialized = serde_json::to_value(key)?;

    let mut path = format!(
        "{}/{}/{}",
        K::name(),
        descriptor.aggregated_version(),
        key_body(&serialized, key.hint())?
    );

    let selection = config::select_map(
        &descriptor.aggregated_config_patterns(),
        ctx.configuration_inputs(),
    );
    if !selection.is_empty() {
        path.push('/');
        path.push_str(&short_hash_of(&selection)?);
    }

    let versions = resources.versioned_versions(&K::resource_entitlements());
    if !versions.is_empty() {
        path.push('/');
        path.push_str(&short_hash_of(&versions)?);
    }

    if let Some(build_id) = scope {
        path = format!("{}/{}", build_id, path);
    }

    Ok(CachePath::of(path))
}
