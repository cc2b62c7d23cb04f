//! Content-addressed store model for Quern
//!
//! This crate defines the object model the evaluation engine stores results
//! in, plus the client trait it consumes:
//!
//! - [`DataId`]: opaque, totally-ordered identifier for a stored object
//! - [`CasObject`]: an immutable `{refs, data}` pair
//! - [`CasClient`]: async put/get contract, pluggable per deployment
//! - [`InMemoryCas`]: the default mutex-guarded map implementation
//! - [`canonical`]: deterministic JSON encoding used for every hash input
//!
//! The store is assumed collision-resistant; everything above it treats a
//! `DataId` as a value type and never inspects its bytes.

pub mod canonical;
mod client;
mod error;
mod id;

pub use canonical::{canonicalize, to_canonical_bytes, to_canonical_string};
pub use client::{CasClient, CasObject, InMemoryCas};
pub use error::{CasError, Result};
pub use id::DataId;
