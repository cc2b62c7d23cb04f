//! Configuration scoping
//!
//! Keys declare which ambient configuration entries they consume, either as
//! exact names or as name prefixes. Only the declared selection participates
//! in a key's fingerprint, and only a key's own selection is readable while
//! its compute runs; a key picking up a new configuration entry therefore
//! always changes its cache path before the new value can influence its
//! output.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A selector over ambient configuration entry names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConfigPattern {
    /// Selects exactly one entry by name.
    Literal(String),
    /// Selects every entry whose name starts with the prefix.
    Prefix(String),
}

impl ConfigPattern {
    pub fn literal(name: impl Into<String>) -> Self {
        Self::Literal(name.into())
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }

    /// Whether this pattern selects the given entry name.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Literal(literal) => literal == name,
            Self::Prefix(prefix) => name.starts_with(prefix.as_str()),
        }
    }
}

/// Names from `inputs` selected by any of `patterns`.
pub fn select_names(
    patterns: &[ConfigPattern],
    inputs: &BTreeMap<String, serde_json::Value>,
) -> BTreeSet<String> {
    inputs
        .keys()
        .filter(|name| patterns.iter().any(|p| p.matches(name)))
        .cloned()
        .collect()
}

/// The sub-map of `inputs` selected by any of `patterns`, in name order.
pub fn select_map(
    patterns: &[ConfigPattern],
    inputs: &BTreeMap<String, serde_json::Value>,
) -> BTreeMap<String, serde_json::Value> {
    inputs
        .iter()
        .filter(|(name, _)| patterns.iter().any(|p| p.matches(name)))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
