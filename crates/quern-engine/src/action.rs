//! Action model and executor contract
//!
//! An action is an externally executed unit of work, typically a
//! subprocess. Actions carry a requirements predicate over the executor's
//! environment record, input store references, and a codable payload the
//! executor interprets. Execution itself is pluggable; this module only
//! defines the seam.

use async_trait::async_trait;
use quern_cas::DataId;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{EngineError, Result};

/// An expression over the execution environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expr {
    /// A literal value.
    Constant { value: serde_json::Value },
    /// A dotted key path into the environment record.
    EnvPath { path: String },
}

impl Expr {
    pub fn constant(value: serde_json::Value) -> Self {
        Self::Constant { value }
    }

    pub fn env(path: impl Into<String>) -> Self {
        Self::EnvPath { path: path.into() }
    }

    /// Resolve against an environment record; `None` for missing paths.
    fn resolve<'a>(&'a self, environment: &'a serde_json::Value) -> Option<&'a serde_json::Value> {
        match self {
            Self::Constant { value } => Some(value),
            Self::EnvPath { path } => {
                let mut current = environment;
                for segment in path.split('.') {
                    current = current.get(segment)?;
                }
                Some(current)
            }
        }
    }
}

/// Boolean algebra over environment expressions.
///
/// Executors refuse actions whose requirements do not hold in their
/// environment record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Requirement {
    Constant { value: bool },
    Equality { left: Expr, right: Expr },
    Not { inner: Box<Requirement> },
    AllOf { terms: Vec<Requirement> },
    AnyOf { terms: Vec<Requirement> },
}

impl Requirement {
    /// A requirement every executor satisfies.
    pub fn always() -> Self {
        Self::Constant { value: true }
    }

    pub fn equals(left: Expr, right: Expr) -> Self {
        Self::Equality { left, right }
    }

    pub fn not(inner: Requirement) -> Self {
        Self::Not {
            inner: Box::new(inner),
        }
    }

    pub fn all_of(terms: Vec<Requirement>) -> Self {
        Self::AllOf { terms }
    }

    pub fn any_of(terms: Vec<Requirement>) -> Self {
        Self::AnyOf { terms }
    }

    /// Evaluate against an environment record. An equality over a missing
    /// path is false.
    pub fn evaluate(&self, environment: &serde_json::Value) -> bool {
        match self {
            Self::Constant { value } => *value,
            Self::Equality { left, right } => {
                match (left.resolve(environment), right.resolve(environment)) {
                    (Some(l), Some(r)) => l == r,
                    _ => false,
                }
            }
            Self::Not { inner } => !inner.evaluate(environment),
            Self::AllOf { terms } => terms.iter().all(|t| t.evaluate(environment)),
            Self::AnyOf { terms } => terms.iter().any(|t| t.evaluate(environment)),
        }
    }
}

/// An externally executed unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Action type identifier; must be declared by the spawning key.
    pub action_type: String,
    /// Predicate the executing environment must satisfy.
    pub requirements: Requirement,
    /// Input store objects (typically file trees).
    pub refs: Vec<DataId>,
    /// Executor-interpreted payload.
    pub payload: serde_json::Value,
}

impl Action {
    pub fn new(action_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            action_type: action_type.into(),
            requirements: Requirement::always(),
            refs: Vec::new(),
            payload,
        }
    }

    pub fn with_refs(mut self, refs: Vec<DataId>) -> Self {
        self.refs = refs;
        self
    }

    pub fn with_requirements(mut self, requirements: Requirement) -> Self {
        self.requirements = requirements;
        self
    }
}

/// Result of a completed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    /// The imported output tree, when the executor produced one.
    pub tree_id: Option<DataId>,
    /// Process exit code (0 for in-process executors that succeeded).
    pub exit_code: i32,
}

/// Contract for action executors. Implementations may run in-process,
/// spawn local subprocesses, or dispatch remotely.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn perform(&self, action: &Action, ctx: &Context) -> Result<ActionResult>;
}

/// Default executor for engines that never spawn: rejects everything.
#[derive(Default)]
pub struct UnconfiguredExecutor;

#[async_trait]
impl ActionExecutor for UnconfiguredExecutor {
    async fn perform(&self, action: &Action, _ctx: &Context) -> Result<ActionResult> {
        Err(EngineError::failed(format!(
            "No action executor configured (action type '{}')",
            action.action_type
        )))
    }
}
