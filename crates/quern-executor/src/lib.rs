//! Quern Executor - local process execution for actions
//!
//! This crate implements the engine's action-executor seam for local
//! subprocesses:
//!
//! - [`LocalActionExecutor`]: sandboxed spawn/wait with deadline and
//!   cancellation handling
//! - [`ProcessSpec`]: the declarative payload mapping an action to a
//!   command
//! - [`TreeTransfer`] / [`FlatTreeTransfer`]: file trees between the store
//!   and sandbox directories
//! - [`TeardownPolicy`]: the graded signal ladder used on cancellation
//! - [`DiagnosticsGatherer`]: a look at the live process when a deadline
//!   fires
//!
//! Remote or sandboxing executors implement the same
//! [`quern_engine::ActionExecutor`] trait and slot into the engine builder
//! unchanged.

mod diagnostics;
mod local;
mod spec;
mod teardown;
mod tree;

pub use diagnostics::{DiagnosticsGatherer, ProcessSnapshotGatherer};
pub use local::LocalActionExecutor;
pub use spec::{ProcessSpec, INPUT_DIR, OUTPUT_DIR};
pub use teardown::TeardownPolicy;
pub use tree::{FlatTreeTransfer, TreeTransfer};
