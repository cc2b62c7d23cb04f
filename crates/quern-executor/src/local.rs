//! Local process-spawning action executor
//!
//! Runs actions as OS processes inside a throwaway sandbox: input trees are
//! materialized from the store, the declarative process spec is mapped to a
//! command, deadlines and cancellation kill the child, and whatever the
//! process leaves in its output directory is imported back into the store,
//! on failure included.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use quern_cas::CasClient;
use quern_engine::{
    Action, ActionExecutor, ActionResult, Context, EngineError, Result,
};

use crate::diagnostics::{DiagnosticsGatherer, ProcessSnapshotGatherer};
use crate::spec::{ProcessSpec, INPUT_DIR, OUTPUT_DIR};
use crate::teardown::TeardownPolicy;
use crate::tree::{FlatTreeTransfer, TreeTransfer};

/// Executes actions as local subprocesses.
pub struct LocalActionExecutor {
    cas: Arc<dyn CasClient>,
    environment: serde_json::Value,
    tree: Arc<dyn TreeTransfer>,
    teardown: TeardownPolicy,
    diagnostics: Arc<dyn DiagnosticsGatherer>,
}

impl LocalActionExecutor {
    /// Executor over the given store with the local platform's environment
    /// record and default tree transfer, teardown, and diagnostics.
    pub fn new(cas: Arc<dyn CasClient>) -> Self {
        Self {
            cas,
            environment: serde_json::json!({
                "executor": "local",
                "platform": {
                    "os": std::env::consts::OS,
                    "arch": std::env::consts::ARCH,
                },
            }),
            tree: Arc::new(FlatTreeTransfer::new()),
            teardown: TeardownPolicy::default(),
            diagnostics: Arc::new(ProcessSnapshotGatherer::new()),
        }
    }

    /// Replace the environment record action requirements are evaluated
    /// against.
    pub fn with_environment(mut self, environment: serde_json::Value) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_tree_transfer(mut self, tree: Arc<dyn TreeTransfer>) -> Self {
        self.tree = tree;
        self
    }

    pub fn with_teardown(mut self, teardown: TeardownPolicy) -> Self {
        self.teardown = teardown;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticsGatherer>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    async fn run_process(
        &self,
        spec: &ProcessSpec,
        sandbox: &Path,
        ctx: &Context,
    ) -> Result<i32> {
        let program = resolve_executable(&spec.program, sandbox)?;
        let mut command = tokio::process::Command::new(&program);
        command.args(&spec.args);
        for (name, value) in &spec.env {
            command.env(name, value);
        }
        command.current_dir(match &spec.working_dir {
            Some(relative) => sandbox.join(relative),
            None => sandbox.to_path_buf(),
        });
        command.stdin(match &spec.stdin {
            Some(path) => Stdio::from(std::fs::File::open(sandbox.join(path))?),
            None => Stdio::null(),
        });
        command.stdout(match &spec.stdout {
            Some(path) => Stdio::from(std::fs::File::create(sandbox.join(path))?),
            None => Stdio::null(),
        });
        command.stderr(match &spec.stderr {
            Some(path) => Stdio::from(std::fs::File::create(sandbox.join(path))?),
            None => Stdio::null(),
        });
        // Last-resort reaping if this future is dropped mid-flight.
        command.kill_on_drop(true);

        let mut child = command.spawn()?;
        let pid = child.id().unwrap_or(0);
        log::debug!("spawned '{}' as pid {}", spec.program, pid);

        // Parent cancellation walks the teardown ladder against the child.
        let teardown = self.teardown.clone();
        let token = ctx.cancellation().register(move || {
            let teardown = teardown.clone();
            std::thread::spawn(move || teardown.terminate(pid));
        });

        let waited = match ctx.deadline() {
            Some(deadline) => {
                tokio::select! {
                    status = child.wait() => status.map(Some),
                    _ = tokio::time::sleep_until(deadline) => Ok(None),
                }
            }
            None => child.wait().await.map(Some),
        };

        let outcome = match waited {
            Ok(Some(status)) => {
                if ctx.cancellation().is_cancelled() {
                    Err(EngineError::Cancelled)
                } else {
                    Ok(status.code().unwrap_or(-1))
                }
            }
            Ok(None) => {
                // Deadline fired: one diagnostics pass against the live
                // pid, then kill.
                self.diagnostics.gather(pid).await;
                log::warn!("deadline exceeded; killing pid {}", pid);
                let _ = child.kill().await;
                Err(EngineError::DeadlineExceeded)
            }
            Err(err) => Err(EngineError::from(err)),
        };

        ctx.cancellation().deregister(token);
        outcome
    }
}

#[async_trait]
impl ActionExecutor for LocalActionExecutor {
    async fn perform(&self, action: &Action, ctx: &Context) -> Result<ActionResult> {
        if !action.requirements.evaluate(&self.environment) {
            return Err(EngineError::CannotSatisfyRequirements);
        }
        let spec: ProcessSpec = serde_json::from_value(action.payload.clone())?;

        let sandbox = tempfile::tempdir()?;
        let input_dir = sandbox.path().join(INPUT_DIR);
        let output_dir = sandbox.path().join(OUTPUT_DIR);
        tokio::fs::create_dir_all(&input_dir).await?;
        tokio::fs::create_dir_all(&output_dir).await?;

        for tree_id in &action.refs {
            self.tree
                .export(self.cas.as_ref(), tree_id, &input_dir)
                .await?;
        }
        if let Some(initial) = &spec.initial_output_tree {
            self.tree
                .export(self.cas.as_ref(), initial, &output_dir)
                .await?;
        }

        match self.run_process(&spec, sandbox.path(), ctx).await {
            Ok(exit_code) => {
                let tree_id = self.tree.import(self.cas.as_ref(), &output_dir).await?;
                Ok(ActionResult {
                    tree_id: Some(tree_id),
                    exit_code,
                })
            }
            Err(underlying) => {
                // Import whatever the process managed to produce so the
                // failure is inspectable.
                match self.tree.import(self.cas.as_ref(), &output_dir).await {
                    Ok(tree_id) => Err(EngineError::ActionFailure {
                        tree_id: Some(tree_id),
                        underlying: Arc::new(underlying),
                    }),
                    Err(upload) => Err(EngineError::RecoveryUploadFailure {
                        upload: Arc::new(upload),
                        original: Arc::new(underlying),
                    }),
                }
            }
        }
    }
}

/// Resolve a spec's program to a runnable path.
///
/// Absolute paths must exist; paths with a separator resolve inside the
/// sandbox; bare names go through the search path.
fn resolve_executable(program: &str, sandbox: &Path) -> Result<PathBuf> {
    let path = Path::new(program);
    if path.is_absolute() {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(EngineError::NoExecutable(program.to_string()));
    }
    if program.contains(std::path::MAIN_SEPARATOR) {
        let candidate = sandbox.join(path);
        if candidate.exists() {
            return Ok(candidate);
        }
        return Err(EngineError::NoExecutable(program.to_string()));
    }
    which::which(program).map_err(|_| EngineError::NoExecutable(program.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_absolute_executable() {
        let sandbox = tempfile::tempdir().unwrap();
        let resolved = resolve_executable("/bin/sh", sandbox.path()).unwrap();
        assert_eq!(resolved, PathBuf::from("/bin/sh"));
    }

    #[test]
    fn test_resolve_bare_name_through_search_path() {
        let sandbox = tempfile::tempdir().unwrap();
        let resolved = resolve_executable("sh", sandbox.path()).unwrap();
        assert!(resolved.is_absolute());
    }

    #[test]
    fn test_resolve_missing_executable_fails() {
        let sandbox = tempfile::tempdir().unwrap();
        let err =
            resolve_executable("quern-no-such-binary-exists", sandbox.path()).unwrap_err();
        assert!(matches!(err, EngineError::NoExecutable(_)));
    }

    #[test]
    fn test_resolve_sandbox_relative_executable() {
        let sandbox = tempfile::tempdir().unwrap();
        std::fs::create_dir(sandbox.path().join("input")).unwrap();
        std::fs::write(sandbox.path().join("input/tool"), b"#!/bin/sh\n").unwrap();

        let resolved = resolve_executable("input/tool", sandbox.path()).unwrap();
        assert!(resolved.starts_with(sandbox.path()));

        assert!(matches!(
            resolve_executable("input/other", sandbox.path()),
            Err(EngineError::NoExecutable(_))
        ));
    }
}
