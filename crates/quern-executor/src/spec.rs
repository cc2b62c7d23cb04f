//! Declarative process description
//!
//! Actions that spawn a process carry a `ProcessSpec` as their payload. All
//! paths are relative to the sandbox root the executor materializes; inputs
//! land under `input/`, and everything left under `out/` is imported as the
//! action's output tree.

use std::collections::BTreeMap;

use quern_cas::DataId;
use serde::{Deserialize, Serialize};

/// Default sandbox subdirectory the input trees are materialized into.
pub const INPUT_DIR: &str = "input";

/// Default sandbox subdirectory imported as the output tree.
pub const OUTPUT_DIR: &str = "out";

/// Maps a declarative process description to an OS process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSpec {
    /// Executable: an absolute path, a sandbox-relative path (contains a
    /// separator), or a bare name resolved through the search path.
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables, on top of the parent's.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Working directory relative to the sandbox root; defaults to the
    /// sandbox root itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Sandbox-relative file fed to the process's stdin; closed when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,

    /// Sandbox-relative file capturing stdout; discarded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,

    /// Sandbox-relative file capturing stderr; discarded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,

    /// Tree exported into `out/` before the process starts, for actions
    /// that amend a previous result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_output_tree: Option<DataId>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
            stdin: None,
            stdout: None,
            stderr: None,
            initial_output_tree: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn stdout(mut self, path: impl Into<String>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    pub fn stderr(mut self, path: impl Into<String>) -> Self {
        self.stderr = Some(path.into());
        self
    }

    pub fn stdin(mut self, path: impl Into<String>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    pub fn working_dir(mut self, path: impl Into<String>) -> Self {
        self.working_dir = Some(path.into());
        self
    }

    pub fn initial_output_tree(mut self, tree: DataId) -> Self {
        self.initial_output_tree = Some(tree);
        self
    }
}
