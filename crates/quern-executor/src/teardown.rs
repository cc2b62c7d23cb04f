//! Graded process teardown
//!
//! Cancellation gives a subprocess a chance to die cleanly before being
//! forced: a configurable signal ladder with a grace interval between
//! rungs, defaulting to QUIT → TERM → INT → KILL. Signals are delivered
//! through `kill(1)` so orphaned grandchildren in the same session get a
//! best-effort chance too.

use std::process::Command;
use std::time::Duration;

/// Signal ladder applied when tearing a process down.
#[derive(Debug, Clone)]
pub struct TeardownPolicy {
    signals: Vec<String>,
    grace: Duration,
}

impl Default for TeardownPolicy {
    fn default() -> Self {
        Self {
            signals: ["QUIT", "TERM", "INT", "KILL"]
                .into_iter()
                .map(String::from)
                .collect(),
            grace: Duration::from_millis(150),
        }
    }
}

impl TeardownPolicy {
    pub fn new<I, S>(signals: I, grace: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            signals: signals.into_iter().map(Into::into).collect(),
            grace,
        }
    }

    /// Immediate, single-signal policy.
    pub fn force_kill() -> Self {
        Self::new(["KILL"], Duration::from_millis(50))
    }

    /// Walk the signal ladder against `pid`, blocking between rungs.
    /// Returns once the process is gone or the ladder is exhausted.
    #[cfg(unix)]
    pub fn terminate(&self, pid: u32) {
        if pid == 0 {
            return;
        }
        let pid_arg = pid.to_string();
        for signal in &self.signals {
            if !process_alive(&pid_arg) {
                return;
            }
            log::debug!("sending SIG{} to process {}", signal, pid);
            let _ = Command::new("kill")
                .arg(format!("-{}", signal))
                .arg(&pid_arg)
                .status();
            std::thread::sleep(self.grace);
        }
        if process_alive(&pid_arg) {
            log::warn!("process {} survived the teardown sequence", pid);
        }
    }

    #[cfg(not(unix))]
    pub fn terminate(&self, pid: u32) {
        log::warn!(
            "graded teardown unsupported on this platform; process {} left to kill_on_drop",
            pid
        );
    }
}

#[cfg(unix)]
fn process_alive(pid_arg: &str) -> bool {
    Command::new("kill")
        .arg("-0")
        .arg(pid_arg)
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}
