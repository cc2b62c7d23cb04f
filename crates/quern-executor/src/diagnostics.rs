//! Deadline diagnostics against live processes
//!
//! When an action's deadline fires, the executor gives a gatherer one look
//! at the still-running PID before killing it. The default snapshot logs
//! name, CPU, and memory so a post-mortem has something to start from;
//! hosts can inject richer gatherers (stack dumps, `jstack`-style tools)
//! through the executor.

use async_trait::async_trait;

/// Observes a live process just before it is torn down.
#[async_trait]
pub trait DiagnosticsGatherer: Send + Sync {
    async fn gather(&self, pid: u32);
}

/// Default gatherer: logs a one-line process snapshot.
#[derive(Default)]
pub struct ProcessSnapshotGatherer;

impl ProcessSnapshotGatherer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DiagnosticsGatherer for ProcessSnapshotGatherer {
    async fn gather(&self, pid: u32) {
        let snapshot = tokio::task::spawn_blocking(move || {
            let mut system = sysinfo::System::new();
            system.refresh_processes(
                sysinfo::ProcessesToUpdate::Some(&[sysinfo::Pid::from_u32(pid)]),
                true,
            );
            system.process(sysinfo::Pid::from_u32(pid)).map(|process| {
                format!(
                    "name={:?} status={:?} cpu={:.1}% memory={}B",
                    process.name(),
                    process.status(),
                    process.cpu_usage(),
                    process.memory(),
                )
            })
        })
        .await
        .ok()
        .flatten();

        match snapshot {
            Some(details) => log::warn!("deadline diagnostics for pid {}: {}", pid, details),
            None => log::warn!("deadline diagnostics: pid {} already gone", pid),
        }
    }
}
