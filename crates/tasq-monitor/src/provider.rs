//! Worker provisioner: actuates a suggested worker count by starting or
//! stopping OS processes running the consumer program.

use std::ffi::OsString;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use sysinfo::System;
use tracing::{info, warn};

/// Actuates a worker-count target for a queue and reports the count
/// actually achieved. Best-effort reconciliation, not a transaction: the
/// achieved count may differ from the target, and the caller is expected to
/// re-suggest on its next interval.
#[async_trait]
pub trait WorkerProvider: Send + Sync {
    async fn provide(&self, queue: &str, target: u32) -> u32;
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ProcessWorkerProviderOptions {
    /// Path to the worker executable.
    pub command: String,
    pub args: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("invalid worker command: {0:?}")]
    InvalidCommand(String),
}

/// What a reconciliation pass has to do to reach the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reconcile {
    Settled,
    Stop(u32),
    Start(u32),
}

fn reconcile(current: u32, target: u32) -> Reconcile {
    use std::cmp::Ordering;
    match current.cmp(&target) {
        Ordering::Equal => Reconcile::Settled,
        Ordering::Greater => Reconcile::Stop(current - target),
        Ordering::Less => Reconcile::Start(target - current),
    }
}

/// Counts, kills, and spawns worker processes by executable name.
pub struct ProcessWorkerProvider {
    options: ProcessWorkerProviderOptions,
    process_name: OsString,
}

impl ProcessWorkerProvider {
    pub fn new(options: ProcessWorkerProviderOptions) -> Result<Self, ProviderError> {
        let process_name = Path::new(&options.command)
            .file_name()
            .map(OsString::from)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ProviderError::InvalidCommand(options.command.clone()))?;
        Ok(Self {
            options,
            process_name,
        })
    }

    fn count_workers(&self) -> u32 {
        let mut system = System::new();
        system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
        system.processes_by_exact_name(&self.process_name).count() as u32
    }

    /// Kill up to `num` worker instances. A kill failure is logged and
    /// skipped; the returned count only includes confirmed signals.
    fn stop_workers(&self, num: u32) -> u32 {
        let mut system = System::new();
        system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);

        let mut stopped = 0;
        for process in system.processes_by_exact_name(&self.process_name) {
            if stopped == num {
                break;
            }
            if process.kill() {
                stopped += 1;
            } else {
                warn!(pid = process.pid().as_u32(), "failed to kill worker process");
            }
        }
        stopped
    }

    /// Spawn `num` worker instances. One spawn failure does not abort the
    /// rest.
    fn start_workers(&self, num: u32) -> u32 {
        let mut started = 0;
        for _ in 0..num {
            match tokio::process::Command::new(&self.options.command)
                .args(&self.options.args)
                .spawn()
            {
                Ok(_child) => started += 1,
                Err(e) => {
                    warn!(command = %self.options.command, error = %e, "failed to start worker process");
                }
            }
        }
        started
    }
}

#[async_trait]
impl WorkerProvider for ProcessWorkerProvider {
    async fn provide(&self, queue: &str, target: u32) -> u32 {
        let current = self.count_workers();
        info!(%queue, current, target, "reconciling worker count");

        match reconcile(current, target) {
            Reconcile::Settled => target,
            Reconcile::Stop(num) => {
                let stopped = self.stop_workers(num);
                info!(%queue, stopped, "stopped worker(s)");
                current - stopped
            }
            Reconcile::Start(num) => {
                let started = self.start_workers(num);
                info!(%queue, started, "started worker(s)");
                current + started
            }
        }
    }
}
