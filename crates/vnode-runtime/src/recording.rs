//! In-memory runtime that records calls instead of running containers

use crate::{ContainerLaunch, ContainerRuntime, Removal};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use tokio::sync::Mutex;
use tracing::debug;
use vnode_core::{Error, Result};

/// A call received by [`RecordingRuntime`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    EnsureAbsent(String),
    EnsureRunning(ContainerLaunch),
}

/// Calls kept by [`RecordingRuntime`]; older ones are dropped first
pub const MAX_RECORDED_CALLS: usize = 1024;

#[derive(Debug, Default)]
struct RecordingState {
    calls: VecDeque<RuntimeCall>,
    running: HashSet<String>,
    fail_absent: bool,
    fail_running: bool,
}

impl RecordingState {
    fn record(&mut self, call: RuntimeCall) {
        if self.calls.len() == MAX_RECORDED_CALLS {
            self.calls.pop_front();
        }
        self.calls.push_back(call);
    }
}

/// Runtime driver for tests and dry runs
///
/// Tracks which containers would be running and can be told to fail either
/// operation.
#[derive(Debug, Default)]
pub struct RecordingRuntime {
    state: Mutex<RecordingState>,
}

impl RecordingRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `ensure_absent` calls fail
    pub async fn fail_ensure_absent(&self, fail: bool) {
        self.state.lock().await.fail_absent = fail;
    }

    /// Make subsequent `ensure_running` calls fail
    pub async fn fail_ensure_running(&self, fail: bool) {
        self.state.lock().await.fail_running = fail;
    }

    /// The most recent calls, oldest first
    pub async fn calls(&self) -> Vec<RuntimeCall> {
        self.state.lock().await.calls.iter().cloned().collect()
    }

    /// Whether a container with this name would be running
    pub async fn is_running(&self, name: &str) -> bool {
        self.state.lock().await.running.contains(name)
    }
}

#[async_trait]
impl ContainerRuntime for RecordingRuntime {
    async fn ensure_absent(&self, name: &str) -> Result<Removal> {
        let mut state = self.state.lock().await;
        state.record(RuntimeCall::EnsureAbsent(name.to_string()));

        if state.fail_absent {
            return Err(Error::runtime_failure(
                format!("rm --force {}", name),
                "exit status: 1",
                "injected failure",
            ));
        }

        debug!("Recorded removal of {}", name);
        if state.running.remove(name) {
            Ok(Removal::Removed)
        } else {
            Ok(Removal::AlreadyAbsent)
        }
    }

    async fn ensure_running(&self, launch: &ContainerLaunch) -> Result<()> {
        let mut state = self.state.lock().await;
        state.record(RuntimeCall::EnsureRunning(launch.clone()));

        if state.fail_running {
            return Err(Error::runtime_failure(
                format!("run --name={} {}", launch.name, launch.image),
                "exit status: 125",
                "injected failure",
            ));
        }

        debug!("Recorded launch of {}", launch.name);
        state.running.insert(launch.name.clone());
        Ok(())
    }
}
