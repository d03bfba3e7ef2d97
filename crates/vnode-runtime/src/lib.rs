//! # vnode-runtime
//!
//! Idempotent lifecycle over an external container runtime.
//!
//! The node provider only ever needs two operations on the container that
//! backs its mesh identity:
//!
//! - `ensure_absent`: remove the container, treating "already gone" as success
//! - `ensure_running`: start the container from a [`ContainerLaunch`]
//!
//! [`DockerCli`] drives the docker command line with a per-command deadline.
//! [`RecordingRuntime`] keeps everything in memory.

pub mod docker;
pub mod launch;
pub mod recording;

pub use docker::{DockerCli, DEFAULT_COMMAND_TIMEOUT, DEFAULT_DOCKER_BINARY};
pub use launch::{BindMount, ContainerLaunch, DEFAULT_MESH_IMAGE};
pub use recording::{RecordingRuntime, RuntimeCall, MAX_RECORDED_CALLS};

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use vnode_core::{Error, Result};

/// How `ensure_absent` reached its goal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Removal {
    /// A container existed and was removed
    Removed,
    /// There was nothing to remove
    AlreadyAbsent,
}

/// Operations the node needs from a container runtime
///
/// Callers run `ensure_absent` before `ensure_running` for the same name.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Make sure no container with this name exists
    async fn ensure_absent(&self, name: &str) -> Result<Removal>;

    /// Start a container described by `launch`
    async fn ensure_running(&self, launch: &ContainerLaunch) -> Result<()>;

    /// `ensure_absent` bounded by a caller-supplied deadline
    async fn ensure_absent_within(&self, name: &str, deadline: Duration) -> Result<Removal> {
        tokio::time::timeout(deadline, self.ensure_absent(name))
            .await
            .map_err(|_| {
                Error::timeout(format!("removing {} took longer than {:?}", name, deadline))
            })?
    }

    /// `ensure_running` bounded by a caller-supplied deadline
    async fn ensure_running_within(
        &self,
        launch: &ContainerLaunch,
        deadline: Duration,
    ) -> Result<()> {
        tokio::time::timeout(deadline, self.ensure_running(launch))
            .await
            .map_err(|_| {
                Error::timeout(format!("starting {} took longer than {:?}", launch.name, deadline))
            })?
    }
}
