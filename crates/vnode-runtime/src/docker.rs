//! Container runtime driven through the docker command line

use crate::{ContainerLaunch, ContainerRuntime, Removal};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use vnode_core::{Error, Result};

/// Default path of the docker binary
pub const DEFAULT_DOCKER_BINARY: &str = "/usr/bin/docker";

/// Default deadline for one runtime command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Marker printed by the runtime when removing an unknown container
const NO_SUCH_CONTAINER: &str = "No such container";

/// Output of a finished runtime command
#[derive(Debug, Clone)]
struct CommandOutput {
    success: bool,
    status: String,
    output: String,
}

/// Process-backed runtime driver
///
/// Each call spawns the runtime binary and waits for it up to the configured
/// timeout, or the deadline passed to the `_within` variants. A command that
/// misses its deadline is left running.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
    base_args: Vec<String>,
    timeout: Duration,
}

impl DockerCli {
    /// Create a driver for `binary` with a per-command deadline
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            base_args: Vec::new(),
            timeout,
        }
    }

    /// Arguments placed before every subcommand, e.g. `docker` when the
    /// binary is a wrapper such as `sudo`
    pub fn with_base_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.base_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Arguments for forcibly removing a container
    pub fn remove_args(name: &str) -> Vec<String> {
        vec!["rm".to_string(), "--force".to_string(), name.to_string()]
    }

    /// Arguments for launching a container
    pub fn run_args(launch: &ContainerLaunch) -> Vec<String> {
        let mut args = vec!["run".to_string()];
        if launch.privileged {
            args.push("--privileged".to_string());
        }
        args.push(format!("--name={}", launch.name));
        if launch.detached {
            args.push("--detach".to_string());
        }
        args.push("--rm".to_string());
        for mount in &launch.mounts {
            args.push(format!("--volume={}", mount.volume_arg()));
        }
        args.push(launch.image.clone());
        args
    }

    fn describe(&self, args: &[String]) -> String {
        let mut parts = vec![self.binary.display().to_string()];
        parts.extend(self.base_args.iter().cloned());
        parts.extend(args.iter().cloned());
        parts.join(" ")
    }

    async fn invoke(&self, args: &[String], deadline: Duration) -> Result<CommandOutput> {
        let description = self.describe(args);
        debug!("Running {}", description);

        let mut command = Command::new(&self.binary);
        command
            .args(&self.base_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = match timeout(deadline, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Error::runtime_failure(
                    description,
                    "not started",
                    format!("failed to spawn: {}", e),
                ))
            }
            Err(_) => {
                warn!("{} did not finish within {:?}", description, deadline);
                return Err(Error::timeout(format!(
                    "{} did not finish within {:?}",
                    description, deadline
                )));
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            output: combined,
        })
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new(DEFAULT_DOCKER_BINARY, DEFAULT_COMMAND_TIMEOUT)
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn ensure_absent(&self, name: &str) -> Result<Removal> {
        self.ensure_absent_within(name, self.timeout).await
    }

    async fn ensure_running(&self, launch: &ContainerLaunch) -> Result<()> {
        self.ensure_running_within(launch, self.timeout).await
    }

    async fn ensure_absent_within(&self, name: &str, deadline: Duration) -> Result<Removal> {
        let args = Self::remove_args(name);
        let result = self.invoke(&args, deadline).await?;

        if result.success {
            info!("Removed container {}", name);
            return Ok(Removal::Removed);
        }
        if result.output.contains(NO_SUCH_CONTAINER) {
            debug!("Container {} already absent", name);
            return Ok(Removal::AlreadyAbsent);
        }

        Err(Error::runtime_failure(
            self.describe(&args),
            result.status,
            result.output,
        ))
    }

    async fn ensure_running_within(
        &self,
        launch: &ContainerLaunch,
        deadline: Duration,
    ) -> Result<()> {
        let args = Self::run_args(launch);
        let result = self.invoke(&args, deadline).await?;

        if !result.success {
            return Err(Error::runtime_failure(
                self.describe(&args),
                result.status,
                result.output,
            ));
        }

        info!("Started container {} from {}", launch.name, launch.image);
        Ok(())
    }
}
