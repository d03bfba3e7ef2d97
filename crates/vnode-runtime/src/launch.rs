//! Description of a container to launch

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default image of the mesh container
pub const DEFAULT_MESH_IMAGE: &str = "quay.io/dongsupark/tinc";

/// A host path made visible inside the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    pub host_path: PathBuf,
    pub container_path: PathBuf,
}

impl BindMount {
    pub fn new(host_path: impl Into<PathBuf>, container_path: impl Into<PathBuf>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
        }
    }

    /// The `host:container` form used on the command line
    pub fn volume_arg(&self) -> String {
        format!(
            "{}:{}",
            self.host_path.display(),
            self.container_path.display()
        )
    }
}

/// Everything needed to start one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerLaunch {
    pub name: String,
    pub image: String,
    pub mounts: Vec<BindMount>,
    pub privileged: bool,
    pub detached: bool,
}

impl ContainerLaunch {
    /// A privileged, detached launch with no mounts
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            mounts: Vec::new(),
            privileged: true,
            detached: true,
        }
    }

    /// Builder pattern for adding a mount
    pub fn with_mount(mut self, mount: BindMount) -> Self {
        self.mounts.push(mount);
        self
    }

    /// Builder pattern for replacing all mounts
    pub fn with_mounts(mut self, mounts: impl IntoIterator<Item = BindMount>) -> Self {
        self.mounts = mounts.into_iter().collect();
        self
    }

    pub fn with_privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn with_detached(mut self, detached: bool) -> Self {
        self.detached = detached;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_arg() {
        let mount = BindMount::new("/tmp/nodemain/vk-main.conf", "/service/tinc/data/tinc.conf");
        assert_eq!(
            mount.volume_arg(),
            "/tmp/nodemain/vk-main.conf:/service/tinc/data/tinc.conf"
        );
    }

    #[test]
    fn test_launch_builder() {
        let launch = ContainerLaunch::new("nodemain", DEFAULT_MESH_IMAGE)
            .with_mount(BindMount::new("/a", "/b"))
            .with_privileged(false);

        assert_eq!(launch.name, "nodemain");
        assert_eq!(launch.mounts.len(), 1);
        assert!(!launch.privileged);
        assert!(launch.detached);
    }
}
