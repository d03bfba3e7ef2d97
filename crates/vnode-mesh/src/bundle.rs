//! Rendered configuration artifacts and their placement on disk

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use vnode_core::{Error, Result};

/// Mode of the per-node host directory
pub const DIRECTORY_MODE: u32 = 0o775;

/// The three files that configure a mesh container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// `add` directives consumed by the container entrypoint
    StartupDirectives,
    /// Main daemon configuration file
    DaemonConfig,
    /// Script run once the tunnel device exists
    UpScript,
}

impl ArtifactKind {
    /// File name inside the host directory
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::StartupDirectives => "vk-startup-config.conf",
            ArtifactKind::DaemonConfig => "vk-main.conf",
            ArtifactKind::UpScript => "vk-tinc-up",
        }
    }

    /// Path the file is mounted at inside the container
    pub fn container_path(&self) -> &'static str {
        match self {
            ArtifactKind::StartupDirectives => "/environment/default.startup.conf",
            ArtifactKind::DaemonConfig => "/service/tinc/data/tinc.conf",
            ArtifactKind::UpScript => "/service/tinc/data/tinc-up",
        }
    }

    /// Permission bits of the written file
    pub fn mode(&self) -> u32 {
        match self {
            ArtifactKind::UpScript => 0o755,
            _ => 0o644,
        }
    }
}

/// One rendered file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub contents: String,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, contents: String) -> Self {
        Self { kind, contents }
    }
}

/// A host file paired with where it appears in the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMount {
    pub host_path: PathBuf,
    pub container_path: PathBuf,
}

/// Rendered mesh configuration for one provisioning cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigBundle {
    startup: Artifact,
    daemon: Artifact,
    up_script: Artifact,
}

impl ConfigBundle {
    pub(crate) fn new(startup: Artifact, daemon: Artifact, up_script: Artifact) -> Self {
        Self {
            startup,
            daemon,
            up_script,
        }
    }

    pub fn startup_directives(&self) -> &Artifact {
        &self.startup
    }

    pub fn daemon_config(&self) -> &Artifact {
        &self.daemon
    }

    pub fn up_script(&self) -> &Artifact {
        &self.up_script
    }

    /// All artifacts, in mount order
    pub fn artifacts(&self) -> [&Artifact; 3] {
        [&self.startup, &self.daemon, &self.up_script]
    }

    /// Write every artifact into `dir`, replacing existing files
    ///
    /// The directory is created if needed. Returns the bind mounts for the
    /// written files.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<ArtifactMount>> {
        fs::create_dir_all(dir).map_err(|e| Error::filesystem(dir, e))?;
        set_mode(dir, DIRECTORY_MODE)?;

        for artifact in self.artifacts() {
            let path = dir.join(artifact.kind.file_name());
            fs::write(&path, artifact.contents.as_bytes())
                .map_err(|e| Error::filesystem(&path, e))?;
            set_mode(&path, artifact.kind.mode())?;
            debug!("Wrote {} ({} bytes)", path.display(), artifact.contents.len());
        }

        Ok(self.mounts(dir))
    }

    /// Bind mounts for the artifacts as they would be placed in `dir`
    pub fn mounts(&self, dir: &Path) -> Vec<ArtifactMount> {
        self.artifacts()
            .iter()
            .map(|artifact| ArtifactMount {
                host_path: dir.join(artifact.kind.file_name()),
                container_path: PathBuf::from(artifact.kind.container_path()),
            })
            .collect()
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| Error::filesystem(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> ConfigBundle {
        ConfigBundle::new(
            Artifact::new(ArtifactKind::StartupDirectives, "add Name = nodemain\n".to_string()),
            Artifact::new(ArtifactKind::DaemonConfig, "Name = nodemain\n".to_string()),
            Artifact::new(ArtifactKind::UpScript, "#!/bin/bash\n".to_string()),
        )
    }

    #[test]
    fn test_mounts_pair_host_and_container_paths() {
        let mounts = bundle().mounts(Path::new("/tmp/nodemain"));
        assert_eq!(mounts.len(), 3);
        assert_eq!(mounts[0].host_path, PathBuf::from("/tmp/nodemain/vk-startup-config.conf"));
        assert_eq!(mounts[0].container_path, PathBuf::from("/environment/default.startup.conf"));
        assert_eq!(mounts[1].host_path, PathBuf::from("/tmp/nodemain/vk-main.conf"));
        assert_eq!(mounts[1].container_path, PathBuf::from("/service/tinc/data/tinc.conf"));
        assert_eq!(mounts[2].host_path, PathBuf::from("/tmp/nodemain/vk-tinc-up"));
        assert_eq!(mounts[2].container_path, PathBuf::from("/service/tinc/data/tinc-up"));
    }

    #[test]
    fn test_write_creates_directory_and_files() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("nodemain");

        let mounts = bundle().write_to(&dir).unwrap();
        assert_eq!(mounts, bundle().mounts(&dir));
        assert_eq!(
            fs::read_to_string(dir.join("vk-main.conf")).unwrap(),
            "Name = nodemain\n"
        );
        assert_eq!(
            fs::read_to_string(dir.join("vk-tinc-up")).unwrap(),
            "#!/bin/bash\n"
        );
    }

    #[test]
    fn test_write_overwrites_previous_contents() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("vk-main.conf");
        fs::write(&path, "stale contents that are longer than the new ones\n").unwrap();

        bundle().write_to(root.path()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "Name = nodemain\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_write_sets_modes() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("nodemain");
        bundle().write_to(&dir).unwrap();

        let mode = |p: PathBuf| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(dir.clone()), 0o775);
        assert_eq!(mode(dir.join("vk-startup-config.conf")), 0o644);
        assert_eq!(mode(dir.join("vk-main.conf")), 0o644);
        assert_eq!(mode(dir.join("vk-tinc-up")), 0o755);
    }

    #[test]
    fn test_write_failure_names_path() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("occupied");
        fs::write(&blocker, "not a directory").unwrap();

        let err = bundle().write_to(&blocker.join("nodemain")).unwrap_err();
        match err {
            Error::FilesystemFailure { path, .. } => assert!(path.starts_with(&blocker)),
            other => panic!("unexpected error: {other}"),
        }
    }
}
