//! Configuration management for the vnode agent

use crate::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vnode_mesh::MeshTopology;
use vnode_runtime::{DEFAULT_DOCKER_BINARY, DEFAULT_MESH_IMAGE};

/// Default name the node registers under
pub const DEFAULT_NODE_NAME: &str = "vk-tinc";

/// Default port of the HTTP control surface
pub const DEFAULT_SERVER_PORT: u16 = 10250;

/// Complete configuration for the vnode agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Node identity as seen by the orchestrator
    #[serde(default)]
    pub node: NodeConfig,

    /// Mesh container configuration
    #[serde(default)]
    pub mesh: MeshConfig,

    /// Container runtime configuration
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// HTTP control surface configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node identity configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node name; selects the entry in the provider settings file
    pub name: String,

    /// Address reported as the node's internal IP
    pub internal_ip: String,

    /// JSON file with per-node settings (optional)
    pub provider_config: Option<PathBuf>,

    /// Port reported as the node daemon endpoint
    pub daemon_port: u16,
}

/// Mesh container configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Addresses, subnet and port of the mesh
    #[serde(flatten)]
    pub topology: MeshTopology,

    /// Parent of the per-node artifact directories
    pub work_dir: PathBuf,

    /// Image of the mesh container
    pub image: String,

    /// Run the mesh container privileged
    pub privileged: bool,
}

/// Container runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Path of the runtime binary
    pub binary: PathBuf,

    /// Deadline for one runtime command (seconds)
    pub command_timeout_seconds: u64,

    /// Record runtime calls instead of executing them
    pub dry_run: bool,
}

/// HTTP control surface configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub bind_addr: SocketAddr,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,

    /// Show target in logs
    pub show_target: bool,

    /// Show thread IDs in logs
    pub show_thread_ids: bool,

    /// Show line numbers in logs
    pub show_line_numbers: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NODE_NAME.to_string(),
            internal_ip: Ipv4Addr::LOCALHOST.to_string(),
            provider_config: None,
            daemon_port: vnode_mesh::identity::DEFAULT_PORT,
        }
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            topology: MeshTopology::default(),
            work_dir: std::env::temp_dir(),
            image: DEFAULT_MESH_IMAGE.to_string(),
            privileged: true,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_DOCKER_BINARY),
            command_timeout_seconds: 60,
            dry_run: false,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_SERVER_PORT)),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            show_target: true,
            show_thread_ids: false,
            show_line_numbers: false,
        }
    }
}

impl RuntimeConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }
}

impl AgentConfig {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AgentError::Config(format!("Failed to read config file: {}", e)))?;

        let config: AgentConfig = serde_yaml::from_str(&content)
            .map_err(|e| AgentError::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_yaml()?)
            .map_err(|e| AgentError::Config(format!("Failed to write config file: {}", e)))
    }

    /// Serialize configuration as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| AgentError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.node.name.is_empty() {
            return Err(AgentError::Config("Node name cannot be empty".to_string()));
        }

        parse_ip("node.internal_ip", &self.node.internal_ip)?;
        parse_ip("mesh.main_address", &self.mesh.topology.main_address)?;
        parse_ip("mesh.peer_address", &self.mesh.topology.peer_address)?;
        parse_ip("mesh.main_private_address", &self.mesh.topology.main_private_address)?;
        parse_ip("mesh.peer_private_address", &self.mesh.topology.peer_private_address)?;

        match self.mesh.topology.subnet.split_once('/') {
            Some((network, prefix)) if prefix.parse::<u8>().is_ok() => {
                parse_ip("mesh.subnet", network)?;
            }
            _ => {
                return Err(AgentError::Config(format!(
                    "Invalid mesh.subnet: {}",
                    self.mesh.topology.subnet
                )))
            }
        }

        if self.mesh.topology.port == 0 {
            return Err(AgentError::Config("Mesh port must be greater than 0".to_string()));
        }

        if self.mesh.image.is_empty() {
            return Err(AgentError::Config("Mesh image cannot be empty".to_string()));
        }

        if self.runtime.command_timeout_seconds == 0 {
            return Err(AgentError::Config(
                "Runtime command timeout must be greater than 0".to_string(),
            ));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(AgentError::Config(format!(
                    "Invalid log level: {}",
                    self.logging.level
                )))
            }
        }

        match self.logging.format.as_str() {
            "text" | "json" => {}
            _ => {
                return Err(AgentError::Config(format!(
                    "Invalid log format: {}",
                    self.logging.format
                )))
            }
        }

        Ok(())
    }
}

fn parse_ip(field: &str, value: &str) -> Result<IpAddr> {
    value
        .parse()
        .map_err(|_| AgentError::Config(format!("Invalid {}: {}", field, value)))
}
