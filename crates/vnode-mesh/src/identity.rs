//! Mesh roles, topology and per-call identity
//!
//! A [`MeshIdentity`] is computed for each provisioning call from the role
//! annotation of the triggering workload. It is a plain value: nothing about
//! one workload's identity leaks into the next call.

use serde::{Deserialize, Serialize};
use std::fmt;
use vnode_core::config::DEFAULT_REMOTE_PEERS;
use vnode_core::{EffectiveConfig, Workload, MESH_ROLE_ANNOTATION};

/// Default public address of the main node
pub const DEFAULT_MAIN_ADDRESS: &str = "172.17.0.2";

/// Default public address of the peer node
pub const DEFAULT_PEER_ADDRESS: &str = "172.17.0.3";

/// Default private address of the main node
pub const DEFAULT_MAIN_PRIVATE_ADDRESS: &str = "10.1.1.1";

/// Default private address of the peer node
pub const DEFAULT_PEER_PRIVATE_ADDRESS: &str = "10.1.1.2";

/// Default mesh subnet
pub const DEFAULT_SUBNET: &str = "10.1.1.0/24";

/// Default port the mesh daemon listens on
pub const DEFAULT_PORT: u16 = 655;

/// Role this node plays in the mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeshRole {
    Main,
    Peer,
}

impl MeshRole {
    /// Role selected by an annotation value; anything but `peer` means main
    pub fn from_annotation(value: Option<&str>) -> Self {
        match value {
            Some("peer") => MeshRole::Peer,
            _ => MeshRole::Main,
        }
    }

    /// Role requested by a workload's annotations
    pub fn from_workload(workload: &Workload) -> Self {
        Self::from_annotation(workload.annotation(MESH_ROLE_ANNOTATION))
    }
}

impl std::str::FromStr for MeshRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "main" => Ok(MeshRole::Main),
            "peer" => Ok(MeshRole::Peer),
            _ => Err(format!("Unknown mesh role: {}", s)),
        }
    }
}

impl fmt::Display for MeshRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshRole::Main => write!(f, "main"),
            MeshRole::Peer => write!(f, "peer"),
        }
    }
}

/// Addressing parameters of the two-node mesh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshTopology {
    /// Public address of the main node
    pub main_address: String,

    /// Public address of the peer node
    pub peer_address: String,

    /// Address of the main node inside the mesh
    pub main_private_address: String,

    /// Address of the peer node inside the mesh
    pub peer_private_address: String,

    /// Subnet announced by every node
    pub subnet: String,

    /// Port every node listens on
    pub port: u16,
}

impl Default for MeshTopology {
    fn default() -> Self {
        Self {
            main_address: DEFAULT_MAIN_ADDRESS.to_string(),
            peer_address: DEFAULT_PEER_ADDRESS.to_string(),
            main_private_address: DEFAULT_MAIN_PRIVATE_ADDRESS.to_string(),
            peer_private_address: DEFAULT_PEER_PRIVATE_ADDRESS.to_string(),
            subnet: DEFAULT_SUBNET.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// A remote node bound in the startup directives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshPeer {
    pub name: String,
    pub address: String,
}

impl MeshPeer {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// Identity of this node within the mesh for one provisioning call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshIdentity {
    pub role: MeshRole,

    /// Mesh node name; also names the container
    pub node_name: String,

    /// Public address of this node
    pub address: String,

    /// Address assigned to the tunnel device
    pub private_address: String,

    /// Node this one connects to
    pub peer_name: String,

    /// Public address of that node
    pub peer_address: String,

    pub subnet: String,

    pub port: u16,
}

impl MeshIdentity {
    /// Resolve the identity for a role
    ///
    /// The main node takes the configured name and connects to the first
    /// connect-to entry. A peer takes the first connect-to entry as its own
    /// name and connects back to the main node.
    pub fn resolve(role: MeshRole, config: &EffectiveConfig, topology: &MeshTopology) -> Self {
        let main_name = config.name.clone();
        let first_peer = config
            .connect_to_peers()
            .first()
            .copied()
            .unwrap_or(DEFAULT_REMOTE_PEERS)
            .to_string();

        match role {
            MeshRole::Main => Self {
                role,
                node_name: main_name,
                address: topology.main_address.clone(),
                private_address: topology.main_private_address.clone(),
                peer_name: first_peer,
                peer_address: topology.peer_address.clone(),
                subnet: topology.subnet.clone(),
                port: topology.port,
            },
            MeshRole::Peer => Self {
                role,
                node_name: first_peer,
                address: topology.peer_address.clone(),
                private_address: topology.peer_private_address.clone(),
                peer_name: main_name,
                peer_address: topology.main_address.clone(),
                subnet: topology.subnet.clone(),
                port: topology.port,
            },
        }
    }

    /// Remote nodes to bind, derived from the configured connect-to entries
    pub fn peers(&self, config: &EffectiveConfig, topology: &MeshTopology) -> Vec<MeshPeer> {
        let mut peers = Vec::new();
        if self.role == MeshRole::Peer {
            peers.push(MeshPeer::new(&self.peer_name, &self.peer_address));
        }

        for name in config.connect_to_peers() {
            if name == self.node_name || peers.iter().any(|p| p.name == name) {
                continue;
            }
            peers.push(MeshPeer::new(name, &topology.peer_address));
        }

        peers
    }
}
