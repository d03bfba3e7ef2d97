//! # vnode-mesh
//!
//! Mesh configuration for the container backing a vnode.
//!
//! This crate turns an effective node configuration and a mesh role into
//! the files a tinc container needs:
//!
//! - Topology defaults and per-call node identity ([`identity`])
//! - Deterministic rendering of the configuration bundle ([`generator`])
//! - Writing the bundle to a host directory and deriving bind mounts ([`bundle`])

pub mod bundle;
pub mod generator;
pub mod identity;

pub use bundle::{Artifact, ArtifactKind, ArtifactMount, ConfigBundle};
pub use generator::{generate, TUNNEL_INTERFACE};
pub use identity::{MeshIdentity, MeshPeer, MeshRole, MeshTopology};

use vnode_core::EffectiveConfig;

/// Identity and bundle rendered for one role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMesh {
    pub identity: MeshIdentity,
    pub peers: Vec<MeshPeer>,
    pub bundle: ConfigBundle,
}

/// Resolve the identity for `role` and render its bundle
pub fn render(role: MeshRole, config: &EffectiveConfig, topology: &MeshTopology) -> RenderedMesh {
    let identity = MeshIdentity::resolve(role, config, topology);
    let peers = identity.peers(config, topology);
    let bundle = generate(config, &identity, &peers);
    RenderedMesh {
        identity,
        peers,
        bundle,
    }
}
