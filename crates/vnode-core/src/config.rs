//! Node settings resolution
//!
//! A settings source maps node names to partially filled [`NodeSettings`].
//! [`resolve`] merges the entry for one node with the built-in defaults and
//! validates the capacity fields, yielding an immutable [`EffectiveConfig`].

use crate::{Capacity, Error, Quantity, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Default for `AutoConnect`
pub const DEFAULT_AUTO_CONNECT: &str = "yes";

/// Default mesh node name of the main node
pub const DEFAULT_MAIN_NODE_NAME: &str = "nodemain";

/// Default remote peer the node connects to
pub const DEFAULT_REMOTE_PEERS: &str = "nodepeer";

/// Default tunnel device path
pub const DEFAULT_DEVICE: &str = "/dev/net/tun";

/// Tap device type
pub const DEVICE_TYPE_TAP: &str = "tap";

/// Dummy device type
pub const DEVICE_TYPE_DUMMY: &str = "dummy";

/// Router mesh mode
pub const MODE_ROUTER: &str = "router";

/// Switch mesh mode
pub const MODE_SWITCH: &str = "switch";

/// Default CPU capacity
pub const DEFAULT_CPU_CAPACITY: &str = "20";

/// Default memory capacity
pub const DEFAULT_MEMORY_CAPACITY: &str = "100Gi";

/// Default workload capacity
pub const DEFAULT_POD_CAPACITY: &str = "20";

/// Declarative settings for one node; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSettings {
    #[serde(rename = "autoconnect", default, skip_serializing_if = "Option::is_none")]
    pub auto_connect: Option<String>,
    #[serde(rename = "connect", default, skip_serializing_if = "Option::is_none")]
    pub connect_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(rename = "devicetype", default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pods: Option<String>,
}

/// Settings for any number of nodes, keyed by node name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettingsSource {
    nodes: HashMap<String, NodeSettings>,
}

impl SettingsSource {
    /// An empty source; every node resolves to the defaults
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a source from its JSON representation
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a source from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            Error::config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Builder pattern for adding a node entry
    pub fn with_node(mut self, node_name: impl Into<String>, settings: NodeSettings) -> Self {
        self.nodes.insert(node_name.into(), settings);
        self
    }

    /// Settings for a node, if present
    pub fn get(&self, node_name: &str) -> Option<&NodeSettings> {
        self.nodes.get(node_name)
    }
}

/// Fully defaulted and validated settings for one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub auto_connect: String,
    pub connect_to: String,
    pub device: String,
    pub device_type: String,
    pub mode: String,
    pub name: String,
    pub cpu: Quantity,
    pub memory: Quantity,
    pub pods: Quantity,
}

impl EffectiveConfig {
    /// The configured connect-to entries, in order
    pub fn connect_to_peers(&self) -> Vec<&str> {
        self.connect_to.split_whitespace().collect()
    }

    /// Capacity advertised by the node
    pub fn capacity(&self) -> Capacity {
        Capacity {
            cpu: self.cpu.clone(),
            memory: self.memory.clone(),
            pods: self.pods.clone(),
        }
    }
}

/// Resolve the effective configuration for `node_name`
///
/// A missing entry is not an error: the node runs with the defaults.
pub fn resolve(source: &SettingsSource, node_name: &str) -> Result<EffectiveConfig> {
    match source.get(node_name) {
        Some(settings) => {
            debug!("Resolving settings for node {}", node_name);
            resolve_settings(settings)
        }
        None => {
            debug!("No settings for node {}, using defaults", node_name);
            resolve_settings(&NodeSettings::default())
        }
    }
}

fn resolve_settings(settings: &NodeSettings) -> Result<EffectiveConfig> {
    let cpu = or_default(&settings.cpu, DEFAULT_CPU_CAPACITY);
    let memory = or_default(&settings.memory, DEFAULT_MEMORY_CAPACITY);
    let pods = or_default(&settings.pods, DEFAULT_POD_CAPACITY);

    Ok(EffectiveConfig {
        auto_connect: or_default(&settings.auto_connect, DEFAULT_AUTO_CONNECT),
        connect_to: or_default(&settings.connect_to, DEFAULT_REMOTE_PEERS),
        device: or_default(&settings.device, DEFAULT_DEVICE),
        device_type: or_default(&settings.device_type, DEVICE_TYPE_TAP),
        mode: or_default(&settings.mode, MODE_SWITCH),
        name: or_default(&settings.name, DEFAULT_MAIN_NODE_NAME),
        cpu: parse_capacity("cpu", &cpu)?,
        memory: parse_capacity("memory", &memory)?,
        pods: parse_capacity("pods", &pods)?,
    })
}

fn or_default(value: &Option<String>, default: &str) -> String {
    match value.as_deref() {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

fn parse_capacity(field: &str, value: &str) -> Result<Quantity> {
    Quantity::parse(value).map_err(|_| Error::invalid_quantity(field, value))
}
