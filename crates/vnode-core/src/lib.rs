//! # vnode-core
//!
//! Core types, traits, and utilities for vnode - a virtual compute node
//! backed by a tinc mesh participant running in a container.
//!
//! This crate provides the foundational pieces shared by the other vnode
//! crates:
//!
//! - Workload records, keys and status types
//! - Resource quantity parsing for node capacity
//! - Node settings resolution into an effective configuration
//! - The lifecycle trait implemented by node providers
//! - Error handling types

pub mod config;
pub mod error;
pub mod quantity;
pub mod traits;
pub mod types;

// Re-export commonly used types at the crate root
pub use config::{resolve, EffectiveConfig, NodeSettings, SettingsSource};
pub use error::{Error, Result};
pub use quantity::{ParseQuantityError, Quantity};
pub use traits::NodeLifecycle;
pub use types::{
    Capacity, ConditionStatus, ContainerSpec, ContainerState, ContainerStatus, DaemonEndpoints,
    EnvVar, NodeAddress, NodeAddressType, NodeCondition, StatsSummary, Workload,
    WorkloadCondition, WorkloadKey, WorkloadMeta, WorkloadPhase, WorkloadSpec, WorkloadStatus,
    MESH_ROLE_ANNOTATION, OPERATING_SYSTEM_LINUX,
};
