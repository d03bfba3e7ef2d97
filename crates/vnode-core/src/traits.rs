//! Lifecycle contract consumed by the orchestrator
//!
//! The orchestrator dictates the shape of this interface. Providers
//! implement [`NodeLifecycle`] so the node logic can be exercised without the
//! orchestrator present.

use crate::{
    Capacity, DaemonEndpoints, NodeAddress, NodeCondition, Result, StatsSummary, Workload,
    WorkloadStatus,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Workload and node operations a virtual node provider supports
#[async_trait]
pub trait NodeLifecycle: Send + Sync {
    /// Accept a new workload and provision whatever backs it
    async fn create_workload(&self, workload: Workload) -> Result<()>;

    /// Replace the stored record of an existing workload
    async fn update_workload(&self, workload: Workload) -> Result<()>;

    /// Forget a workload and tear down whatever backs it
    async fn delete_workload(&self, workload: &Workload) -> Result<()>;

    /// Fetch a workload by namespace and name
    async fn get_workload(&self, namespace: &str, name: &str) -> Result<Arc<Workload>>;

    /// List every workload known to the node
    async fn list_workloads(&self) -> Result<Vec<Arc<Workload>>>;

    /// Report the status of a workload
    async fn get_workload_status(&self, namespace: &str, name: &str) -> Result<WorkloadStatus>;

    /// Retrieve container logs
    async fn get_workload_logs(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
        tail: Option<usize>,
    ) -> Result<String>;

    /// Run a command inside a workload container
    async fn exec_in_workload(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
        command: &[String],
    ) -> Result<()>;

    /// Resource capacity of the node
    async fn capacity(&self) -> Capacity;

    /// Conditions reported in the node status
    async fn node_conditions(&self) -> Vec<NodeCondition>;

    /// Addresses reported in the node status
    async fn node_addresses(&self) -> Vec<NodeAddress>;

    /// Daemon endpoints reported in the node status
    async fn daemon_endpoints(&self) -> DaemonEndpoints;

    /// Operating system of the node
    fn operating_system(&self) -> &'static str;

    /// Resource usage summary
    async fn stats_summary(&self) -> Result<StatsSummary>;
}
