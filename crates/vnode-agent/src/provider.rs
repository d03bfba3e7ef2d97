//! Node provider backed by a tinc mesh container
//!
//! The provider keeps the authoritative record of workloads placed on the
//! node and, on create and delete, drives the mesh container through a
//! [`ContainerRuntime`]. Each provisioning run leaves a [`ProvisionReport`]
//! describing how far it got; the report surfaces in the workload status as
//! the `MeshProvisioned` condition.

use crate::store::NodeStateStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use vnode_core::{
    resolve, Capacity, ConditionStatus, ContainerState, ContainerStatus, DaemonEndpoints,
    EffectiveConfig, Error, NodeAddress, NodeAddressType, NodeCondition, NodeLifecycle, Result,
    SettingsSource, StatsSummary, Workload, WorkloadCondition, WorkloadKey, WorkloadPhase,
    WorkloadStatus, OPERATING_SYSTEM_LINUX,
};
use vnode_mesh::{ArtifactMount, MeshIdentity, MeshRole, MeshTopology};
use vnode_runtime::{BindMount, ContainerLaunch, ContainerRuntime, Removal, DEFAULT_MESH_IMAGE};

/// Workload condition reporting the state of the mesh container
pub const MESH_PROVISIONED_CONDITION: &str = "MeshProvisioned";

/// Static parameters of a provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    /// Name the node registers under
    pub node_name: String,

    /// Address reported as the node's internal IP
    pub internal_ip: String,

    /// Port reported as the node daemon endpoint
    pub daemon_port: u16,

    pub topology: MeshTopology,

    /// Parent of the per-node artifact directories
    pub work_dir: PathBuf,

    pub image: String,

    pub privileged: bool,
}

impl ProviderSettings {
    pub fn new(node_name: impl Into<String>, internal_ip: impl Into<String>) -> Self {
        let topology = MeshTopology::default();
        Self {
            node_name: node_name.into(),
            internal_ip: internal_ip.into(),
            daemon_port: topology.port,
            topology,
            work_dir: std::env::temp_dir(),
            image: DEFAULT_MESH_IMAGE.to_string(),
            privileged: true,
        }
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_topology(mut self, topology: MeshTopology) -> Self {
        self.topology = topology;
        self
    }
}

/// Outcome of one provisioning stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    Succeeded,
    /// Failed but provisioning went on
    Tolerated { error: String },
    Failed { error: String },
    /// Not attempted because an earlier stage failed
    Skipped,
}

impl StageOutcome {
    fn failed(error: &Error) -> Self {
        StageOutcome::Failed {
            error: error.to_string(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed { .. })
    }
}

/// What happened while provisioning the mesh container for a workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub role: MeshRole,
    /// Name of the mesh container
    pub container: String,
    pub private_address: String,
    pub artifacts: StageOutcome,
    pub removal: StageOutcome,
    pub launch: StageOutcome,
    pub started_at: DateTime<Utc>,
}

impl ProvisionReport {
    fn begin(identity: &MeshIdentity) -> Self {
        Self {
            role: identity.role,
            container: identity.node_name.clone(),
            private_address: identity.private_address.clone(),
            artifacts: StageOutcome::Skipped,
            removal: StageOutcome::Skipped,
            launch: StageOutcome::Skipped,
            started_at: Utc::now(),
        }
    }

    /// Whether the mesh container was started
    pub fn is_provisioned(&self) -> bool {
        self.launch == StageOutcome::Succeeded
    }

    /// Status condition summarizing this report
    pub fn condition(&self) -> WorkloadCondition {
        if self.is_provisioned() {
            return WorkloadCondition::new(MESH_PROVISIONED_CONDITION, ConditionStatus::True)
                .with_reason(
                    "ContainerStarted",
                    format!("mesh container {} started", self.container),
                );
        }

        let (reason, error) = match (&self.artifacts, &self.launch) {
            (StageOutcome::Failed { error }, _) => ("ArtifactWriteFailed", error.as_str()),
            (_, StageOutcome::Failed { error }) => ("ContainerStartFailed", error.as_str()),
            _ => ("ProvisioningIncomplete", "provisioning did not finish"),
        };
        WorkloadCondition::new(MESH_PROVISIONED_CONDITION, ConditionStatus::False)
            .with_reason(reason, error)
    }
}

/// Virtual node provider
pub struct NodeProvider {
    settings: ProviderSettings,
    config: EffectiveConfig,
    store: NodeStateStore,
    reports: RwLock<HashMap<WorkloadKey, ProvisionReport>>,
    runtime: Arc<dyn ContainerRuntime>,
    /// Held across a create's store write and provisioning run, and across a
    /// delete, so runtime calls for the mesh container never interleave
    provisioning: Mutex<()>,
}

impl std::fmt::Debug for NodeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeProvider")
            .field("settings", &self.settings)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl NodeProvider {
    /// Create a provider, resolving the node's settings from `source`
    ///
    /// Fails when the settings for this node hold invalid capacity values.
    pub fn new(
        settings: ProviderSettings,
        source: &SettingsSource,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Self> {
        let config = resolve(source, &settings.node_name)?;
        info!(
            "Node {} resolved: mesh name {}, connect to {}, capacity cpu={} memory={} pods={}",
            settings.node_name,
            config.name,
            config.connect_to,
            config.cpu,
            config.memory,
            config.pods
        );

        Ok(Self {
            settings,
            config,
            store: NodeStateStore::new(),
            reports: RwLock::new(HashMap::new()),
            runtime,
            provisioning: Mutex::new(()),
        })
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    pub fn config(&self) -> &EffectiveConfig {
        &self.config
    }

    pub fn store(&self) -> &NodeStateStore {
        &self.store
    }

    /// The report left by the latest provisioning run for a workload
    pub async fn provision_report(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ProvisionReport>> {
        let key = WorkloadKey::build(namespace, name)?;
        Ok(self.reports.read().await.get(&key).cloned())
    }

    /// Host directory holding the artifacts for a mesh node
    pub fn artifact_dir(&self, mesh_node_name: &str) -> PathBuf {
        self.settings.work_dir.join(mesh_node_name)
    }

    async fn provision(&self, key: &WorkloadKey, role: MeshRole) -> Result<()> {
        let rendered = vnode_mesh::render(role, &self.config, &self.settings.topology);
        let identity = &rendered.identity;
        let mut report = ProvisionReport::begin(identity);
        let dir = self.artifact_dir(&identity.node_name);

        info!(
            "Provisioning mesh container {} as {} for {}",
            identity.node_name, role, key
        );

        let mounts = match rendered.bundle.write_to(&dir) {
            Ok(mounts) => {
                report.artifacts = StageOutcome::Succeeded;
                mounts
            }
            Err(e) => {
                error!("Failed to write mesh artifacts to {}: {}", dir.display(), e);
                report.artifacts = StageOutcome::failed(&e);
                self.record(key, report).await;
                return Err(e);
            }
        };

        report.removal = match self.runtime.ensure_absent(&identity.node_name).await {
            Ok(Removal::Removed) => {
                debug!("Removed previous mesh container {}", identity.node_name);
                StageOutcome::Succeeded
            }
            Ok(Removal::AlreadyAbsent) => StageOutcome::Succeeded,
            Err(e) => {
                warn!(
                    "Ignoring failure to remove mesh container {}: {}",
                    identity.node_name, e
                );
                StageOutcome::Tolerated {
                    error: e.to_string(),
                }
            }
        };

        let launch = self.launch_for(identity, &mounts);
        let result = self.runtime.ensure_running(&launch).await;
        match &result {
            Ok(()) => {
                info!("Mesh container {} running", identity.node_name);
                report.launch = StageOutcome::Succeeded;
            }
            Err(e) => {
                error!("Failed to start mesh container {}: {}", identity.node_name, e);
                report.launch = StageOutcome::failed(e);
            }
        }

        self.record(key, report).await;
        result
    }

    fn launch_for(&self, identity: &MeshIdentity, mounts: &[ArtifactMount]) -> ContainerLaunch {
        ContainerLaunch::new(&identity.node_name, &self.settings.image)
            .with_mounts(
                mounts
                    .iter()
                    .map(|m| BindMount::new(&m.host_path, &m.container_path)),
            )
            .with_privileged(self.settings.privileged)
    }

    async fn record(&self, key: &WorkloadKey, report: ProvisionReport) {
        self.reports.write().await.insert(key.clone(), report);
    }

    async fn lookup(&self, namespace: &str, name: &str) -> Result<(WorkloadKey, Arc<Workload>)> {
        let key = WorkloadKey::build(namespace, name)?;
        match self.store.get(&key).await {
            Some(workload) => Ok((key, workload)),
            None => Err(Error::not_found(format!("workload {}", key))),
        }
    }
}

#[async_trait]
impl NodeLifecycle for NodeProvider {
    async fn create_workload(&self, workload: Workload) -> Result<()> {
        let key = WorkloadKey::for_workload(&workload)?;
        let role = MeshRole::from_workload(&workload);
        info!("Creating workload {}", key);

        let _provisioning = self.provisioning.lock().await;
        self.store.put(key.clone(), workload).await;
        self.provision(&key, role).await
    }

    async fn update_workload(&self, workload: Workload) -> Result<()> {
        let key = WorkloadKey::for_workload(&workload)?;
        info!("Updating workload {}", key);

        self.store.put(key, workload).await;
        Ok(())
    }

    async fn delete_workload(&self, workload: &Workload) -> Result<()> {
        let key = WorkloadKey::for_workload(workload)?;
        info!("Deleting workload {}", key);

        let _provisioning = self.provisioning.lock().await;
        let removed = self.store.delete(&key).await?;
        let report = self.reports.write().await.remove(&key);

        let container = match report {
            Some(report) => report.container,
            None => {
                let role = MeshRole::from_workload(&removed);
                MeshIdentity::resolve(role, &self.config, &self.settings.topology).node_name
            }
        };

        match self.runtime.ensure_absent(&container).await {
            Ok(_) => {
                info!("Mesh container {} removed for {}", container, key);
                Ok(())
            }
            Err(e) => {
                error!("Failed to remove mesh container {}: {}", container, e);
                Err(e)
            }
        }
    }

    async fn get_workload(&self, namespace: &str, name: &str) -> Result<Arc<Workload>> {
        debug!("Getting workload {}/{}", namespace, name);
        let (_, workload) = self.lookup(namespace, name).await?;
        Ok(workload)
    }

    async fn list_workloads(&self) -> Result<Vec<Arc<Workload>>> {
        Ok(self.store.list().await)
    }

    async fn get_workload_status(&self, namespace: &str, name: &str) -> Result<WorkloadStatus> {
        let (key, workload) = self.lookup(namespace, name).await?;
        let report = self.reports.read().await.get(&key).cloned();

        let (pod_ip, start_time, mesh_condition) = match &report {
            Some(report) => (
                report.private_address.clone(),
                report.started_at,
                report.condition(),
            ),
            None => {
                let role = MeshRole::from_workload(&workload);
                let identity = MeshIdentity::resolve(role, &self.config, &self.settings.topology);
                (
                    identity.private_address,
                    Utc::now(),
                    WorkloadCondition::new(MESH_PROVISIONED_CONDITION, ConditionStatus::Unknown)
                        .with_reason("NotProvisioned", "no provisioning run recorded"),
                )
            }
        };

        let container_statuses = workload
            .spec
            .containers
            .iter()
            .map(|c| ContainerStatus {
                name: c.name.clone(),
                image: c.image.clone(),
                ready: true,
                restart_count: 0,
                state: ContainerState::Running {
                    started_at: start_time,
                },
            })
            .collect();

        Ok(WorkloadStatus {
            phase: WorkloadPhase::Running,
            host_ip: self.settings.internal_ip.clone(),
            pod_ip,
            start_time,
            conditions: vec![
                WorkloadCondition::new("Initialized", ConditionStatus::True),
                WorkloadCondition::new("Ready", ConditionStatus::True),
                WorkloadCondition::new("PodScheduled", ConditionStatus::True),
                mesh_condition,
            ],
            container_statuses,
        })
    }

    async fn get_workload_logs(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
        tail: Option<usize>,
    ) -> Result<String> {
        let key = WorkloadKey::build(namespace, name)?;
        debug!("Logs requested for {} container {} (tail {:?})", key, container, tail);
        Ok(String::new())
    }

    async fn exec_in_workload(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
        command: &[String],
    ) -> Result<()> {
        let key = WorkloadKey::build(namespace, name)?;
        debug!("Exec in {} container {}: {:?}", key, container, command);
        Ok(())
    }

    async fn capacity(&self) -> Capacity {
        self.config.capacity()
    }

    async fn node_conditions(&self) -> Vec<NodeCondition> {
        let now = Utc::now();
        vec![
            NodeCondition::observed(
                "Ready",
                ConditionStatus::True,
                "KubeletReady",
                "kubelet is ready.",
                now,
            ),
            NodeCondition::observed(
                "OutOfDisk",
                ConditionStatus::False,
                "KubeletHasSufficientDisk",
                "kubelet has sufficient disk space available",
                now,
            ),
            NodeCondition::observed(
                "MemoryPressure",
                ConditionStatus::False,
                "KubeletHasSufficientMemory",
                "kubelet has sufficient memory available",
                now,
            ),
            NodeCondition::observed(
                "DiskPressure",
                ConditionStatus::False,
                "KubeletHasNoDiskPressure",
                "kubelet has no disk pressure",
                now,
            ),
            NodeCondition::observed(
                "NetworkUnavailable",
                ConditionStatus::False,
                "RouteCreated",
                "RouteController created a route",
                now,
            ),
        ]
    }

    async fn node_addresses(&self) -> Vec<NodeAddress> {
        vec![NodeAddress {
            kind: NodeAddressType::InternalIP,
            address: self.settings.internal_ip.clone(),
        }]
    }

    async fn daemon_endpoints(&self) -> DaemonEndpoints {
        DaemonEndpoints {
            kubelet_port: self.settings.daemon_port,
        }
    }

    fn operating_system(&self) -> &'static str {
        OPERATING_SYSTEM_LINUX
    }

    async fn stats_summary(&self) -> Result<StatsSummary> {
        Ok(StatsSummary::default())
    }
}
