//! # vnode-agent
//!
//! Virtual node agent (vnoded daemon) for vnode.
//!
//! This crate wires the pieces of a virtual node together: it resolves the
//! node's settings, keeps the authoritative record of workloads placed on
//! the node, provisions the tinc mesh container that backs the node's
//! network identity, and serves the lifecycle over HTTP.

pub mod config;
pub mod provider;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use config::AgentConfig;
pub use provider::{NodeProvider, ProviderSettings, ProvisionReport, StageOutcome};
pub use server::HttpServer;
pub use store::NodeStateStore;

use std::sync::Arc;
use tracing::info;
use vnode_core::SettingsSource;
use vnode_runtime::{ContainerRuntime, DockerCli, RecordingRuntime};

// Error handling
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Core error: {0}")]
    Core(#[from] vnode_core::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// Load the node settings named by the configuration
///
/// Without a provider config path every node resolves to the defaults.
pub fn load_settings(config: &AgentConfig) -> Result<SettingsSource> {
    match &config.node.provider_config {
        Some(path) => {
            info!("Loading node settings from: {}", path.display());
            Ok(SettingsSource::from_file(path)?)
        }
        None => Ok(SettingsSource::empty()),
    }
}

/// Container runtime selected by the configuration
pub fn build_runtime(config: &AgentConfig) -> Arc<dyn ContainerRuntime> {
    if config.runtime.dry_run {
        info!("Dry run: runtime calls are recorded, not executed");
        Arc::new(RecordingRuntime::new())
    } else {
        Arc::new(DockerCli::new(
            &config.runtime.binary,
            config.runtime.command_timeout(),
        ))
    }
}

/// Provider parameters taken from the configuration
pub fn provider_settings(config: &AgentConfig) -> ProviderSettings {
    ProviderSettings {
        node_name: config.node.name.clone(),
        internal_ip: config.node.internal_ip.clone(),
        daemon_port: config.node.daemon_port,
        topology: config.mesh.topology.clone(),
        work_dir: config.mesh.work_dir.clone(),
        image: config.mesh.image.clone(),
        privileged: config.mesh.privileged,
    }
}

/// Build the node provider described by the configuration
pub fn build_provider(config: &AgentConfig) -> Result<NodeProvider> {
    let source = load_settings(config)?;
    let provider = NodeProvider::new(provider_settings(config), &source, build_runtime(config))?;
    Ok(provider)
}

/// Initialize the provider and serve it until shutdown
pub async fn run_agent(config: &AgentConfig) -> Result<()> {
    config.validate()?;

    info!("Starting vnode agent for node {}", config.node.name);
    let provider = build_provider(config)?;

    HttpServer::new(Arc::new(provider))
        .serve(config.server.bind_addr)
        .await
}

/// Initialize logging and tracing
pub fn init_logging(logging_config: &config::LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging_config.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(logging_config.show_target)
        .with_thread_ids(logging_config.show_thread_ids)
        .with_line_number(logging_config.show_line_numbers);

    let result = match logging_config.format.as_str() {
        "json" => subscriber.json().try_init(),
        _ => subscriber.try_init(),
    };

    result.map_err(|e| AgentError::Config(format!("Failed to initialize logging: {}", e)))
}
