//! Main binary for the vnode agent daemon (vnoded)

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use vnode_agent::{init_logging, load_settings, run_agent, AgentConfig};
use vnode_core::resolve;
use vnode_mesh::MeshRole;

#[derive(Parser)]
#[command(name = "vnoded")]
#[command(about = "Virtual node daemon backed by a tinc mesh container")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "VNODE_CONFIG")]
    config: Option<PathBuf>,

    /// Node name
    #[arg(long, value_name = "NAME", env = "VNODE_NODE_NAME")]
    node_name: Option<String>,

    /// Address reported as the node's internal IP
    #[arg(long, value_name = "IP", env = "VNODE_INTERNAL_IP")]
    internal_ip: Option<String>,

    /// JSON file with per-node settings
    #[arg(long, value_name = "FILE", env = "VNODE_PROVIDER_CONFIG")]
    provider_config: Option<PathBuf>,

    /// Directory receiving the generated mesh artifacts
    #[arg(long, value_name = "DIR", env = "VNODE_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// HTTP bind address
    #[arg(long, value_name = "ADDR", env = "VNODE_BIND_ADDR")]
    bind_addr: Option<SocketAddr>,

    /// Log level
    #[arg(long, value_name = "LEVEL", env = "VNODE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Record runtime calls instead of executing them
    #[arg(long, env = "VNODE_DRY_RUN")]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent
    Run,
    /// Generate default configuration
    Config {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate configuration and node settings
    Validate,
    /// Print the mesh configuration bundle for a role
    Render {
        /// Mesh role (main or peer)
        #[arg(long, default_value = "main")]
        role: MeshRole,

        /// Also write the artifacts into this directory
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config { ref output }) => generate_config(output.clone()),
        Some(Commands::Validate) => validate_config(&cli),
        Some(Commands::Render {
            role,
            ref output_dir,
        }) => render_bundle(&cli, role, output_dir.clone()),
        Some(Commands::Run) | None => start_agent(&cli).await,
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<AgentConfig> {
    let mut config = match &cli.config {
        Some(path) => AgentConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => AgentConfig::default(),
    };

    // Apply CLI overrides
    if let Some(name) = &cli.node_name {
        config.node.name = name.clone();
    }
    if let Some(ip) = &cli.internal_ip {
        config.node.internal_ip = ip.clone();
    }
    if let Some(path) = &cli.provider_config {
        config.node.provider_config = Some(path.clone());
    }
    if let Some(dir) = &cli.work_dir {
        config.mesh.work_dir = dir.clone();
    }
    if let Some(addr) = cli.bind_addr {
        config.server.bind_addr = addr;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if cli.dry_run {
        config.runtime.dry_run = true;
    }

    Ok(config)
}

async fn start_agent(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    init_logging(&config.logging)?;

    match &cli.config {
        Some(path) => info!("Loaded configuration from: {}", path.display()),
        None => info!("Using default configuration"),
    }

    run_agent(&config).await.context("agent failed")?;
    Ok(())
}

fn generate_config(output: Option<PathBuf>) -> anyhow::Result<()> {
    let config = AgentConfig::default();

    if let Some(output_path) = output {
        config.to_file(&output_path)?;
        println!("Generated configuration file: {}", output_path.display());
    } else {
        println!("{}", config.to_yaml()?);
    }

    Ok(())
}

fn validate_config(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    config.validate()?;

    let source = load_settings(&config)?;
    let effective = resolve(&source, &config.node.name)
        .with_context(|| format!("resolving settings for node {}", config.node.name))?;

    println!("Configuration is valid");
    println!("Node name: {}", config.node.name);
    println!("Internal IP: {}", config.node.internal_ip);
    println!("Mesh name: {}", effective.name);
    println!("Connect to: {}", effective.connect_to);
    println!(
        "Capacity: cpu={} memory={} pods={}",
        effective.cpu, effective.memory, effective.pods
    );
    println!("Work directory: {}", config.mesh.work_dir.display());
    println!("HTTP server: {}", config.server.bind_addr);

    Ok(())
}

fn render_bundle(cli: &Cli, role: MeshRole, output_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let source = load_settings(&config)?;
    let effective = resolve(&source, &config.node.name)?;

    let rendered = vnode_mesh::render(role, &effective, &config.mesh.topology);
    for artifact in rendered.bundle.artifacts() {
        println!(
            "# {} -> {}",
            artifact.kind.file_name(),
            artifact.kind.container_path()
        );
        print!("{}", artifact.contents);
        println!();
    }

    if let Some(dir) = output_dir {
        let dir = dir.join(&rendered.identity.node_name);
        rendered.bundle.write_to(&dir)?;
        println!("Wrote artifacts to {}", dir.display());
    }

    Ok(())
}
