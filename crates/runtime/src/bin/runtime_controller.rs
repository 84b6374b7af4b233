//! Runtime controller CLI - starts and stops workspace runtimes against a
//! cluster namespace.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use workspace_runtime::cluster::{ExecBootstrapperFactory, KubeNamespace};
use workspace_runtime::rewrite::NoOpUrlRewriter;
use workspace_runtime::{
    BroadcastPublisher, EventPublisher, MachineStatus, MachineStatusEvent, RuntimeConfig,
    RuntimeContext, RuntimeIdentity, WorkspaceEnvironment, WorkspaceRuntime,
};

/// Start and stop workspace runtimes.
#[derive(Parser)]
#[command(name = "runtime-controller")]
#[command(about = "Provision and tear down workspace runtimes on a cluster")]
struct Cli {
    /// Cluster namespace holding the workspace's objects.
    #[arg(long, env = "WORKSPACE_NAMESPACE")]
    namespace: String,

    /// Workspace identifier.
    #[arg(long, env = "WORKSPACE_ID")]
    workspace_id: String,

    /// Environment name within the workspace.
    #[arg(long, default_value = "default")]
    environment_name: String,

    /// Owner of the workspace.
    #[arg(long, default_value = "system")]
    owner: String,

    /// Path to the runtime configuration file.
    #[arg(long, default_value = "/config/runtime.yaml")]
    config: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the environment and bootstrap every machine.
    Start {
        /// Path to the environment description (YAML).
        #[arg(long)]
        environment: PathBuf,
    },

    /// Tear the workspace's namespace objects down.
    Stop {
        /// Path to the environment description (YAML).
        #[arg(long)]
        environment: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = match RuntimeConfig::from_file(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "failed to load configuration, using defaults");
            RuntimeConfig::default()
        }
    };
    config.validate().context("invalid runtime configuration")?;

    let identity = RuntimeIdentity::new(&cli.workspace_id, &cli.environment_name, &cli.owner);

    match &cli.command {
        Commands::Start { environment } => {
            let environment = load_environment(environment)?;
            let runtime = build_runtime(&cli, &config, identity, environment).await?;
            runtime.start().await?;
            for (route, url) in runtime.exposed_urls()? {
                info!(route = %route, url = %url, "endpoint exposed");
            }
        }
        Commands::Stop { environment } => {
            let environment = load_environment(environment)?;
            let machines: Vec<String> =
                environment.machines.iter().map(|m| m.name.clone()).collect();
            let publisher = Arc::new(BroadcastPublisher::default());
            spawn_event_logger(&publisher);
            let runtime =
                build_runtime_with_publisher(&cli, &config, identity.clone(), environment, Arc::clone(&publisher))
                    .await?;
            // The lifecycle layer frames an explicit stop with machine
            // Stopping/Stopped events; the core itself does not emit them.
            for machine in &machines {
                publisher.publish(MachineStatusEvent::new(
                    identity.clone(),
                    machine,
                    MachineStatus::Stopping,
                ));
            }
            runtime.stop().await?;
            for machine in &machines {
                publisher.publish(MachineStatusEvent::new(
                    identity.clone(),
                    machine,
                    MachineStatus::Stopped,
                ));
            }
        }
    }
    Ok(())
}

fn load_environment(path: &Path) -> Result<WorkspaceEnvironment> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading environment file {}", path.display()))?;
    let environment: WorkspaceEnvironment =
        serde_yaml::from_str(&raw).context("parsing environment file")?;
    environment.validate()?;
    Ok(environment)
}

async fn build_runtime(
    cli: &Cli,
    config: &RuntimeConfig,
    identity: RuntimeIdentity,
    environment: WorkspaceEnvironment,
) -> Result<WorkspaceRuntime> {
    let publisher = Arc::new(BroadcastPublisher::default());
    spawn_event_logger(&publisher);
    build_runtime_with_publisher(cli, config, identity, environment, publisher).await
}

async fn build_runtime_with_publisher(
    cli: &Cli,
    config: &RuntimeConfig,
    identity: RuntimeIdentity,
    environment: WorkspaceEnvironment,
    publisher: Arc<BroadcastPublisher>,
) -> Result<WorkspaceRuntime> {
    let client = kube::Client::try_default()
        .await
        .context("building cluster client")?;
    let namespace = Arc::new(KubeNamespace::new(
        client.clone(),
        &cli.namespace,
        &cli.workspace_id,
    ));

    // Ctrl-C interrupts whichever installer is currently bootstrapping.
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling bootstrap");
                cancel.cancel();
            }
        }
    });

    let bootstrappers = Arc::new(ExecBootstrapperFactory::new(client, &cli.namespace, cancel));

    Ok(WorkspaceRuntime::new(
        RuntimeContext {
            identity,
            environment,
        },
        namespace,
        Arc::new(NoOpUrlRewriter),
        publisher,
        bootstrappers,
        config.machine_start_timeout(),
    ))
}

fn spawn_event_logger(publisher: &BroadcastPublisher) {
    let mut rx = publisher.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            info!(
                workspace_id = %event.identity.workspace_id,
                machine = %event.machine_name,
                status = ?event.status,
                "machine status"
            );
        }
    });
}
