//! The runtime orchestrator: sequences provisioning, pod-watch
//! registration, per-machine bootstrap, event emission and
//! failure-triggered cleanup for both start and stop.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, instrument, warn};

use crate::bootstrap::BootstrapperFactory;
use crate::error::{classify, Result, RuntimeError};
use crate::events::{EventPublisher, MachineStatus, MachineStatusEvent};
use crate::model::{machine_names, original_name, RuntimeContext};
use crate::namespace::{AbnormalStopHandler, PodTermination, WorkspaceNamespace};
use crate::rewrite::UrlRewriter;

/// Observable lifecycle state of one workspace runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuntimeStatus {
    Stopped,
    Starting,
    Running,
    Failed(String),
}

/// Serializes cleanup across its two triggers (failed/stopped runtime vs.
/// watch-fired abnormal termination) and makes it idempotent: once the
/// namespace has been cleaned successfully, later triggers are no-ops.
struct CleanupGuard {
    done: Mutex<bool>,
}

impl CleanupGuard {
    fn new() -> Self {
        Self {
            done: Mutex::new(false),
        }
    }

    async fn run(&self, namespace: &dyn WorkspaceNamespace) -> anyhow::Result<()> {
        let mut done = self.done.lock().await;
        if *done {
            debug!("namespace already cleaned up, skipping");
            return Ok(());
        }
        namespace.clean_up().await?;
        *done = true;
        Ok(())
    }
}

/// Brings a declarative workspace environment to life on a cluster
/// namespace and tears it down again.
///
/// All collaborators are injected capability seams; the orchestrator owns
/// the decision of what to provision and when to destroy, never the
/// physical object lifecycle. Start/stop pairs for one identity are
/// expected to be serialized by the caller.
pub struct WorkspaceRuntime {
    context: RuntimeContext,
    namespace: Arc<dyn WorkspaceNamespace>,
    rewriter: Arc<dyn UrlRewriter>,
    events: Arc<dyn EventPublisher>,
    bootstrappers: Arc<dyn BootstrapperFactory>,
    machine_start_timeout: Duration,
    cleanup: Arc<CleanupGuard>,
    status: Arc<watch::Sender<RuntimeStatus>>,
}

impl WorkspaceRuntime {
    pub fn new(
        context: RuntimeContext,
        namespace: Arc<dyn WorkspaceNamespace>,
        rewriter: Arc<dyn UrlRewriter>,
        events: Arc<dyn EventPublisher>,
        bootstrappers: Arc<dyn BootstrapperFactory>,
        machine_start_timeout: Duration,
    ) -> Self {
        let (status, _) = watch::channel(RuntimeStatus::Stopped);
        Self {
            context,
            namespace,
            rewriter,
            events,
            bootstrappers,
            machine_start_timeout,
            cleanup: Arc::new(CleanupGuard::new()),
            status: Arc::new(status),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> RuntimeStatus {
        self.status.borrow().clone()
    }

    /// Observe lifecycle transitions, including a watch-fired failure
    /// after the runtime has reached `Running`.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RuntimeStatus> {
        self.status.subscribe()
    }

    /// Provision the environment and bootstrap every machine, in strict
    /// order. Any failure triggers exactly one cleanup attempt before the
    /// classified error is surfaced; a failing cleanup supersedes the
    /// original error in the returned value.
    #[instrument(skip(self), fields(workspace_id = %self.context.identity.workspace_id))]
    pub async fn start(&self) -> Result<()> {
        info!("starting workspace runtime");
        self.status.send_replace(RuntimeStatus::Starting);

        match self.provision_and_bootstrap().await {
            Ok(()) => {
                self.status.send_replace(RuntimeStatus::Running);
                info!("workspace runtime started");
                Ok(())
            }
            Err(err) => {
                let failure = classify(err);
                self.status
                    .send_replace(RuntimeStatus::Failed(failure.to_string()));
                if let Err(cleanup_err) = self.cleanup.run(self.namespace.as_ref()).await {
                    warn!(
                        superseded = %failure,
                        "cleanup after failed start also failed; surfacing the cleanup error"
                    );
                    return Err(classify(cleanup_err));
                }
                Err(failure)
            }
        }
    }

    /// Tear the runtime down. Idempotent against an already-cleaned
    /// namespace; cleanup errors are surfaced unchanged.
    #[instrument(skip(self), fields(workspace_id = %self.context.identity.workspace_id))]
    pub async fn stop(&self) -> Result<()> {
        info!("stopping workspace runtime");
        self.cleanup
            .run(self.namespace.as_ref())
            .await
            .map_err(classify)?;
        self.status.send_replace(RuntimeStatus::Stopped);
        Ok(())
    }

    /// Externally exposed URLs of the environment's routes, passed through
    /// the injected rewriter.
    pub fn exposed_urls(&self) -> Result<Vec<(String, String)>> {
        let mut urls = Vec::new();
        for route in &self.context.environment.routes {
            let Some(host) = route.spec.host.as_deref() else {
                continue;
            };
            let rewritten = self
                .rewriter
                .rewrite(&self.context.identity, &format!("http://{host}"))
                .map_err(classify)?;
            let name = original_name(&route.metadata).unwrap_or_default();
            urls.push((name.to_string(), rewritten));
        }
        Ok(urls)
    }

    async fn provision_and_bootstrap(&self) -> anyhow::Result<()> {
        let identity = &self.context.identity;
        let env = &self.context.environment;

        debug!("provisioning persistent volume claims");
        let pvcs = self.namespace.persistent_volume_claims();
        let existing: HashSet<String> = pvcs
            .list()
            .await?
            .into_iter()
            .filter_map(|pvc| pvc.metadata.name)
            .collect();
        for pvc in &env.persistent_volume_claims {
            let declared = pvc.metadata.name.as_deref().unwrap_or_default();
            if !existing.contains(declared) {
                pvcs.create(pvc.clone()).await?;
            }
        }

        debug!("provisioning services");
        let services = self.namespace.services();
        for service in &env.services {
            services.create(service.clone()).await?;
        }

        debug!("provisioning routes");
        let routes = self.namespace.routes();
        for route in &env.routes {
            routes.create(route.clone()).await?;
        }

        debug!("provisioning pods");
        let pod_clients = self.namespace.pods();
        let mut created = Vec::with_capacity(env.pods.len());
        for pod in &env.pods {
            let pod = pod_clients.create(pod.clone()).await?;
            // Abnormal termination after this point must be detected, so
            // the watch is registered before any bootstrap work starts.
            pod_clients.watch(self.abnormal_stop_handler()).await?;
            created.push(pod);
        }

        let machines = machine_names(&created);
        info!(machines = machines.len(), "machine set derived from created pods");

        // Full STARTING pass first: observers get the complete expected
        // machine set before any bootstrap begins.
        for machine in &machines {
            self.publish(machine, MachineStatus::Starting);
        }

        for machine in &machines {
            let installers = env
                .machine(machine)
                .map(|config| config.installers.as_slice())
                .unwrap_or(&[]);
            let bootstrapper = self.bootstrappers.create(identity, machine, installers);
            debug!(
                machine = %machine,
                installers = installers.len(),
                "bootstrapping machine"
            );
            match tokio::time::timeout(self.machine_start_timeout, bootstrapper.bootstrap()).await
            {
                Ok(Ok(())) => {
                    self.publish(machine, MachineStatus::Running);
                }
                Ok(Err(err)) => {
                    // A cancelled bootstrap is not a machine failure: no
                    // terminal event, no further machines.
                    if matches!(
                        err.downcast_ref::<RuntimeError>(),
                        Some(RuntimeError::Cancelled(_))
                    ) {
                        info!(machine = %machine, "bootstrap interrupted, aborting start");
                        return Err(err);
                    }
                    error!(machine = %machine, error = %err, "bootstrap failed");
                    self.publish(machine, MachineStatus::Failed);
                    return Err(err);
                }
                Err(_elapsed) => {
                    error!(
                        machine = %machine,
                        timeout_secs = self.machine_start_timeout.as_secs(),
                        "machine did not start within the configured timeout"
                    );
                    self.publish(machine, MachineStatus::Failed);
                    return Err(anyhow::Error::new(RuntimeError::Infrastructure(format!(
                        "machine '{machine}' did not start within {}s",
                        self.machine_start_timeout.as_secs()
                    ))));
                }
            }
        }
        Ok(())
    }

    fn publish(&self, machine: &str, status: MachineStatus) {
        self.events.publish(MachineStatusEvent::new(
            self.context.identity.clone(),
            machine,
            status,
        ));
    }

    /// Handler registered against created pods. Fires on the watcher's
    /// path of execution; drives the runtime into `Failed` and runs the
    /// guarded cleanup so an explicit stop never races it.
    fn abnormal_stop_handler(&self) -> AbnormalStopHandler {
        let namespace = Arc::clone(&self.namespace);
        let cleanup = Arc::clone(&self.cleanup);
        let status = Arc::clone(&self.status);
        let workspace_id = self.context.identity.workspace_id.clone();
        Arc::new(move |termination: PodTermination| {
            let namespace = Arc::clone(&namespace);
            let cleanup = Arc::clone(&cleanup);
            let status = Arc::clone(&status);
            let workspace_id = workspace_id.clone();
            tokio::spawn(async move {
                warn!(
                    workspace_id = %workspace_id,
                    pod = %termination.pod_name,
                    reason = %termination.reason,
                    "pod terminated abnormally, tearing the runtime down"
                );
                status.send_replace(RuntimeStatus::Failed(format!(
                    "pod '{}' terminated abnormally: {}",
                    termination.pod_name, termination.reason
                )));
                if let Err(err) = cleanup.run(namespace.as_ref()).await {
                    error!(
                        workspace_id = %workspace_id,
                        error = %err,
                        "cleanup after abnormal pod termination failed"
                    );
                }
            });
        })
    }
}
