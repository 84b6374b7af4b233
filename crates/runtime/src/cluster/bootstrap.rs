//! Bootstrapper that runs a machine's installers inside its container via
//! pod exec.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bootstrap::{Bootstrapper, BootstrapperFactory};
use crate::error::RuntimeError;
use crate::model::{Installer, RuntimeIdentity};

/// Builds [`ExecBootstrapper`]s against one namespace. The cancellation
/// token is the start attempt's interrupt channel: cancelling it aborts
/// whichever installer is currently running.
pub struct ExecBootstrapperFactory {
    client: Client,
    namespace: String,
    cancel: CancellationToken,
}

impl ExecBootstrapperFactory {
    #[must_use]
    pub fn new(client: Client, namespace: &str, cancel: CancellationToken) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            cancel,
        }
    }
}

impl BootstrapperFactory for ExecBootstrapperFactory {
    fn create(
        &self,
        _identity: &RuntimeIdentity,
        machine_name: &str,
        installers: &[Installer],
    ) -> Arc<dyn Bootstrapper> {
        Arc::new(ExecBootstrapper {
            pods: Api::namespaced(self.client.clone(), &self.namespace),
            machine_name: machine_name.to_string(),
            installers: installers.to_vec(),
            cancel: self.cancel.clone(),
        })
    }
}

/// Runs a machine's installer scripts sequentially with `sh -c` inside the
/// machine's container.
pub struct ExecBootstrapper {
    pods: Api<Pod>,
    machine_name: String,
    installers: Vec<Installer>,
    cancel: CancellationToken,
}

#[async_trait]
impl Bootstrapper for ExecBootstrapper {
    async fn bootstrap(&self) -> anyhow::Result<()> {
        let Some((pod, container)) = self.machine_name.split_once('/') else {
            return Err(RuntimeError::internal(format!(
                "malformed machine name '{}'",
                self.machine_name
            ))
            .into());
        };
        for installer in &self.installers {
            info!(
                machine = %self.machine_name,
                installer = %installer.id,
                "running installer"
            );
            tokio::select! {
                () = self.cancel.cancelled() => {
                    return Err(RuntimeError::Cancelled(format!(
                        "installer '{}' on machine '{}' was interrupted",
                        installer.id, self.machine_name
                    ))
                    .into());
                }
                result = self.run_installer(pod, container, installer) => result?,
            }
        }
        debug!(machine = %self.machine_name, "all installers finished");
        Ok(())
    }
}

impl ExecBootstrapper {
    async fn run_installer(
        &self,
        pod: &str,
        container: &str,
        installer: &Installer,
    ) -> anyhow::Result<()> {
        let params = AttachParams::default()
            .container(container)
            .stdout(true)
            .stderr(true);
        let mut process = self
            .pods
            .exec(pod, ["sh", "-c", installer.script.as_str()], &params)
            .await
            .map_err(RuntimeError::from)?;

        if let Some(status) = process.take_status() {
            if let Some(status) = status.await {
                if status.status.as_deref() == Some("Failure") {
                    let message = status
                        .message
                        .unwrap_or_else(|| "installer script failed".to_string());
                    return Err(RuntimeError::Infrastructure(format!(
                        "installer '{}' failed: {message}",
                        installer.id
                    ))
                    .into());
                }
            }
        }
        process.join().await.map_err(RuntimeError::internal)?;
        Ok(())
    }
}
