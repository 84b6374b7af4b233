//! Pod client for one workspace namespace, including the abnormal
//! termination watch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, PostParams};
use kube::runtime::watcher;
use kube::Client;
use kube::ResourceExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::RuntimeError;
use crate::namespace::{AbnormalStopHandler, PodClients, PodTermination};

use super::{stamp_labels, workspace_selector};

pub struct KubePods {
    api: Api<Pod>,
    selector: String,
    workspace_id: String,
    handlers: Arc<Mutex<Vec<AbnormalStopHandler>>>,
    watcher_task: Mutex<Option<JoinHandle<()>>>,
}

impl KubePods {
    #[must_use]
    pub fn new(client: Client, namespace: &str, workspace_id: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            selector: workspace_selector(workspace_id),
            workspace_id: workspace_id.to_string(),
            handlers: Arc::new(Mutex::new(Vec::new())),
            watcher_task: Mutex::new(None),
        }
    }

    /// Abort the watcher and drop every registered handler. Called before
    /// cleanup so our own teardown is not reported as abnormal.
    pub async fn stop_watching(&self) {
        if let Some(task) = self.watcher_task.lock().await.take() {
            task.abort();
        }
        self.handlers.lock().await.clear();
    }
}

#[async_trait]
impl PodClients for KubePods {
    async fn list(&self) -> anyhow::Result<Vec<Pod>> {
        let list = self
            .api
            .list(&ListParams::default().labels(&self.selector))
            .await
            .map_err(RuntimeError::from)?;
        Ok(list.items)
    }

    async fn create(&self, mut pod: Pod) -> anyhow::Result<Pod> {
        stamp_labels(&mut pod, &self.workspace_id);
        let created = self
            .api
            .create(&PostParams::default(), &pod)
            .await
            .map_err(RuntimeError::from)?;
        Ok(created)
    }

    async fn watch(&self, handler: AbnormalStopHandler) -> anyhow::Result<()> {
        self.handlers.lock().await.push(handler);

        // One underlying watcher task serves every registration.
        let mut task = self.watcher_task.lock().await;
        if task.is_none() {
            debug!(selector = %self.selector, "starting pod lifecycle watcher");
            *task = Some(tokio::spawn(run_watcher(
                self.api.clone(),
                self.selector.clone(),
                Arc::clone(&self.handlers),
            )));
        }
        Ok(())
    }
}

async fn run_watcher(
    api: Api<Pod>,
    selector: String,
    handlers: Arc<Mutex<Vec<AbnormalStopHandler>>>,
) {
    let config = watcher::Config::default().labels(&selector);
    let stream = watcher(api, config);
    futures::pin_mut!(stream);
    loop {
        match stream.try_next().await {
            Ok(Some(watcher::Event::Apply(pod))) => {
                if let Some(termination) = termination_of(&pod) {
                    fire(&handlers, termination).await;
                }
            }
            Ok(Some(watcher::Event::Delete(pod))) => {
                fire(
                    &handlers,
                    PodTermination {
                        pod_name: pod.name_any(),
                        reason: "pod was deleted out of band".to_string(),
                    },
                )
                .await;
            }
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "pod watch stream error, retrying");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

fn termination_of(pod: &Pod) -> Option<PodTermination> {
    let status = pod.status.as_ref()?;
    match status.phase.as_deref() {
        // A workspace pod is expected to run until torn down; any exit is
        // abnormal.
        Some("Failed") | Some("Succeeded") => Some(PodTermination {
            pod_name: pod.name_any(),
            reason: status
                .reason
                .clone()
                .unwrap_or_else(|| format!("pod entered {} phase", status.phase.as_deref().unwrap_or("terminal"))),
        }),
        _ => None,
    }
}

async fn fire(handlers: &Mutex<Vec<AbnormalStopHandler>>, termination: PodTermination) {
    warn!(
        pod = %termination.pod_name,
        reason = %termination.reason,
        "observed abnormal pod termination"
    );
    for handler in handlers.lock().await.iter() {
        handler(termination.clone());
    }
}
