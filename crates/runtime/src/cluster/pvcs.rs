//! Persistent volume claim client for one workspace namespace.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::api::{Api, ListParams, PostParams};
use kube::Client;
use kube::ResourceExt;
use tracing::debug;

use crate::error::RuntimeError;
use crate::namespace::PvcClients;

use super::{stamp_labels, workspace_selector};

pub struct KubePvcs {
    api: Api<PersistentVolumeClaim>,
    selector: String,
    workspace_id: String,
}

impl KubePvcs {
    #[must_use]
    pub fn new(client: Client, namespace: &str, workspace_id: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            selector: workspace_selector(workspace_id),
            workspace_id: workspace_id.to_string(),
        }
    }
}

#[async_trait]
impl PvcClients for KubePvcs {
    async fn list(&self) -> anyhow::Result<Vec<PersistentVolumeClaim>> {
        let list = self
            .api
            .list(&ListParams::default().labels(&self.selector))
            .await
            .map_err(RuntimeError::from)?;
        Ok(list.items)
    }

    async fn create(&self, mut pvc: PersistentVolumeClaim) -> anyhow::Result<PersistentVolumeClaim> {
        stamp_labels(&mut pvc, &self.workspace_id);
        match self.api.create(&PostParams::default(), &pvc).await {
            Ok(created) => Ok(created),
            // Claims survive across restarts; an existing one is reused.
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                debug!(pvc = %pvc.name_any(), "claim already exists, reusing it");
                Ok(pvc)
            }
            Err(err) => Err(RuntimeError::from(err).into()),
        }
    }
}
