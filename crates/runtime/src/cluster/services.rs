//! Service client for one workspace namespace.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, ListParams, PostParams};
use kube::Client;

use crate::error::RuntimeError;
use crate::namespace::ServiceClients;

use super::{stamp_labels, workspace_selector};

pub struct KubeServices {
    api: Api<Service>,
    selector: String,
    workspace_id: String,
}

impl KubeServices {
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
impl ServiceClients for KubeServices {
    async fn list(&self) -> anyhow::Result<Vec<Service>> {
        let list = self
            .api
            .list(&ListParams::default().labels(&self.selector))
            .await
            .map_err(RuntimeError::from)?;
        Ok(list.items)
    }

    async fn create(&self, mut service: Service) -> anyhow::Result<Service> {
        stamp_labels(&mut service, &self.workspace_id);
        let created = self
            .api
            .create(&PostParams::default(), &service)
            .await
            .map_err(RuntimeError::from)?;
        Ok(created)
    }
}
