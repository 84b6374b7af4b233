//! Route client for one workspace namespace.

use async_trait::async_trait;
use kube::api::{Api, ListParams, PostParams};
use kube::Client;

use crate::error::RuntimeError;
use crate::model::Route;
use crate::namespace::RouteClients;

use super::{stamp_labels, workspace_selector};

pub struct KubeRoutes {
    api: Api<Route>,
    selector: String,
    workspace_id: String,
}

impl KubeRoutes {
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
impl RouteClients for KubeRoutes {
    async fn list(&self) -> anyhow::Result<Vec<Route>> {
        let list = self
            .api
            .list(&ListParams::default().labels(&self.selector))
            .await
            .map_err(RuntimeError::from)?;
        Ok(list.items)
    }

    async fn create(&self, mut route: Route) -> anyhow::Result<Route> {
        stamp_labels(&mut route, &self.workspace_id);
        let created = self
            .api
            .create(&PostParams::default(), &route)
            .await
            .map_err(RuntimeError::from)?;
        Ok(created)
    }
}
