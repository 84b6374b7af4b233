//! Kube-backed implementations of the namespace and bootstrapper seams.

pub mod bootstrap;
pub mod pods;
pub mod pvcs;
pub mod routes;
pub mod services;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};
use kube::api::{Api, DeleteParams, ListParams};
use kube::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use crate::error::RuntimeError;
use crate::model::{Route, ORIGINAL_NAME_LABEL, WORKSPACE_ID_LABEL};
use crate::namespace::{PodClients, PvcClients, RouteClients, ServiceClients, WorkspaceNamespace};

pub use bootstrap::{ExecBootstrapper, ExecBootstrapperFactory};
pub use pods::KubePods;
pub use pvcs::KubePvcs;
pub use routes::KubeRoutes;
pub use services::KubeServices;

/// Label selector matching every object of one workspace.
#[must_use]
pub fn workspace_selector(workspace_id: &str) -> String {
    format!("{WORKSPACE_ID_LABEL}={workspace_id}")
}

/// Stamp the ownership and original-name labels onto an object before it
/// is created. An already-present original-name label is preserved.
pub(crate) fn stamp_labels<K: kube::Resource>(obj: &mut K, workspace_id: &str) {
    let declared = obj.meta().name.clone().unwrap_or_default();
    let labels = obj.meta_mut().labels.get_or_insert_with(BTreeMap::new);
    labels
        .entry(WORKSPACE_ID_LABEL.to_string())
        .or_insert_with(|| workspace_id.to_string());
    labels
        .entry(ORIGINAL_NAME_LABEL.to_string())
        .or_insert(declared);
}

async fn delete_collection_ignoring_missing<K>(api: &Api<K>, lp: &ListParams) -> anyhow::Result<()>
where
    K: Clone + DeserializeOwned + std::fmt::Debug,
{
    match api.delete_collection(&DeleteParams::default(), lp).await {
        Ok(_) => Ok(()),
        // Nothing to delete, or the resource kind is not installed.
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(err) => Err(RuntimeError::from(err).into()),
    }
}

/// A cluster namespace owning all objects of one workspace runtime,
/// addressed through typed clients and cleaned up by label selector.
pub struct KubeNamespace {
    client: Client,
    namespace: String,
    workspace_id: String,
    pvcs: Arc<KubePvcs>,
    services: Arc<KubeServices>,
    routes: Arc<KubeRoutes>,
    pods: Arc<KubePods>,
}

impl KubeNamespace {
    #[must_use]
    pub fn new(client: Client, namespace: &str, workspace_id: &str) -> Self {
        Self {
            pvcs: Arc::new(KubePvcs::new(client.clone(), namespace, workspace_id)),
            services: Arc::new(KubeServices::new(client.clone(), namespace, workspace_id)),
            routes: Arc::new(KubeRoutes::new(client.clone(), namespace, workspace_id)),
            pods: Arc::new(KubePods::new(client.clone(), namespace, workspace_id)),
            client,
            namespace: namespace.to_string(),
            workspace_id: workspace_id.to_string(),
        }
    }
}

#[async_trait]
impl WorkspaceNamespace for KubeNamespace {
    fn persistent_volume_claims(&self) -> Arc<dyn PvcClients> {
        Arc::clone(&self.pvcs) as Arc<dyn PvcClients>
    }

    fn services(&self) -> Arc<dyn ServiceClients> {
        Arc::clone(&self.services) as Arc<dyn ServiceClients>
    }

    fn routes(&self) -> Arc<dyn RouteClients> {
        Arc::clone(&self.routes) as Arc<dyn RouteClients>
    }

    fn pods(&self) -> Arc<dyn PodClients> {
        Arc::clone(&self.pods) as Arc<dyn PodClients>
    }

    #[instrument(skip(self), fields(namespace = %self.namespace, workspace_id = %self.workspace_id))]
    async fn clean_up(&self) -> anyhow::Result<()> {
        debug!("deleting every object owned by the workspace");
        // Stop observing before deleting, so our own teardown is never
        // reported as an abnormal termination.
        self.pods.stop_watching().await;

        let lp = ListParams::default().labels(&workspace_selector(&self.workspace_id));
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        delete_collection_ignoring_missing(&pods, &lp).await?;
        let services: Api<Service> = Api::namespaced(self.client.clone(), &self.namespace);
        delete_collection_ignoring_missing(&services, &lp).await?;
        let routes: Api<Route> = Api::namespaced(self.client.clone(), &self.namespace);
        delete_collection_ignoring_missing(&routes, &lp).await?;
        let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), &self.namespace);
        delete_collection_ignoring_missing(&pvcs, &lp).await?;
        Ok(())
    }
}
