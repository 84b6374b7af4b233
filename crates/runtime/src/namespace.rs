//! Collaborator traits for the cluster namespace owning a runtime's
//! objects. The orchestrator only ever talks to these seams; the
//! kube-backed implementations live in [`crate::cluster`].

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};

use crate::model::Route;

/// Client for persistent volume claims in the namespace.
#[async_trait]
pub trait PvcClients: Send + Sync {
    async fn list(&self) -> anyhow::Result<Vec<PersistentVolumeClaim>>;
    async fn create(&self, pvc: PersistentVolumeClaim) -> anyhow::Result<PersistentVolumeClaim>;
}

/// Client for services in the namespace.
#[async_trait]
pub trait ServiceClients: Send + Sync {
    async fn list(&self) -> anyhow::Result<Vec<Service>>;
    async fn create(&self, service: Service) -> anyhow::Result<Service>;
}

/// Client for routes in the namespace.
#[async_trait]
pub trait RouteClients: Send + Sync {
    async fn list(&self) -> anyhow::Result<Vec<Route>>;
    async fn create(&self, route: Route) -> anyhow::Result<Route>;
}

/// An unexpected terminal transition of an already-created pod: crash,
/// eviction, node loss. Not produced for deletions caused by an explicit
/// stop.
#[derive(Clone, Debug)]
pub struct PodTermination {
    pub pod_name: String,
    pub reason: String,
}

/// Callback invoked when a watched pod terminates abnormally. Runs on the
/// watcher's path of execution, concurrently with start/stop.
pub type AbnormalStopHandler = Arc<dyn Fn(PodTermination) + Send + Sync>;

/// Client for pods in the namespace.
#[async_trait]
pub trait PodClients: Send + Sync {
    async fn list(&self) -> anyhow::Result<Vec<Pod>>;
    async fn create(&self, pod: Pod) -> anyhow::Result<Pod>;
    /// Register a handler for abnormal terminations of the namespace's
    /// pods. Registration itself may be rejected by the watch API.
    async fn watch(&self, handler: AbnormalStopHandler) -> anyhow::Result<()>;
}

/// The cluster-side container for everything provisioned on behalf of one
/// runtime identity. Created lazily on first use.
#[async_trait]
pub trait WorkspaceNamespace: Send + Sync {
    fn persistent_volume_claims(&self) -> Arc<dyn PvcClients>;
    fn services(&self) -> Arc<dyn ServiceClients>;
    fn routes(&self) -> Arc<dyn RouteClients>;
    fn pods(&self) -> Arc<dyn PodClients>;

    /// Best-effort deletion of every object the namespace owns, regardless
    /// of how many were actually created. Idempotent.
    async fn clean_up(&self) -> anyhow::Result<()>;
}
