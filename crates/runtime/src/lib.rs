//! Workspace runtime orchestration.
//!
//! Brings a declarative workspace environment to life on a cluster
//! namespace (PVCs, services, routes, pods), bootstraps each machine in
//! order while publishing status events, and guarantees that partial
//! failures never leave stray cluster resources behind.

pub mod bootstrap;
pub mod cluster;
pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod namespace;
pub mod orchestrator;
pub mod rewrite;

pub use config::RuntimeConfig;
pub use error::{classify, Result, RuntimeError};
pub use events::{BroadcastPublisher, EventPublisher, MachineStatus, MachineStatusEvent};
pub use model::{
    machine_name, machine_names, original_name, Installer, MachineConfig, MachineDecl, Route,
    RouteSpec, RuntimeContext, RuntimeIdentity, WorkspaceEnvironment, ORIGINAL_NAME_LABEL,
    WORKSPACE_ID_LABEL,
};
pub use orchestrator::{RuntimeStatus, WorkspaceRuntime};
