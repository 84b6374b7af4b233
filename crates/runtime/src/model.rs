//! Data model of a workspace runtime: identity, declarative environment,
//! machines and the cluster objects the environment asks for.

use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Label carrying the owning workspace id on every provisioned object.
/// Cleanup selects on it.
pub const WORKSPACE_ID_LABEL: &str = "workspace.infra/workspace-id";

/// Label preserving an object's name as declared in the environment,
/// before any uniquification applied by the environment author. External
/// callers use it to correlate a cluster object back to its declared name.
pub const ORIGINAL_NAME_LABEL: &str = "workspace.infra/original-name";

/// Addressable identity of one running workspace environment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuntimeIdentity {
    pub workspace_id: String,
    pub environment_name: String,
    pub owner_id: String,
}

impl RuntimeIdentity {
    pub fn new(
        workspace_id: impl Into<String>,
        environment_name: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            environment_name: environment_name.into(),
            owner_id: owner_id.into(),
        }
    }
}

/// A unit of in-container setup work declared in a machine's configuration,
/// executed by the bootstrapper after the container starts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Installer {
    /// Stable identifier, e.g. `org.workspace/exec-agent`.
    pub id: String,
    /// Shell script run inside the machine's container.
    pub script: String,
}

/// Configuration of one container-unit. May be empty (no bootstrap work).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineConfig {
    #[serde(default)]
    pub installers: Vec<Installer>,
}

/// One `(name, config)` entry of the environment's machine list. Kept as an
/// ordered sequence, never an unordered map: insertion order determines
/// event emission and bootstrap sequencing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MachineDecl {
    /// Machine name in `<podName>/<containerName>` form.
    pub name: String,
    #[serde(flatten, default)]
    pub config: MachineConfig,
}

/// OpenShift-style route exposing a service outside the cluster.
#[derive(CustomResource, Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(group = "route.openshift.io", version = "v1", kind = "Route", namespaced)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub to: RouteTargetReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<RoutePort>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteTargetReference {
    pub kind: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoutePort {
    pub target_port: i32,
}

/// Declarative description of the environment to provision: the machines
/// and the cluster objects backing them, all in declaration order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorkspaceEnvironment {
    #[serde(default)]
    pub machines: Vec<MachineDecl>,
    #[serde(default)]
    pub persistent_volume_claims: Vec<PersistentVolumeClaim>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub pods: Vec<Pod>,
}

impl WorkspaceEnvironment {
    /// Look up the configuration of one machine by name.
    #[must_use]
    pub fn machine(&self, name: &str) -> Option<&MachineConfig> {
        self.machines
            .iter()
            .find(|m| m.name == name)
            .map(|m| &m.config)
    }

    /// Check the environment's structural invariants: machine names are
    /// unique and use the `<podName>/<containerName>` format.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = std::collections::HashSet::new();
        for machine in &self.machines {
            match machine.name.split('/').collect::<Vec<_>>()[..] {
                [pod, container] if !pod.is_empty() && !container.is_empty() => {}
                _ => anyhow::bail!(
                    "machine name '{}' is not in <podName>/<containerName> form",
                    machine.name
                ),
            }
            if !seen.insert(machine.name.as_str()) {
                anyhow::bail!("machine name '{}' is declared twice", machine.name);
            }
        }
        Ok(())
    }
}

/// Bundles the identity and environment handed to the orchestrator.
#[derive(Clone, Debug)]
pub struct RuntimeContext {
    pub identity: RuntimeIdentity,
    pub environment: WorkspaceEnvironment,
}

/// Compose a machine name from its pod and container.
#[must_use]
pub fn machine_name(pod: &str, container: &str) -> String {
    format!("{pod}/{container}")
}

/// The name an object was declared with: the original-name label when
/// present, otherwise the object's metadata name.
#[must_use]
pub fn original_name(meta: &ObjectMeta) -> Option<&str> {
    meta.labels
        .as_ref()
        .and_then(|labels| labels.get(ORIGINAL_NAME_LABEL))
        .map(String::as_str)
        .or(meta.name.as_deref())
}

/// Derive the ordered machine set of a list of created pods: pod-creation
/// order first, container-declaration order within each pod.
#[must_use]
pub fn machine_names(pods: &[Pod]) -> Vec<String> {
    let mut names = Vec::new();
    for pod in pods {
        let pod_name = original_name(&pod.metadata).unwrap_or_default();
        if let Some(spec) = &pod.spec {
            for container in &spec.containers {
                names.push(machine_name(pod_name, &container.name));
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec};
    use std::collections::BTreeMap;

    fn pod(name: &str, containers: &[&str]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            spec: Some(PodSpec {
                containers: containers
                    .iter()
                    .map(|c| Container {
                        name: (*c).to_string(),
                        ..Container::default()
                    })
                    .collect(),
                ..PodSpec::default()
            }),
            ..Pod::default()
        }
    }

    #[test]
    fn machine_names_follow_pod_then_container_order() {
        let pods = vec![pod("app", &["main", "sidecar"]), pod("db", &["postgres"])];
        assert_eq!(
            machine_names(&pods),
            vec!["app/main", "app/sidecar", "db/postgres"]
        );
    }

    #[test]
    fn machine_names_prefer_original_name_label() {
        let mut uniquified = pod("app-x7f2", &["main"]);
        uniquified.metadata.labels = Some(BTreeMap::from([(
            ORIGINAL_NAME_LABEL.to_string(),
            "app".to_string(),
        )]));
        assert_eq!(machine_names(&[uniquified]), vec!["app/main"]);
    }

    #[test]
    fn validate_rejects_malformed_machine_names() {
        let env = WorkspaceEnvironment {
            machines: vec![MachineDecl {
                name: "no-container".into(),
                config: MachineConfig::default(),
            }],
            ..WorkspaceEnvironment::default()
        };
        assert!(env.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_machine_names() {
        let decl = MachineDecl {
            name: "app/main".into(),
            config: MachineConfig::default(),
        };
        let env = WorkspaceEnvironment {
            machines: vec![decl.clone(), decl],
            ..WorkspaceEnvironment::default()
        };
        assert!(env.validate().is_err());
    }

    #[test]
    fn machine_lookup_returns_declared_config() {
        let env = WorkspaceEnvironment {
            machines: vec![MachineDecl {
                name: "app/main".into(),
                config: MachineConfig {
                    installers: vec![Installer {
                        id: "org.workspace/exec-agent".into(),
                        script: "echo ready".into(),
                    }],
                },
            }],
            ..WorkspaceEnvironment::default()
        };
        assert_eq!(env.machine("app/main").unwrap().installers.len(), 1);
        assert!(env.machine("app/other").is_none());
    }
}
