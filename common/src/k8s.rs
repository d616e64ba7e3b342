// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! Cluster adapter: read surface over nodes, pods and workload controllers.
//!
//! All calls are stateless and tolerate concurrent invocation; callers apply
//! their own retry policy.

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
pub use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::api::{Api, ListParams};
use kube::Client;
use std::collections::BTreeMap;
use tracing::{debug, error};

use crate::error::{Result, RrsError};
use crate::schema::{NodeStatus, ServiceKind};

/// Label carrying the physical rack assignment of a management node.
pub const RACK_LABEL: &str = "topology.kubernetes.io/zone";

const CONTROL_PLANE_LABEL: &str = "node-role.kubernetes.io/control-plane";

/// Pod facts needed by the evaluator and the status API.
#[derive(Debug, Clone)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub node: Option<String>,
    pub phase: Option<String>,
    pub labels: BTreeMap<String, String>,
}

/// Replica counts and pod selector of a workload controller.
#[derive(Debug, Clone)]
pub struct WorkloadStatus {
    pub desired: i32,
    pub ready: i32,
    pub selector: BTreeMap<String, String>,
}

/// Thin client over the managed cluster.
#[derive(Clone)]
pub struct ClusterClient {
    client: Client,
}

impl ClusterClient {
    /// Connects using the in-cluster service account, falling back to the
    /// local kubeconfig outside the cluster.
    pub async fn new() -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| RrsError::Transient(format!("failed to build cluster client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn kube_client(&self) -> Client {
        self.client.clone()
    }

    pub async fn list_nodes(&self) -> Result<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let nodes = api.list(&ListParams::default()).await?;
        Ok(nodes.items)
    }

    /// Status of one node by name; `Unknown` when the node is not listed.
    pub async fn node_status_by_name(&self, name: &str) -> Result<NodeStatus> {
        let nodes = self.list_nodes().await?;
        Ok(nodes
            .iter()
            .find(|n| n.metadata.name.as_deref() == Some(name))
            .map(node_status)
            .unwrap_or(NodeStatus::Unknown))
    }

    /// Fetches all pods across all namespaces in a single call.
    pub async fn list_pods(&self) -> Result<Vec<PodInfo>> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let pods = api.list(&ListParams::default()).await?;
        Ok(pods
            .items
            .into_iter()
            .map(|pod| PodInfo {
                name: pod.metadata.name.unwrap_or_default(),
                namespace: pod.metadata.namespace.unwrap_or_default(),
                node: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
                phase: pod.status.as_ref().and_then(|s| s.phase.clone()),
                labels: pod.metadata.labels.unwrap_or_default(),
            })
            .collect())
    }

    /// Replica counts and selector of a workload controller, dispatched on
    /// the registered kind. `NotFound` when the controller is absent.
    pub async fn workload_status(
        &self,
        kind: ServiceKind,
        name: &str,
        namespace: &str,
    ) -> Result<WorkloadStatus> {
        match kind {
            ServiceKind::Deployment => {
                let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
                let app = api.get(name).await?;
                let status = app.status.unwrap_or_default();
                Ok(WorkloadStatus {
                    desired: status.replicas.unwrap_or(0),
                    ready: status.ready_replicas.unwrap_or(0),
                    selector: app
                        .spec
                        .and_then(|s| s.selector.match_labels)
                        .unwrap_or_default(),
                })
            }
            ServiceKind::StatefulSet => {
                let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
                let app = api.get(name).await?;
                let status = app.status.unwrap_or_default();
                Ok(WorkloadStatus {
                    desired: status.replicas,
                    ready: status.ready_replicas.unwrap_or(0),
                    selector: app
                        .spec
                        .and_then(|s| s.selector.match_labels)
                        .unwrap_or_default(),
                })
            }
            ServiceKind::DaemonSet => {
                let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), namespace);
                let app = api.get(name).await?;
                let status = app.status.unwrap_or_default();
                Ok(WorkloadStatus {
                    desired: status.desired_number_scheduled,
                    ready: status.number_ready,
                    selector: app
                        .spec
                        .and_then(|s| s.selector.match_labels)
                        .unwrap_or_default(),
                })
            }
        }
    }

    /// Name of the node the current pod runs on, resolved through the pod's
    /// `HOSTNAME`.
    pub async fn current_node(&self, namespace: &str) -> Result<String> {
        let pod_name = std::env::var("HOSTNAME")
            .map_err(|_| RrsError::ConfigMissing("HOSTNAME".to_string()))?;
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod = api.get(&pod_name).await?;
        pod.spec
            .and_then(|s| s.node_name)
            .ok_or_else(|| RrsError::NotFound(format!("node of pod {}", pod_name)))
    }

    /// Reads the node-monitor grace period from the controller manager's
    /// command line, when discoverable.
    pub async fn node_monitor_grace_period(&self) -> Result<Option<u64>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), "kube-system");
        let params = ListParams::default().labels("component=kube-controller-manager");
        let pods = api.list(&params).await?;
        let Some(pod) = pods.items.first() else {
            error!("kube-controller-manager pod not found");
            return Ok(None);
        };
        let command = pod
            .spec
            .as_ref()
            .and_then(|s| s.containers.first())
            .and_then(|c| c.command.clone())
            .unwrap_or_default();
        Ok(parse_grace_period(&command))
    }

    /// Reads one key from a cluster secret, decoded as UTF-8.
    pub async fn read_secret_key(&self, namespace: &str, name: &str, key: &str) -> Result<String> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api.get(name).await?;
        let bytes = secret
            .data
            .and_then(|mut d| d.remove(key))
            .ok_or_else(|| RrsError::NotFound(format!("key {} in secret {}", key, name)))?;
        String::from_utf8(bytes.0)
            .map_err(|e| RrsError::Corrupt(format!("secret {} is not UTF-8: {}", name, e)))
    }
}

/// Extracts `--node-monitor-grace-period=40s` style flags into seconds.
fn parse_grace_period(command: &[String]) -> Option<u64> {
    let flag = command
        .iter()
        .find(|arg| arg.contains("--node-monitor-grace-period"))?;
    let value = flag.split('=').nth(1)?;
    value.trim_end_matches('s').parse::<u64>().ok()
}

/// Readiness of a node from its `Ready` condition.
pub fn node_status(node: &Node) -> NodeStatus {
    let conditions = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref());
    match conditions.and_then(|c| c.iter().find(|cond| cond.type_ == "Ready")) {
        Some(cond) if cond.status == "True" => NodeStatus::Ready,
        Some(_) => NodeStatus::NotReady,
        None => NodeStatus::Unknown,
    }
}

/// Rack label of a node, when present.
pub fn node_rack(node: &Node) -> Option<String> {
    node.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(RACK_LABEL))
        .cloned()
}

/// True for control-plane (master) nodes.
pub fn is_control_plane(node: &Node) -> bool {
    node.metadata
        .labels
        .as_ref()
        .map(|labels| labels.contains_key(CONTROL_PLANE_LABEL))
        .unwrap_or(false)
}

/// Node name → rack mapping for all labelled nodes.
pub fn node_rack_map(nodes: &[Node]) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for node in nodes {
        if let (Some(name), Some(rack)) = (node.metadata.name.clone(), node_rack(node)) {
            map.insert(name, rack);
        } else {
            debug!(
                "Node {:?} has no rack label, skipping",
                node.metadata.name
            );
        }
    }
    map
}

/// True when every selector label is present with the same value.
pub fn selector_matches(labels: &BTreeMap<String, String>, selector: &BTreeMap<String, String>) -> bool {
    !selector.is_empty()
        && selector
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
}
