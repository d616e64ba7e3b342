// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! Critical-service registry views and the additive registry update.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use common::configmap::DocStore;
use common::k8s::{node_rack_map, selector_matches, ClusterClient};
use common::schema::{
    utc_timestamp, Balanced, CriticalServiceDynamic, CriticalServiceStatic,
    CriticalServicesDynamic, CriticalServicesStatic, ServiceKind, ServiceStatus,
};
use common::setting::CRITICAL_SERVICE_KEY;
use common::{Result, RrsError};

const LAST_UPDATED_KEY: &str = "last_updated_timestamp";

#[derive(Debug, Serialize)]
pub struct ServiceSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ServiceKind,
}

#[derive(Debug, Serialize)]
pub struct ServiceStatusSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ServiceKind,
    pub status: ServiceStatus,
    pub balanced: Balanced,
}

/// Services grouped under their namespace, as consumed by operators.
#[derive(Debug, Serialize)]
pub struct GroupedServices<T> {
    pub namespace: BTreeMap<String, Vec<T>>,
}

#[derive(Debug, Serialize)]
pub struct CriticalServiceList {
    pub critical_services: GroupedServices<ServiceSummary>,
}

#[derive(Debug, Serialize)]
pub struct CriticalServiceStatusList {
    pub critical_services: GroupedServices<ServiceStatusSummary>,
}

#[derive(Debug, Serialize)]
pub struct ServiceDescribe {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Namespace")]
    pub namespace: String,
    #[serde(rename = "Type")]
    pub kind: ServiceKind,
    #[serde(rename = "Configured_Instances")]
    pub configured_instances: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct CriticalServiceDescribe {
    pub critical_service: ServiceDescribe,
}

#[derive(Debug, Serialize)]
pub struct PodSummary {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Node")]
    pub node: String,
    #[serde(rename = "Zone")]
    pub zone: String,
}

#[derive(Debug, Serialize)]
pub struct ServiceStatusDescribe {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Namespace")]
    pub namespace: String,
    #[serde(rename = "Type")]
    pub kind: ServiceKind,
    #[serde(rename = "Status")]
    pub status: ServiceStatus,
    #[serde(rename = "Balanced")]
    pub balanced: Balanced,
    #[serde(rename = "Configured_Instances")]
    pub configured_instances: Option<i32>,
    #[serde(rename = "Currently_Running_Instances")]
    pub running_instances: usize,
    #[serde(rename = "Pods")]
    pub pods: Vec<PodSummary>,
}

#[derive(Debug, Serialize)]
pub struct CriticalServiceStatusDescribe {
    pub critical_service: ServiceStatusDescribe,
}

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
    #[serde(rename = "Update")]
    pub update: String,
    #[serde(rename = "Successfully_Added_Services")]
    pub added: Vec<String>,
    #[serde(rename = "Already_Existing_Services")]
    pub existing: Vec<String>,
}

/// Outcome of merging an incoming registry into the existing one.
pub struct MergeOutcome {
    pub merged: BTreeMap<String, CriticalServiceStatic>,
    pub added: Vec<String>,
    pub existing: Vec<String>,
}

/// Additive merge: names already registered are left untouched and reported
/// back, new names are appended.
pub fn merge_registries(
    current: &BTreeMap<String, CriticalServiceStatic>,
    incoming: &BTreeMap<String, CriticalServiceStatic>,
) -> MergeOutcome {
    let mut merged = current.clone();
    let mut added = Vec::new();
    let mut existing = Vec::new();
    for (name, info) in incoming {
        if merged.contains_key(name) {
            existing.push(name.clone());
        } else {
            merged.insert(name.clone(), info.clone());
            added.push(name.clone());
        }
    }
    MergeOutcome {
        merged,
        added,
        existing,
    }
}

pub fn group_by_namespace(
    registry: &BTreeMap<String, CriticalServiceStatic>,
) -> BTreeMap<String, Vec<ServiceSummary>> {
    let mut grouped: BTreeMap<String, Vec<ServiceSummary>> = BTreeMap::new();
    for (name, info) in registry {
        grouped
            .entry(info.namespace.clone())
            .or_default()
            .push(ServiceSummary {
                name: name.clone(),
                kind: info.kind,
            });
    }
    grouped
}

pub fn group_status_by_namespace(
    registry: &BTreeMap<String, CriticalServiceDynamic>,
) -> BTreeMap<String, Vec<ServiceStatusSummary>> {
    let mut grouped: BTreeMap<String, Vec<ServiceStatusSummary>> = BTreeMap::new();
    for (name, info) in registry {
        grouped
            .entry(info.namespace.clone())
            .or_default()
            .push(ServiceStatusSummary {
                name: name.clone(),
                kind: info.kind,
                status: info.status,
                balanced: info.balanced,
            });
    }
    grouped
}

/// Operator registry from the static document.
pub async fn load_static_registry(
    store: &dyn DocStore,
    static_doc: &str,
) -> Result<CriticalServicesStatic> {
    let data = store.read(static_doc).await?;
    let content = data
        .get(CRITICAL_SERVICE_KEY)
        .ok_or_else(|| RrsError::NotFound(CRITICAL_SERVICE_KEY.to_string()))?;
    Ok(serde_json::from_str(content)?)
}

/// Evaluated registry from the dynamic document.
pub async fn load_dynamic_registry(
    store: &dyn DocStore,
    dynamic_doc: &str,
) -> Result<CriticalServicesDynamic> {
    let data = store.read(dynamic_doc).await?;
    let content = data
        .get(CRITICAL_SERVICE_KEY)
        .ok_or_else(|| RrsError::NotFound(CRITICAL_SERVICE_KEY.to_string()))?;
    Ok(serde_json::from_str(content)?)
}

/// Applies an additive registry update to the static document and refreshes
/// the update timestamp when anything was added.
pub async fn apply_update(
    store: &dyn DocStore,
    static_doc: &str,
    incoming: &CriticalServicesStatic,
) -> Result<UpdateResponse> {
    let current = load_static_registry(store, static_doc).await?;
    let outcome = merge_registries(&current.critical_services, &incoming.critical_services);

    if !outcome.added.is_empty() {
        let merged = CriticalServicesStatic {
            critical_services: outcome.merged,
        };
        store
            .update(
                static_doc,
                CRITICAL_SERVICE_KEY,
                &serde_json::to_string_pretty(&merged)?,
            )
            .await?;
        store
            .update(static_doc, LAST_UPDATED_KEY, &utc_timestamp())
            .await?;
    }
    info!(
        "Registry update: {} added, {} already existing",
        outcome.added.len(),
        outcome.existing.len()
    );

    Ok(UpdateResponse {
        update: if outcome.added.is_empty() {
            "Services Already Exist".to_string()
        } else {
            "Successful".to_string()
        },
        added: outcome.added,
        existing: outcome.existing,
    })
}

/// Registry view of one service with its live configured instance count.
pub async fn describe_service(
    cluster: &ClusterClient,
    name: &str,
    info: &CriticalServiceStatic,
) -> CriticalServiceDescribe {
    let configured_instances = match cluster
        .workload_status(info.kind, name, &info.namespace)
        .await
    {
        Ok(workload) => Some(workload.desired),
        Err(e) => {
            warn!("Cannot read {} {}: {}", info.kind, name, e);
            None
        }
    };
    CriticalServiceDescribe {
        critical_service: ServiceDescribe {
            name: name.to_string(),
            namespace: info.namespace.clone(),
            kind: info.kind,
            configured_instances,
        },
    }
}

/// Evaluated view of one service including live pod placement.
pub async fn describe_service_status(
    cluster: &ClusterClient,
    name: &str,
    info: &CriticalServiceDynamic,
) -> Result<CriticalServiceStatusDescribe> {
    let workload = cluster
        .workload_status(info.kind, name, &info.namespace)
        .await?;

    let nodes = cluster.list_nodes().await?;
    let rack_map = node_rack_map(&nodes);
    let all_pods = cluster.list_pods().await?;

    let pods: Vec<PodSummary> = all_pods
        .iter()
        .filter(|pod| selector_matches(&pod.labels, &workload.selector))
        .map(|pod| {
            let node = pod.node.clone().unwrap_or_default();
            let zone = rack_map.get(&node).cloned().unwrap_or_else(|| "unknown".to_string());
            PodSummary {
                name: pod.name.clone(),
                status: pod.phase.clone().unwrap_or_else(|| "Unknown".to_string()),
                node,
                zone,
            }
        })
        .collect();
    let running = pods.iter().filter(|p| p.status == "Running").count();

    Ok(CriticalServiceStatusDescribe {
        critical_service: ServiceStatusDescribe {
            name: name.to_string(),
            namespace: info.namespace.clone(),
            kind: info.kind,
            status: info.status,
            balanced: info.balanced,
            configured_instances: Some(workload.desired),
            running_instances: running,
            pods,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(namespace: &str, kind: ServiceKind) -> CriticalServiceStatic {
        CriticalServiceStatic {
            namespace: namespace.to_string(),
            kind,
        }
    }

    #[test]
    fn test_merge_registries_is_additive_and_idempotent() {
        let mut current = BTreeMap::new();
        current.insert("a".to_string(), service("ns1", ServiceKind::Deployment));

        let mut incoming = BTreeMap::new();
        incoming.insert("a".to_string(), service("ns1", ServiceKind::Deployment));
        incoming.insert("b".to_string(), service("ns2", ServiceKind::StatefulSet));

        let first = merge_registries(&current, &incoming);
        assert_eq!(first.added, vec!["b".to_string()]);
        assert_eq!(first.existing, vec!["a".to_string()]);
        assert_eq!(first.merged.len(), 2);

        // Applying the same payload again adds nothing and reports every
        // entry as already existing.
        let second = merge_registries(&first.merged, &incoming);
        assert!(second.added.is_empty());
        assert_eq!(second.existing.len(), 2);
        assert_eq!(second.merged, first.merged);
    }

    #[test]
    fn test_merge_never_overwrites_existing_entries() {
        let mut current = BTreeMap::new();
        current.insert("a".to_string(), service("ns1", ServiceKind::Deployment));
        let mut incoming = BTreeMap::new();
        incoming.insert("a".to_string(), service("other", ServiceKind::DaemonSet));

        let outcome = merge_registries(&current, &incoming);
        assert_eq!(outcome.merged["a"].namespace, "ns1");
        assert_eq!(outcome.merged["a"].kind, ServiceKind::Deployment);
    }

    #[test]
    fn test_group_by_namespace() {
        let mut registry = BTreeMap::new();
        registry.insert("a".to_string(), service("ns1", ServiceKind::Deployment));
        registry.insert("b".to_string(), service("ns1", ServiceKind::DaemonSet));
        registry.insert("c".to_string(), service("ns2", ServiceKind::StatefulSet));

        let grouped = group_by_namespace(&registry);
        assert_eq!(grouped["ns1"].len(), 2);
        assert_eq!(grouped["ns2"].len(), 1);
        assert_eq!(grouped["ns2"][0].name, "c");
    }
}
