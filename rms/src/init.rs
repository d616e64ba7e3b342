// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! One-shot initialization procedure.
//!
//! Clears stale document locks, discovers rack zones for both node classes,
//! records the pod's own placement, validates the operator configuration, and
//! transitions the RMS state to `Ready` — or fails, in which case the
//! `rrs-init` binary exits with code 1.

use std::collections::BTreeMap;
use tracing::{error, info, warn};

use common::ceph;
use common::configmap::{DocStore, DocumentStore};
use common::k8s::{self, ClusterClient};
use common::schema::{
    utc_timestamp, CriticalServicesStatic, DynamicData, NodeEntry, PodPlacement, RmsState,
    TS_INIT, HEALTHY_HW_STATES,
};
use common::setting::{self, get_settings, CRITICAL_SERVICE_KEY, DYNAMIC_DATA_KEY};
use common::{Result, RrsError};

use crate::hsm;

const TIMER_KEYS: [&str; 6] = [
    "k8s_pre_monitoring_delay",
    "k8s_monitoring_polling_interval",
    "k8s_monitoring_total_time",
    "ceph_pre_monitoring_delay",
    "ceph_monitoring_polling_interval",
    "ceph_monitoring_total_time",
];

/// Entry point for the `rrs-init` binary.
pub async fn run() -> Result<()> {
    let settings = get_settings();
    setting::validate(settings)?;

    let cluster = ClusterClient::new().await?;
    let store = DocumentStore::new(cluster.kube_client(), &settings.namespace);
    initialize(
        &cluster,
        &store,
        &settings.namespace,
        &settings.static_cm_name,
        &settings.dynamic_cm_name,
    )
    .await
}

/// Runs the full initialization sequence against the given store.
pub async fn initialize(
    cluster: &ClusterClient,
    store: &dyn DocStore,
    namespace: &str,
    static_doc: &str,
    dynamic_doc: &str,
) -> Result<()> {
    // Delete any stale document locks left behind by a crashed predecessor.
    store.force_release(dynamic_doc).await?;
    store.force_release(static_doc).await?;

    let mut data = store.read(dynamic_doc).await?;
    let yaml = data.get(DYNAMIC_DATA_KEY).ok_or_else(|| {
        RrsError::Corrupt(format!("no content found under {} in {}", DYNAMIC_DATA_KEY, dynamic_doc))
    })?;
    let mut payload = DynamicData::from_yaml(yaml)?;

    if payload.timestamps.contains_key(TS_INIT) {
        info!(
            "Reinitializing the Rack Resiliency Service; the previous pod has been terminated"
        );
    }
    if let Some(state) = payload.state.rms_state {
        info!("RMS is in {} state, resetting to Init", state);
        if !payload.cray_rrs_pod.node.is_empty() {
            check_previous_pod(cluster, &payload.cray_rrs_pod).await;
        }
        if state == RmsState::Monitoring {
            info!(
                "The previous monitoring session did not complete and will be relaunched by the monitoring daemon"
            );
        }
    }

    payload.state.rms_state = Some(RmsState::Init);
    payload.timestamps.insert(TS_INIT.to_string(), utc_timestamp());
    data.insert(DYNAMIC_DATA_KEY.to_string(), payload.to_yaml()?);
    store
        .update(dynamic_doc, DYNAMIC_DATA_KEY, &data[DYNAMIC_DATA_KEY])
        .await?;

    // Zone discovery for both node classes.
    info!("Retrieving zone information and status of management and storage nodes");
    let nodes = cluster.list_nodes().await?;
    let k8s_zones = build_k8s_zones(&nodes);
    let discovery_ok = match &k8s_zones {
        Some(zones) => {
            payload.zone.k8s_zones = zones.clone();
            match ceph::storage_zones().await {
                Ok((ceph_zones, _)) => {
                    payload.zone.ceph_zones = ceph_zones;
                    true
                }
                Err(e) => {
                    error!("Storage zone discovery failed: {}", e);
                    false
                }
            }
        }
        None => false,
    };

    // Record where this pod runs.
    let node_name = cluster.current_node(namespace).await?;
    let zone_name = payload
        .zone
        .k8s_zones
        .iter()
        .find(|(_, entries)| entries.iter().any(|n| n.name == node_name))
        .map(|(zone, _)| zone.clone())
        .unwrap_or_default();
    let rack_name = resolve_rack(cluster, &node_name).await.unwrap_or_default();
    info!(
        "RMS pod is running on node {} in rack {} under zone {}",
        node_name, rack_name, zone_name
    );
    payload.cray_rrs_pod = PodPlacement {
        node: node_name,
        zone: zone_name,
        rack: rack_name,
    };

    check_static_config(store, static_doc).await?;
    if !discovery_ok {
        return Err(RrsError::Internal("zone discovery failed".to_string()));
    }

    payload.state.rms_state = Some(RmsState::Ready);
    info!("Updating zone information, pod placement and state in the dynamic document");
    store
        .update(dynamic_doc, DYNAMIC_DATA_KEY, &payload.to_yaml()?)
        .await?;
    Ok(())
}

/// Groups the management nodes under their rack label. Returns `None` when
/// any node lacks the label, which aborts discovery.
pub fn build_k8s_zones(nodes: &[k8s::Node]) -> Option<BTreeMap<String, Vec<NodeEntry>>> {
    let mut zones: BTreeMap<String, Vec<NodeEntry>> = BTreeMap::new();
    for node in nodes {
        let Some(name) = node.metadata.name.clone() else {
            error!("Node without a name in the listing, skipping");
            continue;
        };
        let Some(rack) = k8s::node_rack(node) else {
            error!("Node {} does not have a rack marked for it", name);
            return None;
        };
        zones.entry(rack).or_default().push(NodeEntry {
            name,
            status: k8s::node_status(node),
        });
    }
    Some(zones)
}

/// Validates the operator-authored static document: a non-empty critical
/// service registry is mandatory, missing timers are tolerated with defaults.
pub async fn check_static_config(store: &dyn DocStore, static_doc: &str) -> Result<()> {
    let data = store.read(static_doc).await?;
    let content = data.get(CRITICAL_SERVICE_KEY).ok_or_else(|| {
        error!("{} not present in the static document", CRITICAL_SERVICE_KEY);
        RrsError::ConfigMissing(CRITICAL_SERVICE_KEY.to_string())
    })?;
    let registry: CriticalServicesStatic = serde_json::from_str(content)?;
    if registry.critical_services.is_empty() {
        error!("Critical services are not defined for the Rack Resiliency Service");
        return Err(RrsError::ConfigMissing("critical_services".to_string()));
    }

    let missing: Vec<&str> = TIMER_KEYS
        .iter()
        .filter(|key| !data.contains_key(**key))
        .copied()
        .collect();
    if !missing.is_empty() {
        warn!(
            "Timers {:?} are not present in the static document, defaults will be used",
            missing
        );
    }
    Ok(())
}

/// Best-effort post-mortem: was the previous pod on a node that is now
/// unhealthy?
async fn check_previous_pod(cluster: &ClusterClient, placement: &PodPlacement) {
    info!("Checking whether the previously running RMS pod was on a failed node");
    let result = async {
        let http = hsm::http_client()?;
        let token = hsm::fetch_token(cluster, &http).await?;
        let components = hsm::fetch_components(&http, &token).await?;
        let layout = hsm::fetch_sls_hardware(&http, &token).await?;
        Ok::<_, RrsError>((components, layout))
    }
    .await;
    let (components, layout) = match result {
        Ok(data) => data,
        Err(e) => {
            error!("Failed to retrieve hardware inventory for the post-mortem: {}", e);
            return;
        }
    };

    let Some(xname) = hsm::xname_for_alias(&layout, &placement.node) else {
        warn!("Previous node {} has no inventory entry", placement.node);
        return;
    };
    match components.iter().find(|c| c.id == xname) {
        Some(c) if HEALTHY_HW_STATES.contains(&c.state.as_str()) => info!(
            "Previous node {} ({}) in rack {} is healthy ({})",
            placement.node, xname, placement.rack, c.state
        ),
        Some(c) => warn!(
            "Previous node {} ({}) in rack {} is not healthy ({})",
            placement.node, xname, placement.rack, c.state
        ),
        None => warn!("Previous node {} ({}) not reported by the inventory", placement.node, xname),
    }
}

/// Resolves the node's physical rack from its inventory xname.
async fn resolve_rack(cluster: &ClusterClient, node_name: &str) -> Option<String> {
    let http = hsm::http_client().ok()?;
    let token = match hsm::fetch_token(cluster, &http).await {
        Ok(token) => token,
        Err(e) => {
            warn!("Cannot resolve rack for {}: {}", node_name, e);
            return None;
        }
    };
    let layout = match hsm::fetch_sls_hardware(&http, &token).await {
        Ok(layout) => layout,
        Err(e) => {
            warn!("Cannot resolve rack for {}: {}", node_name, e);
            return None;
        }
    };
    let xname = hsm::xname_for_alias(&layout, node_name)?;
    hsm::rack_id(&xname).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::schema::NodeStatus;
    use common::testing::MemStore;

    fn node(name: &str, rack: Option<&str>) -> k8s::Node {
        let labels = rack.map(|rack| {
            let mut labels = std::collections::BTreeMap::new();
            labels.insert(k8s::RACK_LABEL.to_string(), rack.to_string());
            labels
        });
        k8s::Node {
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: Some(name.to_string()),
                labels,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_build_k8s_zones_buckets_every_labelled_node_once() {
        let nodes = vec![
            node("ncn-m001", Some("rack-1")),
            node("ncn-w001", Some("rack-1")),
            node("ncn-w002", Some("rack-2")),
        ];
        let zones = build_k8s_zones(&nodes).unwrap();
        assert_eq!(zones.len(), 2);
        assert_eq!(zones["rack-1"].len(), 2);
        assert_eq!(zones["rack-2"].len(), 1);
        assert_eq!(zones["rack-2"][0].status, NodeStatus::Unknown);
        let total: usize = zones.values().map(Vec::len).sum();
        assert_eq!(total, nodes.len());
    }

    #[test]
    fn test_build_k8s_zones_aborts_on_unlabelled_node() {
        let nodes = vec![node("ncn-m001", Some("rack-1")), node("ncn-w001", None)];
        assert!(build_k8s_zones(&nodes).is_none());
    }

    #[tokio::test]
    async fn test_check_static_config_rejects_empty_registry() {
        let store = MemStore::new();
        store.seed_key(
            "rrs-mon-static",
            CRITICAL_SERVICE_KEY,
            r#"{"critical_services": {}}"#,
        );
        let result = check_static_config(&store, "rrs-mon-static").await;
        assert!(matches!(result, Err(RrsError::ConfigMissing(_))));
    }

    #[tokio::test]
    async fn test_check_static_config_accepts_registry_without_timers() {
        let store = MemStore::new();
        store.seed_key(
            "rrs-mon-static",
            CRITICAL_SERVICE_KEY,
            r#"{"critical_services": {"coredns": {"namespace": "kube-system", "type": "Deployment"}}}"#,
        );
        assert!(check_static_config(&store, "rrs-mon-static").await.is_ok());
    }

    #[tokio::test]
    async fn test_check_static_config_missing_key_is_config_missing() {
        let store = MemStore::new();
        store.seed_key("rrs-mon-static", "unrelated", "1");
        let result = check_static_config(&store, "rrs-mon-static").await;
        assert!(matches!(result, Err(RrsError::ConfigMissing(_))));
    }
}
