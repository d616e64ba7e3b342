// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! Zone listing and description over the recorded rack map.
//!
//! Management node roles follow the cluster naming convention: `ncn-m*` are
//! masters, `ncn-w*` are workers; storage nodes come from the storage zone
//! tree.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

use common::schema::{NodeEntry, StorageNodeEntry, ZoneSection};

const MASTER_PREFIX: &str = "ncn-m";
const WORKER_PREFIX: &str = "ncn-w";

#[derive(Debug, Serialize)]
pub struct KubernetesTopologyZone {
    #[serde(rename = "Management_Master_Nodes", skip_serializing_if = "Vec::is_empty")]
    pub masters: Vec<String>,
    #[serde(rename = "Management_Worker_Nodes", skip_serializing_if = "Vec::is_empty")]
    pub workers: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CephZone {
    #[serde(rename = "Management_Storage_Nodes")]
    pub storage: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ZoneItem {
    #[serde(rename = "Zone_Name")]
    pub zone_name: String,
    #[serde(rename = "Kubernetes_Topology_Zone", skip_serializing_if = "Option::is_none")]
    pub kubernetes_topology_zone: Option<KubernetesTopologyZone>,
    #[serde(rename = "CEPH_Zone", skip_serializing_if = "Option::is_none")]
    pub ceph_zone: Option<CephZone>,
}

#[derive(Debug, Serialize)]
pub struct ZoneList {
    #[serde(rename = "Zones")]
    pub zones: Vec<ZoneItem>,
}

#[derive(Debug, Serialize)]
pub struct ManagementNodes {
    #[serde(rename = "Type")]
    pub kind: &'static str,
    #[serde(rename = "Nodes")]
    pub nodes: Vec<NodeEntry>,
}

#[derive(Debug, Serialize)]
pub struct StorageDescribeNode {
    pub name: String,
    pub status: common::schema::NodeStatus,
    /// Daemon names grouped by their state.
    pub osds: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ManagementStorage {
    #[serde(rename = "Type")]
    pub kind: &'static str,
    #[serde(rename = "Nodes")]
    pub nodes: Vec<StorageDescribeNode>,
}

#[derive(Debug, Serialize)]
pub struct ZoneDescribe {
    #[serde(rename = "Zone_Name")]
    pub zone_name: String,
    #[serde(rename = "Management_Masters")]
    pub master_count: usize,
    #[serde(rename = "Management_Workers")]
    pub worker_count: usize,
    #[serde(rename = "Management_Storages")]
    pub storage_count: usize,
    #[serde(rename = "Management_Master", skip_serializing_if = "Option::is_none")]
    pub masters: Option<ManagementNodes>,
    #[serde(rename = "Management_Worker", skip_serializing_if = "Option::is_none")]
    pub workers: Option<ManagementNodes>,
    #[serde(rename = "Management_Storage", skip_serializing_if = "Option::is_none")]
    pub storage: Option<ManagementStorage>,
}

fn split_roles(entries: &[NodeEntry]) -> (Vec<NodeEntry>, Vec<NodeEntry>) {
    let masters = entries
        .iter()
        .filter(|n| n.name.starts_with(MASTER_PREFIX))
        .cloned()
        .collect();
    let workers = entries
        .iter()
        .filter(|n| n.name.starts_with(WORKER_PREFIX))
        .cloned()
        .collect();
    (masters, workers)
}

fn names(entries: &[NodeEntry]) -> Vec<String> {
    entries.iter().map(|n| n.name.clone()).collect()
}

/// Human-facing note when no zones are configured at all.
pub fn zones_missing_information(zone: &ZoneSection) -> Option<&'static str> {
    if zone.k8s_zones.is_empty() && zone.ceph_zones.is_empty() {
        warn!("No zones (topology or storage) configured");
        return Some("No zones (K8s topology and Ceph) configured");
    }
    if zone.k8s_zones.is_empty() {
        warn!("No topology zones configured");
        return Some("No K8s topology zones configured");
    }
    if zone.ceph_zones.is_empty() {
        warn!("No storage zones configured");
        return Some("No CEPH zones configured");
    }
    None
}

/// Maps the recorded rack map into the zone listing response.
pub fn list_zones(zone: &ZoneSection) -> ZoneList {
    let mut all_zone_names: Vec<&String> = zone
        .k8s_zones
        .keys()
        .chain(zone.ceph_zones.keys())
        .collect();
    all_zone_names.sort();
    all_zone_names.dedup();
    info!("Mapping {} zones", all_zone_names.len());

    let zones = all_zone_names
        .into_iter()
        .map(|name| {
            let (masters, workers) = zone
                .k8s_zones
                .get(name)
                .map(|entries| split_roles(entries))
                .unwrap_or_default();
            let storage: Vec<&StorageNodeEntry> =
                zone.ceph_zones.get(name).map(|v| v.iter().collect()).unwrap_or_default();

            let kubernetes_topology_zone = if masters.is_empty() && workers.is_empty() {
                None
            } else {
                Some(KubernetesTopologyZone {
                    masters: names(&masters),
                    workers: names(&workers),
                })
            };
            let ceph_zone = if storage.is_empty() {
                None
            } else {
                Some(CephZone {
                    storage: storage.iter().map(|n| n.name.clone()).collect(),
                })
            };
            ZoneItem {
                zone_name: name.clone(),
                kubernetes_topology_zone,
                ceph_zone,
            }
        })
        .collect();
    ZoneList { zones }
}

/// Detailed report for one zone; `None` when the zone is unknown.
pub fn describe_zone(zone_name: &str, zone: &ZoneSection) -> Option<ZoneDescribe> {
    let (masters, workers) = zone
        .k8s_zones
        .get(zone_name)
        .map(|entries| split_roles(entries))
        .unwrap_or_default();
    let storage = zone.ceph_zones.get(zone_name).cloned().unwrap_or_default();

    if masters.is_empty() && workers.is_empty() && storage.is_empty() {
        warn!("Zone '{}' not found", zone_name);
        return None;
    }

    let storage_nodes: Vec<StorageDescribeNode> = storage
        .iter()
        .map(|node| {
            let mut osds: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for osd in &node.osds {
                let status = serde_json::to_value(osd.status)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_string))
                    .unwrap_or_else(|| "unknown".to_string());
                osds.entry(status).or_default().push(osd.name.clone());
            }
            StorageDescribeNode {
                name: node.name.clone(),
                status: node.status,
                osds,
            }
        })
        .collect();

    Some(ZoneDescribe {
        zone_name: zone_name.to_string(),
        master_count: masters.len(),
        worker_count: workers.len(),
        storage_count: storage.len(),
        masters: (!masters.is_empty()).then(|| ManagementNodes {
            kind: "Kubernetes_Topology_Zone",
            nodes: masters,
        }),
        workers: (!workers.is_empty()).then(|| ManagementNodes {
            kind: "Kubernetes_Topology_Zone",
            nodes: workers,
        }),
        storage: (!storage_nodes.is_empty()).then(|| ManagementStorage {
            kind: "CEPH_Zone",
            nodes: storage_nodes,
        }),
    })
}

/// Zone names are label values: short alphanumerics with dots, dashes and
/// underscores.
pub fn valid_zone_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::schema::{NodeStatus, OsdEntry, OsdStatus};

    fn sample_zone() -> ZoneSection {
        let mut zone = ZoneSection::default();
        zone.k8s_zones.insert(
            "rack-1".to_string(),
            vec![
                NodeEntry {
                    name: "ncn-m001".to_string(),
                    status: NodeStatus::Ready,
                },
                NodeEntry {
                    name: "ncn-w001".to_string(),
                    status: NodeStatus::NotReady,
                },
            ],
        );
        zone.ceph_zones.insert(
            "rack-1".to_string(),
            vec![StorageNodeEntry {
                name: "ncn-s001".to_string(),
                status: NodeStatus::Ready,
                osds: vec![
                    OsdEntry {
                        name: "osd.0".to_string(),
                        status: OsdStatus::Up,
                    },
                    OsdEntry {
                        name: "osd.1".to_string(),
                        status: OsdStatus::Up,
                    },
                    OsdEntry {
                        name: "osd.2".to_string(),
                        status: OsdStatus::Down,
                    },
                ],
            }],
        );
        zone.k8s_zones.insert(
            "rack-2".to_string(),
            vec![NodeEntry {
                name: "ncn-w002".to_string(),
                status: NodeStatus::Ready,
            }],
        );
        zone
    }

    #[test]
    fn test_list_zones_merges_both_sources() {
        let listing = list_zones(&sample_zone());
        assert_eq!(listing.zones.len(), 2);

        let rack1 = &listing.zones[0];
        assert_eq!(rack1.zone_name, "rack-1");
        let topology = rack1.kubernetes_topology_zone.as_ref().unwrap();
        assert_eq!(topology.masters, vec!["ncn-m001"]);
        assert_eq!(topology.workers, vec!["ncn-w001"]);
        assert_eq!(
            rack1.ceph_zone.as_ref().unwrap().storage,
            vec!["ncn-s001"]
        );

        let rack2 = &listing.zones[1];
        assert!(rack2.ceph_zone.is_none());
    }

    #[test]
    fn test_describe_zone_groups_osds_by_status() {
        let report = describe_zone("rack-1", &sample_zone()).unwrap();
        assert_eq!(report.master_count, 1);
        assert_eq!(report.worker_count, 1);
        assert_eq!(report.storage_count, 1);

        let storage = report.storage.unwrap();
        let osds = &storage.nodes[0].osds;
        assert_eq!(osds["up"], vec!["osd.0", "osd.1"]);
        assert_eq!(osds["down"], vec!["osd.2"]);
    }

    #[test]
    fn test_describe_unknown_zone_is_none() {
        assert!(describe_zone("rack-9", &sample_zone()).is_none());
    }

    #[test]
    fn test_zones_missing_information() {
        let mut zone = ZoneSection::default();
        assert!(zones_missing_information(&zone).is_some());
        zone.k8s_zones.insert("rack-1".to_string(), vec![]);
        assert_eq!(
            zones_missing_information(&zone),
            Some("No CEPH zones configured")
        );
        zone.ceph_zones.insert("rack-1".to_string(), vec![]);
        assert!(zones_missing_information(&zone).is_none());
    }

    #[test]
    fn test_valid_zone_name() {
        assert!(valid_zone_name("rack-1"));
        assert!(valid_zone_name("x3000"));
        assert!(!valid_zone_name(""));
        assert!(!valid_zone_name("rack/1"));
        assert!(!valid_zone_name(&"a".repeat(64)));
    }
}
