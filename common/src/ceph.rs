// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! Storage adapter: invokes the storage control tool and derives the
//! rack-grouped storage daemon tree plus the overall health verdict.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Result, RrsError};
use crate::schema::{NodeStatus, OsdEntry, OsdStatus, StorageNodeEntry};

/// Hostname prefix of management storage nodes.
const STORAGE_NODE_PREFIX: &str = "ncn-s";

#[derive(Debug, Deserialize)]
struct CephTreeNode {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
    name: String,
    #[serde(default)]
    children: Vec<i64>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CephTree {
    #[serde(default)]
    nodes: Vec<CephTreeNode>,
}

#[derive(Debug, Deserialize)]
struct CephHost {
    hostname: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct CephService {
    service_name: String,
    #[serde(default)]
    hostname: String,
    #[serde(default)]
    status_desc: String,
}

async fn run_ceph_json(args: &[&str]) -> Result<String> {
    debug!("Running ceph {}", args.join(" "));
    let output = Command::new("ceph")
        .args(args)
        .args(["-f", "json"])
        .output()
        .await
        .map_err(|e| RrsError::Transient(format!("failed to run ceph {}: {}", args.join(" "), e)))?;
    if !output.status.success() {
        return Err(RrsError::Transient(format!(
            "ceph {} exited with {}: {}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    String::from_utf8(output.stdout)
        .map_err(|e| RrsError::Corrupt(format!("ceph output is not UTF-8: {}", e)))
}

/// Fetches the rack-grouped storage node tree and the overall health verdict.
pub async fn storage_zones() -> Result<(BTreeMap<String, Vec<StorageNodeEntry>>, bool)> {
    let tree: CephTree = serde_json::from_str(&run_ceph_json(&["osd", "tree"]).await?)?;
    let hosts: Vec<CephHost> = serde_json::from_str(&run_ceph_json(&["orch", "host", "ls"]).await?)?;

    let zones = build_storage_zones(&tree, &hosts);
    let failed: Vec<&str> = zones
        .values()
        .flatten()
        .filter(|node| node.status != NodeStatus::Ready)
        .map(|node| node.name.as_str())
        .collect();
    if !failed.is_empty() {
        warn!(
            "{} out of {} storage nodes are not healthy: {:?}",
            failed.len(),
            hosts.len(),
            failed
        );
    }

    let healthy = health_check().await?;
    Ok((zones, healthy))
}

/// Overall storage health: cluster status plus every orchestrated daemon
/// running.
pub async fn health_check() -> Result<bool> {
    let status: Value = serde_json::from_str(&run_ceph_json(&["-s"]).await?)?;
    let services: Vec<CephService> = serde_json::from_str(&run_ceph_json(&["orch", "ps"]).await?)?;

    let cluster_ok = cluster_healthy(&status);
    let failed = failed_services(&services);
    for service in &services {
        if service.status_desc != "running" {
            warn!(
                "Service {} running on {} is in {} state",
                service.service_name, service.hostname, service.status_desc
            );
        }
    }
    if !failed.is_empty() {
        warn!(
            "{} out of {} storage services are not running",
            failed.len(),
            services.len()
        );
    }

    Ok(cluster_ok && failed.is_empty())
}

/// Groups storage hosts under their rack bucket with per-daemon status.
fn build_storage_zones(tree: &CephTree, hosts: &[CephHost]) -> BTreeMap<String, Vec<StorageNodeEntry>> {
    let host_status: BTreeMap<&str, &str> = hosts
        .iter()
        .map(|h| (h.hostname.as_str(), h.status.as_str()))
        .collect();

    let mut zones = BTreeMap::new();
    for rack in tree.nodes.iter().filter(|n| n.kind == "rack") {
        let mut storage_nodes = Vec::new();
        for child_id in &rack.children {
            let Some(host) = tree
                .nodes
                .iter()
                .find(|n| n.id == *child_id && n.kind == "host" && n.name.starts_with(STORAGE_NODE_PREFIX))
            else {
                continue;
            };
            let osds = tree
                .nodes
                .iter()
                .filter(|n| host.children.contains(&n.id) && n.kind == "osd")
                .map(|osd| OsdEntry {
                    name: osd.name.clone(),
                    status: osd_status(osd.status.as_deref()),
                })
                .collect();

            // The orchestrator reports "" or "online" for reachable hosts.
            let raw_status = host_status.get(host.name.as_str()).copied().unwrap_or("");
            let status = if raw_status.is_empty() || raw_status == "online" {
                NodeStatus::Ready
            } else {
                warn!("Host {} is in {} state", host.name, raw_status);
                NodeStatus::NotReady
            };

            storage_nodes.push(StorageNodeEntry {
                name: host.name.clone(),
                status,
                osds,
            });
        }
        zones.insert(rack.name.clone(), storage_nodes);
    }
    zones
}

fn osd_status(raw: Option<&str>) -> OsdStatus {
    match raw {
        Some("up") => OsdStatus::Up,
        Some("down") => OsdStatus::Down,
        _ => OsdStatus::Unknown,
    }
}

/// Health verdict from the cluster status report. Degraded placement groups
/// with active recovery are logged but still count as unhealthy until the
/// report returns to HEALTH_OK.
fn cluster_healthy(status: &Value) -> bool {
    let health = status
        .pointer("/health/status")
        .and_then(Value::as_str)
        .unwrap_or("UNKNOWN");
    if health.contains("HEALTH_OK") {
        info!("Storage cluster is healthy");
        return true;
    }

    warn!("Storage cluster is not healthy, status {}", health);
    let degraded = status
        .pointer("/health/checks/PG_DEGRADED/summary/message")
        .and_then(Value::as_str)
        .map(|m| m.contains("Degraded"))
        .unwrap_or(false);
    if degraded {
        let pgmap = status.get("pgmap").cloned().unwrap_or(Value::Null);
        let recovering = pgmap.get("recovering_objects_per_sec").is_some()
            || pgmap.get("recovering_bytes_per_sec").is_some();
        if recovering {
            info!("Storage recovery is in progress");
        } else {
            warn!("Placement groups are degraded and recovery is not happening");
        }
    } else if let Some(checks) = status.pointer("/health/checks").and_then(Value::as_object) {
        warn!(
            "Reasons for unhealthy storage state: {:?}",
            checks.keys().collect::<Vec<_>>()
        );
    }
    false
}

fn failed_services(services: &[CephService]) -> Vec<String> {
    services
        .iter()
        .filter(|s| s.status_desc != "running")
        .map(|s| s.service_name.clone())
        .collect()
}
