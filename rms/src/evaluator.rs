// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! Critical Services Evaluator.
//!
//! For every registered service the evaluator compares desired and ready
//! replica counts on the owning workload controller, distributes the owned
//! pods across racks, and derives the readiness and rack-balance verdicts.

use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use common::k8s::{node_rack_map, selector_matches, ClusterClient, PodInfo};
use common::schema::{
    Balanced, CriticalServiceDynamic, CriticalServiceStatic, CriticalServicesDynamic,
    ServiceStatus,
};
use common::Result;

/// Rack bucket used for pods on nodes without a rack assignment.
pub const UNKNOWN_RACK: &str = "unknown";

/// Evaluates the registry against the live cluster. Controller lookups that
/// fail leave the service `Unconfigured`/`NA`; the cycle itself only fails
/// when the cluster cannot be read at all.
pub async fn evaluate(
    cluster: &ClusterClient,
    registry: &BTreeMap<String, CriticalServiceStatic>,
) -> Result<CriticalServicesDynamic> {
    info!("Number of critical services: {}", registry.len());

    // One node listing and one pod listing per evaluation cycle; everything
    // else is filtered locally.
    let nodes = cluster.list_nodes().await?;
    let rack_map = node_rack_map(&nodes);
    let all_pods = cluster.list_pods().await?;

    let mut services = BTreeMap::new();
    let mut unrecovered = Vec::new();

    for (name, info) in registry {
        let (status, balanced) = match cluster
            .workload_status(info.kind, name, &info.namespace)
            .await
        {
            Ok(workload) => {
                let status = if workload.ready < workload.desired {
                    warn!(
                        "{} '{}' in namespace '{}' is not ready: only {} of {} desired replicas",
                        info.kind, name, info.namespace, workload.ready, workload.desired
                    );
                    ServiceStatus::PartiallyConfigured
                } else {
                    debug!("Desired and ready replicas match for '{}'", name);
                    ServiceStatus::Configured
                };

                let selected: Vec<&PodInfo> = all_pods
                    .iter()
                    .filter(|pod| selector_matches(&pod.labels, &workload.selector))
                    .collect();
                let counts = rack_counts(&selected, &rack_map);
                (status, rack_balance(&counts))
            }
            Err(e) => {
                error!("Error fetching {} {}: {}", info.kind, name, e);
                (ServiceStatus::Unconfigured, Balanced::NotApplicable)
            }
        };

        if status == ServiceStatus::PartiallyConfigured || balanced == Balanced::False {
            unrecovered.push(name.clone());
        }
        services.insert(
            name.clone(),
            CriticalServiceDynamic {
                namespace: info.namespace.clone(),
                kind: info.kind,
                status,
                balanced,
            },
        );
    }

    if !unrecovered.is_empty() {
        warn!("Imbalanced or degraded services: {:?}", unrecovered);
    }
    Ok(CriticalServicesDynamic {
        critical_services: services,
    })
}

/// Per-rack pod counts for one service. Racks with zero pods are omitted;
/// pods on nodes outside the rack map land in the `unknown` bucket.
pub fn rack_counts(pods: &[&PodInfo], rack_map: &BTreeMap<String, String>) -> Vec<usize> {
    let mut per_rack: BTreeMap<&str, usize> = BTreeMap::new();
    for pod in pods {
        let rack = pod
            .node
            .as_deref()
            .and_then(|node| rack_map.get(node))
            .map(String::as_str)
            .unwrap_or(UNKNOWN_RACK);
        *per_rack.entry(rack).or_default() += 1;
    }
    per_rack.into_values().collect()
}

/// Rack balance verdict: balanced iff the spread between the fullest and the
/// emptiest populated rack is at most one pod.
pub fn rack_balance(counts: &[usize]) -> Balanced {
    let (Some(max), Some(min)) = (counts.iter().max(), counts.iter().min()) else {
        return Balanced::NotApplicable;
    };
    if max - min <= 1 {
        Balanced::True
    } else {
        Balanced::False
    }
}

/// Names of services still degraded or imbalanced after an evaluation.
pub fn unrecovered_services(evaluated: &CriticalServicesDynamic) -> Vec<String> {
    evaluated
        .critical_services
        .iter()
        .filter(|(_, svc)| {
            svc.status == ServiceStatus::PartiallyConfigured || svc.balanced == Balanced::False
        })
        .map(|(name, _)| name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::schema::ServiceKind;

    fn pod(name: &str, node: Option<&str>) -> PodInfo {
        PodInfo {
            name: name.to_string(),
            namespace: "kube-system".to_string(),
            node: node.map(str::to_string),
            phase: Some("Running".to_string()),
            labels: BTreeMap::new(),
        }
    }

    fn rack_map() -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("n1".to_string(), "rackA".to_string());
        map.insert("n2".to_string(), "rackB".to_string());
        map.insert("n3".to_string(), "rackC".to_string());
        map
    }

    #[test]
    fn test_rack_balance_boundaries() {
        assert_eq!(rack_balance(&[3, 2, 2]), Balanced::True);
        assert_eq!(rack_balance(&[3, 1]), Balanced::False);
        assert_eq!(rack_balance(&[]), Balanced::NotApplicable);
        assert_eq!(rack_balance(&[2]), Balanced::True);
    }

    #[test]
    fn test_rack_counts_omits_empty_racks_and_buckets_unknown() {
        let pods = [
            pod("p1", Some("n1")),
            pod("p2", Some("n1")),
            pod("p3", Some("n2")),
            pod("p4", Some("no-rack-node")),
            pod("p5", None),
        ];
        let refs: Vec<&PodInfo> = pods.iter().collect();
        let counts = rack_counts(&refs, &rack_map());
        // rackA=2, rackB=1, unknown=2; rackC has no pods and is omitted.
        assert_eq!(counts.len(), 3);
        assert_eq!(counts.iter().sum::<usize>(), 5);
    }

    #[test]
    fn test_unrecovered_services_picks_degraded_and_imbalanced() {
        let mut services = BTreeMap::new();
        services.insert(
            "healthy".to_string(),
            CriticalServiceDynamic {
                namespace: "a".to_string(),
                kind: ServiceKind::Deployment,
                status: ServiceStatus::Configured,
                balanced: Balanced::True,
            },
        );
        services.insert(
            "degraded".to_string(),
            CriticalServiceDynamic {
                namespace: "a".to_string(),
                kind: ServiceKind::StatefulSet,
                status: ServiceStatus::PartiallyConfigured,
                balanced: Balanced::True,
            },
        );
        services.insert(
            "skewed".to_string(),
            CriticalServiceDynamic {
                namespace: "a".to_string(),
                kind: ServiceKind::DaemonSet,
                status: ServiceStatus::Configured,
                balanced: Balanced::False,
            },
        );
        services.insert(
            "unconfigured".to_string(),
            CriticalServiceDynamic {
                namespace: "a".to_string(),
                kind: ServiceKind::Deployment,
                status: ServiceStatus::Unconfigured,
                balanced: Balanced::NotApplicable,
            },
        );
        let evaluated = CriticalServicesDynamic {
            critical_services: services,
        };
        let mut names = unrecovered_services(&evaluated);
        names.sort();
        assert_eq!(names, vec!["degraded".to_string(), "skewed".to_string()]);
    }
}
