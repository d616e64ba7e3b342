// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! Monitor Coordinator: bounded dual monitoring sessions.
//!
//! A session runs two loops in parallel, one polling workload health through
//! the evaluator and one polling storage health, each with its own pre-delay,
//! polling period and total budget. At most one session is active; a
//! late-start preemption rule admits an overlapping session once the previous
//! one has consumed at least 75% of its workload budget.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use common::ceph;
use common::configmap::DocStore;
use common::k8s::{node_status, ClusterClient};
use common::schema::{
    CriticalServicesDynamic, CriticalServicesStatic, DynamicData, NodeStatus, RmsState,
    SubsystemState, Timers, TS_END_CEPH_MONITORING, TS_END_K8S_MONITORING,
    TS_START_CEPH_MONITORING, TS_START_K8S_MONITORING,
};
use common::setting::CRITICAL_SERVICE_KEY;
use common::{Result, RrsError};

use crate::evaluator::{self, unrecovered_services};
use crate::state_manager::{StateField, StateManager};

/// Fraction of the workload budget after which a late-start session may
/// overlap the active one.
const PREEMPTION_THRESHOLD_PCT: f64 = 75.0;

pub struct MonitorCoordinator {
    state: Arc<StateManager>,
    cluster: ClusterClient,
    store: Arc<dyn DocStore>,
    static_doc: String,
    dynamic_doc: String,
}

impl MonitorCoordinator {
    pub fn new(
        state: Arc<StateManager>,
        cluster: ClusterClient,
        store: Arc<dyn DocStore>,
        static_doc: impl Into<String>,
        dynamic_doc: impl Into<String>,
    ) -> Self {
        Self {
            state,
            cluster,
            store,
            static_doc: static_doc.into(),
            dynamic_doc: dynamic_doc.into(),
        }
    }

    /// Refreshes the rack map with live node statuses and the storage zone
    /// tree, persisting only when something changed. Returns the overall
    /// storage health verdict.
    pub async fn update_zone_status(&self) -> Result<bool> {
        info!("Getting latest status for zones and nodes");
        let nodes = self.cluster.list_nodes().await?;
        let status_by_name: BTreeMap<String, NodeStatus> = nodes
            .iter()
            .filter_map(|n| n.metadata.name.clone().map(|name| (name, node_status(n))))
            .collect();
        let (ceph_zones, ceph_healthy) = ceph::storage_zones().await?;

        let persisted = self
            .state
            .mutate_payload(|payload| {
                let old_zone = payload.zone.clone();
                for entries in payload.zone.k8s_zones.values_mut() {
                    for entry in entries {
                        entry.status = status_by_name
                            .get(&entry.name)
                            .copied()
                            .unwrap_or(NodeStatus::Unknown);
                    }
                }
                payload.zone.ceph_zones = ceph_zones;
                payload.zone != old_zone
            })
            .await
            .map_err(|e| RrsError::Internal(format!("zone update failed: {}", e)))?;
        if persisted {
            info!("Updated zone information in the dynamic document");
        }
        Ok(ceph_healthy)
    }

    /// Runs the evaluator and writes the aggregated registry back to the
    /// dynamic document when it differs from the last persisted version.
    /// With `reloading` the registry is re-read from the static document.
    pub async fn update_critical_services(&self, reloading: bool) -> Result<CriticalServicesDynamic> {
        let dynamic_data = self.state.dynamic_data().await?;
        let json_content = if reloading {
            info!("Retrieving critical services from the static document");
            let static_data = self.store.read(&self.static_doc).await?;
            static_data
                .get(CRITICAL_SERVICE_KEY)
                .cloned()
                .ok_or_else(|| {
                    RrsError::Corrupt(format!("{} not found in the static document", CRITICAL_SERVICE_KEY))
                })?
        } else {
            info!("Retrieving critical services from the dynamic document");
            dynamic_data
                .get(CRITICAL_SERVICE_KEY)
                .cloned()
                .ok_or_else(|| {
                    RrsError::Corrupt(format!("{} not found in the dynamic document", CRITICAL_SERVICE_KEY))
                })?
        };

        // Dynamic-document entries carry status/balanced fields on top of the
        // static shape; the extra fields are ignored on decode.
        let registry: CriticalServicesStatic = serde_json::from_str(&json_content)?;
        let evaluated = evaluator::evaluate(&self.cluster, &registry.critical_services).await?;

        let services_json = serde_json::to_string_pretty(&evaluated)?;
        if Some(&services_json) != dynamic_data.get(CRITICAL_SERVICE_KEY) {
            info!("Critical services changed, updating the dynamic document");
            self.state
                .persist_key(CRITICAL_SERVICE_KEY, &services_json)
                .await
                .map_err(|e| RrsError::Internal(format!("service status update failed: {}", e)))?;
        }
        Ok(evaluated)
    }

    /// Entry point of a monitoring session, subject to the entry rule.
    pub async fn monitoring_loop(self: Arc<Self>) {
        let static_data = match self.store.read(&self.static_doc).await {
            Ok(data) => data,
            Err(e) => {
                error!("Cannot read monitoring timers: {}", e);
                return;
            }
        };
        let timers = Timers::from_static_data(&static_data);

        if !self.state.start_monitoring().await {
            info!("Another monitoring instance is already running");
            if !self.preemption_allowed(timers.k8s_monitoring_total_time).await {
                warn!("Skipping launch of a new monitoring instance as a previous one is still active");
                return;
            }
            info!(
                "Launching new monitoring instance since the previous one passed more \
                 than {}% of its monitoring interval",
                PREEMPTION_THRESHOLD_PCT
            );
        }

        info!("Monitoring critical services and zone status...");
        if let Err(e) = self
            .state
            .update_state_timestamp(Some(StateField::RmsState(RmsState::Monitoring)), None)
            .await
        {
            error!("Failed to persist monitoring state: {}", e);
            self.state.stop_monitoring().await;
            self.fail_session().await;
            return;
        }

        let k8s = {
            let this = self.clone();
            tokio::spawn(async move { this.monitor_k8s(timers).await })
        };
        let ceph = {
            let this = self.clone();
            tokio::spawn(async move { this.monitor_ceph(timers).await })
        };

        let k8s_failed = !matches!(k8s.await, Ok(Ok(())));
        let ceph_failed = !matches!(ceph.await, Ok(Ok(())));

        info!("Monitoring complete");
        self.state.stop_monitoring().await;

        if k8s_failed || ceph_failed {
            self.fail_session().await;
            return;
        }
        if let Err(e) = self
            .state
            .update_state_timestamp(Some(StateField::RmsState(RmsState::Started)), None)
            .await
        {
            error!("Failed to persist post-monitoring state: {}", e);
            self.fail_session().await;
        }
    }

    /// Workload monitoring loop: polls the evaluator until every service is
    /// configured and balanced, or the budget runs out.
    async fn monitor_k8s(&self, timers: Timers) -> Result<()> {
        let grace = self.cluster.node_monitor_grace_period().await.ok().flatten();
        let delay = grace.unwrap_or(timers.k8s_pre_monitoring_delay);
        info!("Sleeping for {} seconds before starting workload monitoring", delay);
        sleep(Duration::from_secs(delay)).await;

        self.state
            .update_state_timestamp(
                Some(StateField::K8sMonitoring(SubsystemState::Started)),
                Some(TS_START_K8S_MONITORING),
            )
            .await?;

        let budget = Duration::from_secs(timers.k8s_monitoring_total_time);
        let start = Instant::now();
        let mut unrecovered: Vec<String> = Vec::new();
        while start.elapsed() < budget {
            info!("Checking workload health");
            match self.update_critical_services(false).await {
                Ok(evaluated) => {
                    unrecovered = unrecovered_services(&evaluated);
                    if unrecovered.is_empty() {
                        info!(
                            "Critical services became healthy after {} seconds, ending the workload monitoring loop",
                            start.elapsed().as_secs()
                        );
                        break;
                    }
                }
                // A failed document write ends the session; evaluation
                // hiccups are logged and the loop continues.
                Err(RrsError::Internal(msg)) => {
                    return Err(RrsError::Internal(msg));
                }
                Err(e) => error!("Error processing services data: {}", e),
            }
            sleep(Duration::from_secs(timers.k8s_monitoring_polling_interval)).await;
        }

        info!(
            "Ending the workload monitoring loop after {} seconds",
            timers.k8s_monitoring_total_time
        );
        self.state
            .update_state_timestamp(
                Some(StateField::K8sMonitoring(SubsystemState::Completed)),
                Some(TS_END_K8S_MONITORING),
            )
            .await?;
        if !unrecovered.is_empty() {
            warn!(
                "Services {:?} are still not recovered after {} seconds",
                unrecovered, timers.k8s_monitoring_total_time
            );
        }
        Ok(())
    }

    /// Storage monitoring loop: refreshes the rack map and polls the storage
    /// health verdict until healthy or out of budget.
    async fn monitor_ceph(&self, timers: Timers) -> Result<()> {
        info!(
            "Sleeping for {} seconds before starting storage monitoring",
            timers.ceph_pre_monitoring_delay
        );
        sleep(Duration::from_secs(timers.ceph_pre_monitoring_delay)).await;

        self.state
            .update_state_timestamp(
                Some(StateField::CephMonitoring(SubsystemState::Started)),
                Some(TS_START_CEPH_MONITORING),
            )
            .await?;

        let budget = Duration::from_secs(timers.ceph_monitoring_total_time);
        let start = Instant::now();
        let mut healthy = false;
        while start.elapsed() < budget {
            info!("Checking storage health");
            match self.update_zone_status().await {
                Ok(true) => {
                    healthy = true;
                    info!(
                        "Storage became healthy after {} seconds, ending the storage monitoring loop",
                        start.elapsed().as_secs()
                    );
                    break;
                }
                Ok(false) => healthy = false,
                Err(RrsError::Internal(msg)) => return Err(RrsError::Internal(msg)),
                Err(e) => error!("Error refreshing zone status: {}", e),
            }
            sleep(Duration::from_secs(timers.ceph_monitoring_polling_interval)).await;
        }

        self.state
            .update_state_timestamp(
                Some(StateField::CephMonitoring(SubsystemState::Completed)),
                Some(TS_END_CEPH_MONITORING),
            )
            .await?;
        if !healthy {
            warn!(
                "Storage is still unhealthy after {} seconds",
                timers.ceph_monitoring_total_time
            );
        }
        Ok(())
    }

    /// Whether a late-start session may overlap the active one. Reads the
    /// workload start timestamp from a fresh copy of the dynamic document.
    async fn preemption_allowed(&self, total_time: u64) -> bool {
        let data = match self.store.read(&self.dynamic_doc).await {
            Ok(data) => data,
            Err(e) => {
                error!("Cannot read the dynamic document: {}", e);
                return false;
            }
        };
        let payload = match data
            .get(common::setting::DYNAMIC_DATA_KEY)
            .ok_or_else(|| RrsError::Corrupt("dynamic payload missing".to_string()))
            .and_then(|yaml| DynamicData::from_yaml(yaml))
        {
            Ok(payload) => payload,
            Err(e) => {
                error!("Cannot decode the dynamic document: {}", e);
                return false;
            }
        };
        match payload.timestamps.get(TS_START_K8S_MONITORING) {
            Some(start) => elapsed_permits_restart(start, Utc::now(), total_time),
            None => {
                warn!(
                    "{} not found in the dynamic document, cannot determine elapsed time",
                    TS_START_K8S_MONITORING
                );
                false
            }
        }
    }

    /// Best-effort transition to `InternalFailure`; the orchestrator restarts
    /// the process.
    async fn fail_session(&self) {
        self.state.set_state(RmsState::InternalFailure).await;
        if let Err(e) = self
            .state
            .update_state_timestamp(Some(StateField::RmsState(RmsState::InternalFailure)), None)
            .await
        {
            error!("Failed to persist InternalFailure state: {}", e);
        }
    }
}

/// True when at least 75% of the previous session's budget has elapsed since
/// its recorded start.
pub fn elapsed_permits_restart(start_ts: &str, now: DateTime<Utc>, total_time: u64) -> bool {
    let Ok(start) = DateTime::parse_from_rfc3339(start_ts) else {
        warn!("Unparseable monitoring start timestamp: {}", start_ts);
        return false;
    };
    let elapsed = (now - start.with_timezone(&Utc)).num_seconds();
    if elapsed < 0 || total_time == 0 {
        return false;
    }
    let pct = elapsed as f64 / total_time as f64 * 100.0;
    info!(
        "Elapsed time since last monitoring instance start: {} seconds ({:.2}% completed)",
        elapsed, pct
    );
    pct >= PREEMPTION_THRESHOLD_PCT
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_750_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_preemption_boundary_is_inclusive_at_75_percent() {
        let start = at(0).format("%Y-%m-%dT%H:%M:%SZ").to_string();
        // 450 of 600 seconds is exactly 75.0%.
        assert!(elapsed_permits_restart(&start, at(450), 600));
        // 449 of 600 seconds is 74.83%.
        assert!(!elapsed_permits_restart(&start, at(449), 600));
        assert!(elapsed_permits_restart(&start, at(480), 600));
    }

    #[test]
    fn test_preemption_rejects_bad_timestamps() {
        assert!(!elapsed_permits_restart("not-a-timestamp", at(0), 600));
        // A start in the future never permits a restart.
        let future = at(100).format("%Y-%m-%dT%H:%M:%SZ").to_string();
        assert!(!elapsed_permits_restart(&future, at(0), 600));
    }

    #[test]
    fn test_preemption_with_zero_budget_is_rejected() {
        let start = at(0).format("%Y-%m-%dT%H:%M:%SZ").to_string();
        assert!(!elapsed_permits_restart(&start, at(10), 0));
    }
}
