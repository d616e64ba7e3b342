// SPDX-FileCopyrightText: Copyright 2025 Hewlett Packard Enterprise Development LP
// SPDX-License-Identifier: MIT

//! End-to-end monitoring session tests against an in-memory document store.
//!
//! The cluster is unreachable in these tests, so every evaluation iteration
//! fails and is tolerated; the sessions still honor their budgets, record
//! their state transitions, and release the session flag.

use chrono::Utc;
use std::sync::Arc;

use common::configmap::DocStore;
use common::schema::{
    DynamicData, RmsState, SubsystemState, TS_END_CEPH_MONITORING, TS_END_K8S_MONITORING,
    TS_START_CEPH_MONITORING, TS_START_K8S_MONITORING,
};
use common::setting::{CRITICAL_SERVICE_KEY, DYNAMIC_DATA_KEY};
use common::testing::{offline_cluster_client, MemStore};
use rms::monitor::MonitorCoordinator;
use rms::state_manager::StateManager;

const STATIC_DOC: &str = "rrs-mon-static";
const DYNAMIC_DOC: &str = "rrs-mon-dynamic";

fn seed_store(total_time: &str) -> Arc<MemStore> {
    let store = Arc::new(MemStore::new());
    store.seed_key(
        DYNAMIC_DOC,
        DYNAMIC_DATA_KEY,
        &DynamicData::default().to_yaml().unwrap(),
    );
    store.seed_key(
        DYNAMIC_DOC,
        CRITICAL_SERVICE_KEY,
        r#"{"critical_services": {"coredns": {"namespace": "kube-system", "type": "Deployment"}}}"#,
    );
    store.seed_key(STATIC_DOC, "k8s_pre_monitoring_delay", "0");
    store.seed_key(STATIC_DOC, "k8s_monitoring_polling_interval", "1");
    store.seed_key(STATIC_DOC, "k8s_monitoring_total_time", total_time);
    store.seed_key(STATIC_DOC, "ceph_pre_monitoring_delay", "0");
    store.seed_key(STATIC_DOC, "ceph_monitoring_polling_interval", "1");
    store.seed_key(STATIC_DOC, "ceph_monitoring_total_time", total_time);
    store.seed_key(
        STATIC_DOC,
        CRITICAL_SERVICE_KEY,
        r#"{"critical_services": {"coredns": {"namespace": "kube-system", "type": "Deployment"}}}"#,
    );
    store
}

fn make_coordinator(store: Arc<MemStore>) -> (Arc<StateManager>, Arc<MonitorCoordinator>) {
    let state = Arc::new(StateManager::new(store.clone(), DYNAMIC_DOC));
    let coordinator = Arc::new(MonitorCoordinator::new(
        state.clone(),
        offline_cluster_client(),
        store,
        STATIC_DOC,
        DYNAMIC_DOC,
    ));
    (state, coordinator)
}

async fn persisted_payload(store: &MemStore) -> DynamicData {
    let data = store.read(DYNAMIC_DOC).await.unwrap();
    DynamicData::from_yaml(&data[DYNAMIC_DATA_KEY]).unwrap()
}

#[tokio::test]
async fn test_session_records_transitions_and_budgets_out() {
    let store = seed_store("1");
    let (state, coordinator) = make_coordinator(store.clone());

    coordinator.monitoring_loop().await;

    let payload = persisted_payload(&store).await;
    assert_eq!(payload.state.rms_state, Some(RmsState::Started));
    assert_eq!(payload.state.k8s_monitoring, SubsystemState::Completed);
    assert_eq!(payload.state.ceph_monitoring, SubsystemState::Completed);
    assert!(!state.is_monitoring().await);

    // Both loops recorded their start and end, and starts never follow ends
    // (timestamps are sortable RFC3339 UTC strings).
    for (start_key, end_key) in [
        (TS_START_K8S_MONITORING, TS_END_K8S_MONITORING),
        (TS_START_CEPH_MONITORING, TS_END_CEPH_MONITORING),
    ] {
        let start = payload.timestamps.get(start_key).unwrap();
        let end = payload.timestamps.get(end_key).unwrap();
        assert!(start <= end, "{} > {}", start_key, end_key);
    }
}

#[tokio::test]
async fn test_second_session_is_skipped_below_preemption_threshold() {
    let store = seed_store("600");
    let (state, coordinator) = make_coordinator(store.clone());

    // An active session started just now.
    assert!(state.start_monitoring().await);
    let mut payload = persisted_payload(&store).await;
    payload.timestamps.insert(
        TS_START_K8S_MONITORING.to_string(),
        Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    );
    store
        .update(DYNAMIC_DOC, DYNAMIC_DATA_KEY, &payload.to_yaml().unwrap())
        .await
        .unwrap();

    coordinator.clone().monitoring_loop().await;

    // The new session was skipped: no state transition, flag still held by
    // the first session.
    let payload = persisted_payload(&store).await;
    assert_eq!(payload.state.rms_state, None);
    assert_eq!(payload.state.k8s_monitoring, SubsystemState::NotRun);
    assert!(state.is_monitoring().await);
}

#[tokio::test]
async fn test_late_start_preemption_overlaps_the_stale_session() {
    let store = seed_store("2");
    let (state, coordinator) = make_coordinator(store.clone());

    // An active session claimed the flag more than 75% of its 2-second
    // budget ago.
    assert!(state.start_monitoring().await);
    let mut payload = persisted_payload(&store).await;
    let stale_start = Utc::now() - chrono::Duration::seconds(2);
    payload.timestamps.insert(
        TS_START_K8S_MONITORING.to_string(),
        stale_start.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    );
    store
        .update(DYNAMIC_DOC, DYNAMIC_DATA_KEY, &payload.to_yaml().unwrap())
        .await
        .unwrap();

    coordinator.clone().monitoring_loop().await;

    // The overlapping session ran to completion and rewrote the session
    // state and timestamps.
    let payload = persisted_payload(&store).await;
    assert_eq!(payload.state.rms_state, Some(RmsState::Started));
    assert_eq!(payload.state.k8s_monitoring, SubsystemState::Completed);
    let new_start = payload.timestamps.get(TS_START_K8S_MONITORING).unwrap();
    assert!(*new_start > stale_start.format("%Y-%m-%dT%H:%M:%SZ").to_string());
}
